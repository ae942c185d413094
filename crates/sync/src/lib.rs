//! # wardops Sync
//!
//! Keeps a client-side map of hospital tasks in step with the task backend.
//!
//! The backend's push channel is preferred. When it does not confirm within
//! the fallback window, or breaks later, the engine polls for the session's
//! active tasks until push is confirmed again. Only one of the two channels
//! writes to the map at a time.
//!
//! In-progress tasks get a projected progress value between updates, and
//! finished tasks stay visible for a short grace window.

pub mod engine;
pub mod error;
pub mod map;
pub mod projection;
pub mod source;

pub use engine::{SyncEngineBuilder, SyncSettings, TaskSyncEngine};
pub use error::SyncError;
pub use map::{Change, TaskMap};
pub use projection::projected_progress;
pub use source::{SourceSelector, SyncSource};
