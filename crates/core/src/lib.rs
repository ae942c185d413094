//! # wardops Core
//!
//! Domain types, traits, and error definitions for the wardops ward
//! operations runtime. This crate has **no framework dependencies** beyond
//! serde and tokio's sync primitives. It defines the domain model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: the remote completion service
//! - [`TaskBackend`]: the hosted task store and its push channel
//! - [`WardOperations`]: admit/discharge/context/room lookups
//!
//! Implementations live in their respective crates, so the orchestrator and
//! the synchronization engine can be tested against in-memory stand-ins.

pub mod backend;
pub mod clock;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod task;
pub mod tool;
pub mod ward;

// Re-export key types at crate root for ergonomics
pub use backend::{FeedMessage, TaskBackend, TaskFeed};
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use error::{BackendError, Error, ProviderError, Result, ToolError, WardError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use task::{NewTask, Priority, Task, TaskKind, TaskStatus};
pub use tool::{ToolCall, ToolResult};
pub use ward::WardOperations;
