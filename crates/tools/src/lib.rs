//! Tool executor for WardOps.
//!
//! The model asks for tools by name; [`catalog`] turns that name into a
//! closed [`WardTool`] variant, [`executor`] runs the matching ward
//! operation, and [`safe_json`] makes sure whatever comes back can be handed
//! to the model as text.

pub mod catalog;
pub mod executor;
pub mod safe_json;

pub use catalog::{ToolName, WardTool, definitions};
pub use executor::ToolExecutor;
