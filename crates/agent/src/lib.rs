//! The WardOps agent orchestrator.
//!
//! Turns a staff utterance plus prior conversation into executed ward
//! actions and a reply:
//!
//! 1. **Sanitize** the history: coerce, strip control characters, cap, trim
//! 2. **Complete** through the model ladder, retrying and falling back
//! 3. **Act**: run requested tools through the executor, feed results back
//! 4. **Reply** once the model stops asking for tools
//!
//! Only a rejected request or an exhausted ladder reaches the caller, and
//! both carry the history collected so far.

pub mod error;
pub mod orchestrator;
pub mod sanitize;

pub use error::AgentError;
pub use orchestrator::{
    DEFAULT_REPLY, DEFAULT_SYSTEM_PROMPT, Orchestrator, OrchestratorSettings, TurnOutcome,
};
