//! Terminal orchestration errors.
//!
//! Everything transient (server errors, bad tool arguments, failing tools)
//! is handled inside the turn. What reaches the caller is one of these, and
//! every variant produced mid-turn carries the history collected so far so a
//! retry does not lose context.

use thiserror::Error;
use wardops_core::error::ProviderError;
use wardops_core::message::Message;

#[derive(Debug, Error)]
pub enum AgentError {
    /// A message in the prior history can not be sent. Nothing was requested.
    #[error("Invalid conversation history: {0}")]
    InvalidHistory(String),

    /// The provider refused the request (4xx); no other model was tried.
    #[error("Request rejected by model {model}: {source}")]
    Rejected {
        model: String,
        #[source]
        source: ProviderError,
        history: Vec<Message>,
    },

    #[error("All models failed ({}): {last}", .attempted.join(", "))]
    Exhausted {
        attempted: Vec<String>,
        last: ProviderError,
        history: Vec<Message>,
    },

    #[error("Orchestrator was shut down")]
    Cancelled { history: Vec<Message> },
}

impl AgentError {
    /// History collected before the failure, including the new user message.
    pub fn history(&self) -> Option<&[Message]> {
        match self {
            AgentError::InvalidHistory(_) => None,
            AgentError::Rejected { history, .. }
            | AgentError::Exhausted { history, .. }
            | AgentError::Cancelled { history } => Some(history),
        }
    }

    pub fn into_history(self) -> Option<Vec<Message>> {
        match self {
            AgentError::InvalidHistory(_) => None,
            AgentError::Rejected { history, .. }
            | AgentError::Exhausted { history, .. }
            | AgentError::Cancelled { history } => Some(history),
        }
    }

    /// The single message shown to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AgentError::InvalidHistory(_) => {
                "The conversation could not be processed. Please start a new one."
            }
            AgentError::Rejected { .. } => {
                "The assistant could not handle that request. Please rephrase and try again."
            }
            AgentError::Exhausted { .. } => {
                "The assistant is temporarily unavailable. Please try again in a moment."
            }
            AgentError::Cancelled { .. } => "The request was cancelled.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_lists_attempted_models() {
        let err = AgentError::Exhausted {
            attempted: vec!["a".into(), "b".into()],
            last: ProviderError::from_status(503, "overloaded"),
            history: vec![Message::user("hi")],
        };
        let text = err.to_string();
        assert!(text.starts_with("All models failed (a, b)"));
        assert!(text.contains("overloaded"));
        assert_eq!(err.history().unwrap().len(), 1);
    }

    #[test]
    fn invalid_history_carries_no_history() {
        let err = AgentError::InvalidHistory("message 2 has role 'robot'".into());
        assert!(err.history().is_none());
        assert!(err.into_history().is_none());
    }

    #[test]
    fn user_messages_hide_details() {
        let err = AgentError::Rejected {
            model: "a".into(),
            source: ProviderError::from_status(401, "bad key"),
            history: vec![],
        };
        assert!(!err.user_message().contains("bad key"));
    }
}
