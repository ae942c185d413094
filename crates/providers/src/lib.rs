//! Completion provider implementations for wardops.
//!
//! All providers implement the `wardops_core::Provider` trait. The
//! [`ladder`] module holds the retry/fallback state machine the orchestrator
//! drives across the configured models.

pub mod ladder;
pub mod openai_compat;

pub use ladder::{Attempt, ModelLadder, Outcome, RetryPolicy, Transition, Verdict};
pub use openai_compat::OpenAiCompatProvider;
