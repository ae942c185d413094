//! In-memory ward backend for WardOps.
//!
//! Implements both [`TaskBackend`](wardops_core::backend::TaskBackend), the
//! task store and its push channel, and
//! [`WardOperations`](wardops_core::ward::WardOperations), the rooms and
//! patients the tools act on. The CLI runs against it and so do the tests.

pub mod in_memory;

pub use in_memory::InMemoryWard;
