//! The hosted task store and its push channel.
//!
//! The synchronization engine reads from two channels exposed here: a
//! server-initiated change feed ([`TaskBackend::subscribe`]) and a
//! client-initiated query used for the polling fallback
//! ([`TaskBackend::fetch_active_since`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use crate::error::BackendError;
use crate::task::{NewTask, Task, TaskStatus};

/// One item on the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedMessage {
    /// The server acknowledged the subscription; the channel is healthy.
    Subscribed,
    Inserted { task: Task },
    Updated { task: Task },
    Deleted { id: String },
    /// The channel broke. The stream may end right after.
    ChannelError { reason: String },
}

/// The push channel as a stream. Ending the stream means the channel closed.
pub type TaskFeed = BoxStream<'static, FeedMessage>;

#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Persist a new task and return the stored record.
    async fn insert_task(&self, draft: NewTask) -> Result<Task, BackendError>;

    /// Move a task along its lifecycle and return the stored record.
    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, BackendError>;

    /// Active tasks (pending / in progress) created at or after `since`.
    async fn fetch_active_since(&self, since: DateTime<Utc>) -> Result<Vec<Task>, BackendError>;

    /// Open the push channel for task changes.
    async fn subscribe(&self) -> Result<TaskFeed, BackendError>;
}
