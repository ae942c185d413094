use thiserror::Error;
use wardops_core::error::BackendError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Task synchronization engine has stopped")]
    Stopped,
}
