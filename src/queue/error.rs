//! Error types for tenant queues

use crate::storage::StorageError;
use thiserror::Error;

/// Errors reported to callers of a tenant queue.
///
/// Cloneable so one batch outcome reaches every caller in the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    /// The queue has been stopped
    #[error("Queue stopped")]
    Stopped,

    /// The partition worker exited before the event was committed
    #[error("Partition closed before the event was committed")]
    Closed,

    /// Starting the queue failed
    #[error("Queue not started: {0}")]
    NotStarted(String),

    /// The batch containing the event failed to commit
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
