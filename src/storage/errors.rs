//! Error types for command execution

use thiserror::Error;

/// Errors reported by the replicated store, the command handlers and the
/// storage facade.
///
/// Cloneable so one batch outcome can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// This replica cannot accept writes
    #[error("not leader (leader is {leader_id:?})")]
    NotLeader { leader_id: Option<u64> },

    /// The command did not complete within the RPC timeout
    #[error("command timed out")]
    Timeout,

    /// Replicated read or write failed
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored value or command payload could not be (de)serialized
    #[error("codec error: {0}")]
    Codec(String),

    /// Tenant metadata is missing or has no partitions
    #[error("tenant {0} not initialized")]
    TenantNotInitialized(u64),

    /// Commit offset moves the group cursor backwards
    #[error("group '{group}' cannot commit offset {requested} behind cursor {current}")]
    InvalidCommit {
        group: String,
        requested: u64,
        current: u64,
    },

    /// Offset is past the last record of the partition
    #[error("offset {requested} is beyond last offset {last}")]
    OffsetOutOfRange { requested: u64, last: u64 },

    /// The command was rejected by its handler, state is unchanged
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
