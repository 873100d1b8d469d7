use std::time::Duration;

use provdag_types::Digest;

use crate::config::Profile;

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("not found: {0:?}")]
    NotFound(Digest),

    /// A durable write failed; nothing from it is visible.
    #[error("store transaction aborted: {reason}")]
    TransactionAborted { reason: String },

    /// The writer could not be acquired within the bounded wait.
    #[error("timed out after {0:?} waiting for the store writer")]
    Timeout(Duration),

    /// A stored record could not be decoded.
    #[error("corrupt record {id:?}: {reason}")]
    Serialization { id: Digest, reason: String },

    /// The input is not a well-formed block.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// A transaction's hash does not match its content.
    #[error("invalid transaction {0:?}")]
    InvalidTransaction(Digest),

    /// `reset` was called on a production store.
    #[error("reset is not permitted under the {0:?} profile")]
    ResetForbidden(Profile),

    /// I/O error opening or replaying the log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same write may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::TransactionAborted { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
