use provdag_crypto::HasherError;
use provdag_types::Digest;

/// Errors from block construction and integrity checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// Malformed construction arguments, rejected before any hashing.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A block failed an integrity check.
    #[error("malformed block {hash:?}: {reason}")]
    Malformed { hash: Digest, reason: String },

    /// Canonical serialization failed.
    #[error("hashing failed: {0}")]
    Hashing(#[from] HasherError),
}

/// Convenience alias for block results.
pub type BlockResult<T> = Result<T, BlockError>;

impl BlockError {
    pub(crate) fn malformed(hash: Digest, reason: impl Into<String>) -> Self {
        Self::Malformed {
            hash,
            reason: reason.into(),
        }
    }
}
