//! Error types for DAG maintenance.

use provdag_block::BlockError;
use provdag_types::Digest;

/// Errors that can occur during DAG operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// Aggregation was asked to fold an empty batch.
    #[error("no input blocks to aggregate")]
    NoInputBlocks,

    /// A referenced block could not be resolved locally or through the store.
    #[error("unresolved reference {0:?}")]
    UnresolvedParent(Digest),

    /// Attempted to add a block that is already present.
    #[error("duplicate block: {0:?}")]
    DuplicateBlock(Digest),

    /// The block's recorded height disagrees with the configured rule.
    #[error("height mismatch for {hash:?}: recorded {recorded}, expected {expected}")]
    HeightMismatch {
        hash: Digest,
        recorded: u64,
        expected: u64,
    },

    /// The block's recorded weight disagrees with the configured rule.
    #[error("weight mismatch for {hash:?}: recorded {recorded}, expected {expected}")]
    WeightMismatch {
        hash: Digest,
        recorded: u64,
        expected: u64,
    },

    /// The resolver backend failed.
    #[error("resolver error: {0}")]
    Resolver(String),

    /// Block construction or integrity failure.
    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Convenience alias for DAG results.
pub type DagResult<T> = Result<T, DagError>;
