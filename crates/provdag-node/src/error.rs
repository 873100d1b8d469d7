use provdag_block::BlockError;
use provdag_dag::DagError;
use provdag_store::StoreError;
use provdag_types::Digest;

/// Errors from node operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The node was asked to produce or aggregate without a signing key.
    #[error("no signing key configured")]
    NoSigningKey,

    /// Signatures are required and the block carries no valid one.
    #[error("block {0:?} is not signed")]
    UnsignedBlock(Digest),

    /// Configuration could not be read, parsed, or written.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// A lookup miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }

    /// An aggregation request with nothing to fold.
    pub fn is_no_input(&self) -> bool {
        matches!(self, Self::Dag(DagError::NoInputBlocks))
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
