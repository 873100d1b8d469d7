use provdag_types::Digest;
use serde::{Deserialize, Serialize};

/// Broadcast to subscribers after a state change is durable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvent {
    BlockAdmitted {
        hash: Digest,
        height: u64,
        weight: u64,
        supply_chain_type: String,
    },
    Aggregated {
        hash: Digest,
        data_blocks: usize,
    },
    Checkpointed {
        hash: Digest,
        aggregation_blocks: usize,
    },
}

impl NodeEvent {
    pub fn hash(&self) -> Digest {
        match self {
            Self::BlockAdmitted { hash, .. }
            | Self::Aggregated { hash, .. }
            | Self::Checkpointed { hash, .. } => *hash,
        }
    }
}
