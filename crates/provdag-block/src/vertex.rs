use provdag_types::Digest;

use crate::block::Block;
use crate::summary::{AggregationBlock, CheckpointBlock, SummaryBlock};

/// A content-addressed node with outgoing references.
///
/// Tip selection only needs a block's own hash and the hashes it
/// references, so it works uniformly over every tier.
pub trait DagVertex {
    fn id(&self) -> Digest;
    fn references(&self) -> &[Digest];
}

impl DagVertex for Block {
    fn id(&self) -> Digest {
        self.hash
    }

    fn references(&self) -> &[Digest] {
        &self.prev_hashes
    }
}

impl DagVertex for AggregationBlock {
    fn id(&self) -> Digest {
        self.hash
    }

    fn references(&self) -> &[Digest] {
        &self.referenced_data_block_hashes
    }
}

impl DagVertex for CheckpointBlock {
    fn id(&self) -> Digest {
        self.hash
    }

    fn references(&self) -> &[Digest] {
        &self.referenced_aggregation_block_hashes
    }
}

impl DagVertex for SummaryBlock {
    fn id(&self) -> Digest {
        self.hash()
    }

    fn references(&self) -> &[Digest] {
        SummaryBlock::references(self)
    }
}

impl<T: DagVertex + ?Sized> DagVertex for &T {
    fn id(&self) -> Digest {
        (**self).id()
    }

    fn references(&self) -> &[Digest] {
        (**self).references()
    }
}
