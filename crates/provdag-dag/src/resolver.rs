use std::collections::HashMap;

use provdag_block::Block;
use provdag_types::Digest;

use crate::error::DagResult;

/// What height and weight computation needs to know about a known block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexInfo {
    pub height: u64,
    pub weight: u64,
    pub references: Vec<Digest>,
}

impl From<&Block> for VertexInfo {
    fn from(block: &Block) -> Self {
        Self {
            height: block.height,
            weight: block.dag_weight,
            references: block.prev_hashes.clone(),
        }
    }
}

/// Lookup of already-known blocks by hash.
///
/// Returns `Ok(None)` when the block is simply unknown; `Err` is reserved
/// for backend failures.
pub trait BlockResolver {
    fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>>;
}

impl<R: BlockResolver + ?Sized> BlockResolver for &R {
    fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
        (**self).resolve(hash)
    }
}

impl BlockResolver for HashMap<Digest, Block> {
    fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
        Ok(self.get(hash).map(VertexInfo::from))
    }
}

impl BlockResolver for [Block] {
    fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
        Ok(self.iter().find(|b| &b.hash == hash).map(VertexInfo::from))
    }
}
