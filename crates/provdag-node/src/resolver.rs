use provdag_dag::{BlockResolver, DagResult, VertexInfo};
use provdag_store::{BlockStore, BlockVertex};
use provdag_types::Digest;

/// Resolves blocks through the store's in-memory vertex index.
///
/// Height and weight computation only needs a block's placement, so no block
/// body is decoded or cloned on the way.
pub struct StoreResolver<'a> {
    store: &'a BlockStore,
}

impl<'a> StoreResolver<'a> {
    pub fn new(store: &'a BlockStore) -> Self {
        Self { store }
    }
}

impl BlockResolver for StoreResolver<'_> {
    fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
        Ok(self.store.vertex(hash).map(
            |BlockVertex {
                 height,
                 weight,
                 prev_hashes,
             }| VertexInfo {
                height,
                weight,
                references: prev_hashes,
            },
        ))
    }
}
