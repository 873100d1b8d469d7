use serde::{Deserialize, Serialize};

/// Row counts and log health for observability.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub blocks: usize,
    pub transactions: usize,
    pub aggregation_blocks: usize,
    pub checkpoint_blocks: usize,
    /// Distinct heights in the height index.
    pub heights: usize,
    /// Distinct supply-chain types in the type index.
    pub supply_chain_types: usize,
    /// Data blocks not yet folded into an aggregation block.
    pub pending_data_blocks: usize,
    /// Bytes in the WAL; zero for a memory-only store.
    pub wal_bytes: u64,
    /// Records replayed on open.
    pub recovered_records: usize,
    /// Records dropped on open for a CRC or decode failure.
    pub skipped_records: usize,
    pub persistent: bool,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "blocks={} txns={} aggregations={} checkpoints={} pending={} wal={}B",
            self.blocks,
            self.transactions,
            self.aggregation_blocks,
            self.checkpoint_blocks,
            self.pending_data_blocks,
            self.wal_bytes,
        )
    }
}
