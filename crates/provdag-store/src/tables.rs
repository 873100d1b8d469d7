//! In-memory tables rebuilt from the WAL.

use std::collections::{BTreeMap, HashMap, HashSet};

use provdag_block::Tier;
use provdag_types::Digest;
use serde::{Deserialize, Serialize};

use crate::wal::WalRecord;

/// The DAG placement of a stored data block, kept decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVertex {
    pub height: u64,
    pub weight: u64,
    pub prev_hashes: Vec<Digest>,
}

/// One entry of a multi-valued secondary index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub hash: Digest,
    pub timestamp: i64,
}

/// Primary tables, secondary indexes, and fold tracking.
///
/// Values stay encoded; decoding happens on read so a corrupt record only
/// affects the lookups that touch it.
#[derive(Debug, Default)]
pub struct Tables {
    pub(crate) blocks: HashMap<Digest, Vec<u8>>,
    pub(crate) transactions: HashMap<Digest, Vec<u8>>,
    pub(crate) summaries: HashMap<Digest, Vec<u8>>,
    pub(crate) vertices: HashMap<Digest, BlockVertex>,
    pub(crate) height_index: BTreeMap<u64, Vec<IndexEntry>>,
    pub(crate) type_index: BTreeMap<String, Vec<IndexEntry>>,
    pub(crate) tier_index: BTreeMap<Tier, Vec<IndexEntry>>,
    pub(crate) summary_tiers: HashMap<Digest, Tier>,
    /// Data blocks in admission order.
    pub(crate) block_order: Vec<Digest>,
    /// Blocks referenced by some summary block.
    pub(crate) folded: HashSet<Digest>,
}

impl Tables {
    /// Apply one record. Records whose key is already present are ignored,
    /// which keeps replay idempotent.
    pub(crate) fn apply(&mut self, record: WalRecord) {
        match record {
            WalRecord::Block {
                hash,
                height,
                weight,
                prev_hashes,
                supply_chain_type,
                timestamp,
                block,
                transactions,
            } => {
                if self.blocks.contains_key(&hash) {
                    return;
                }
                let entry = IndexEntry { hash, timestamp };
                self.height_index.entry(height).or_default().push(entry);
                self.type_index.entry(supply_chain_type).or_default().push(entry);
                for (txn_hash, txn) in transactions {
                    self.transactions.entry(txn_hash).or_insert(txn);
                }
                self.block_order.push(hash);
                self.vertices.insert(
                    hash,
                    BlockVertex {
                        height,
                        weight,
                        prev_hashes,
                    },
                );
                self.blocks.insert(hash, block);
            }
            WalRecord::Transaction { hash, txn } => {
                self.transactions.entry(hash).or_insert(txn);
            }
            WalRecord::Summary {
                hash,
                tier,
                timestamp,
                references,
                summary,
            } => {
                if self.summaries.contains_key(&hash) {
                    return;
                }
                self.tier_index
                    .entry(tier)
                    .or_default()
                    .push(IndexEntry { hash, timestamp });
                self.summary_tiers.insert(hash, tier);
                self.folded.extend(references);
                self.summaries.insert(hash, summary);
            }
        }
    }

    pub(crate) fn height_entries(&self, height: u64) -> &[IndexEntry] {
        self.height_index.get(&height).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn type_entries(&self, supply_chain_type: &str) -> &[IndexEntry] {
        self.type_index
            .get(supply_chain_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn tier_entries(&self, tier: Tier) -> &[IndexEntry] {
        self.tier_index.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }
}
