//! The block store.
//!
//! # Invariants
//!
//! - A block is visible by hash iff it is visible in its height and type
//!   index entries; both come from one WAL entry applied under one table lock.
//! - Nothing is ever removed except by [`BlockStore::reset`].
//! - Writes are idempotent by hash.

use parking_lot::{Mutex, RwLock};
use provdag_block::{AggregationBlock, Block, SummaryBlock, Tier, Transaction};
use provdag_types::Digest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::stats::StoreStats;
use crate::tables::{BlockVertex, Tables};
use crate::wal::{WalRecord, WriteAheadLog};

/// Durable, indexed, append-only block storage.
///
/// All writes go through a single writer lock acquired with a bounded wait;
/// reads only take the table read lock and never wait on the log.
pub struct BlockStore {
    config: StoreConfig,
    /// `None` for a memory-only store.
    writer: Mutex<Option<WriteAheadLog>>,
    tables: RwLock<Tables>,
    recovered: usize,
    skipped: usize,
}

fn encode<T: Serialize>(id: Digest, value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        id,
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(id: Digest, bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        id,
        reason: e.to_string(),
    })
}

impl BlockStore {
    /// Open the store described by `config`, replaying its WAL if it has one.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let mut tables = Tables::default();
        let (writer, recovered, skipped) = match config.wal_path() {
            Some(path) => {
                let (wal, recovery) = WriteAheadLog::open(&path, config.sync_mode)?;
                let recovered = recovery.records.len();
                for record in recovery.records {
                    tables.apply(record);
                }
                info!(
                    path = %path.display(),
                    recovered,
                    skipped = recovery.skipped,
                    blocks = tables.blocks.len(),
                    "opened block store"
                );
                (Some(wal), recovered, recovery.skipped)
            }
            None => {
                debug!("opened memory-only block store");
                (None, 0, 0)
            }
        };

        Ok(Self {
            config,
            writer: Mutex::new(writer),
            tables: RwLock::new(tables),
            recovered,
            skipped,
        })
    }

    /// A memory-only store under the test profile.
    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::ephemeral(),
            writer: Mutex::new(None),
            tables: RwLock::new(Tables::default()),
            recovered: 0,
            skipped: 0,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Append `record` and make it visible. Returns `false` if its key was
    /// already present.
    fn commit(&self, record: WalRecord, present: impl Fn(&Tables) -> bool) -> StoreResult<bool> {
        let timeout = self.config.write_timeout();
        let mut writer = self
            .writer
            .try_lock_for(timeout)
            .ok_or(StoreError::Timeout(timeout))?;

        if present(&self.tables.read()) {
            return Ok(false);
        }
        if let Some(wal) = writer.as_mut() {
            wal.append(&record)?;
        }
        self.tables.write().apply(record);
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Data blocks
    // ---------------------------------------------------------------

    /// Persist a block with its height and type index entries and its
    /// transactions, atomically.
    pub fn put_block(&self, block: &Block) -> StoreResult<()> {
        self.insert_block(block).map(|_| ())
    }

    /// [`BlockStore::put_block`], reporting whether the block was new.
    pub fn insert_block(&self, block: &Block) -> StoreResult<bool> {
        block
            .check_well_formed()
            .map_err(|e| StoreError::InvalidBlock(e.to_string()))?;
        if self.contains_block(&block.hash) {
            return Ok(false);
        }

        let transactions = block
            .transactions
            .iter()
            .map(|t| Ok((t.hash, encode(t.hash, t)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        let record = WalRecord::Block {
            hash: block.hash,
            height: block.height,
            weight: block.dag_weight,
            prev_hashes: block.prev_hashes.clone(),
            supply_chain_type: block.supply_chain_type.clone(),
            timestamp: block.timestamp,
            block: encode(block.hash, block)?,
            transactions,
        };

        let hash = block.hash;
        let inserted = self.commit(record, |t| t.blocks.contains_key(&hash))?;
        if inserted {
            debug!(block = %hash.short_hex(), height = block.height, "stored block");
        }
        Ok(inserted)
    }

    pub fn get_block(&self, hash: &Digest) -> StoreResult<Block> {
        let tables = self.tables.read();
        let bytes = tables.blocks.get(hash).ok_or(StoreError::NotFound(*hash))?;
        decode(*hash, bytes)
    }

    /// Height, weight, and parents of a stored block, without decoding it.
    pub fn vertex(&self, hash: &Digest) -> Option<BlockVertex> {
        self.tables.read().vertices.get(hash).cloned()
    }

    pub fn contains_block(&self, hash: &Digest) -> bool {
        self.tables.read().blocks.contains_key(hash)
    }

    pub fn block_count(&self) -> usize {
        self.tables.read().blocks.len()
    }

    /// Decode the blocks behind `hashes`, skipping corrupt records.
    fn scan_blocks<'a>(tables: &Tables, hashes: impl IntoIterator<Item = &'a Digest>) -> Vec<Block> {
        hashes
            .into_iter()
            .filter_map(|hash| {
                let bytes = tables.blocks.get(hash)?;
                match decode::<Block>(*hash, bytes) {
                    Ok(block) => Some(block),
                    Err(e) => {
                        warn!(block = %hash.short_hex(), error = %e, "skipping corrupt block");
                        None
                    }
                }
            })
            .collect()
    }

    /// Every block admitted at `height`.
    pub fn get_blocks_by_height(&self, height: u64) -> StoreResult<Vec<Block>> {
        let tables = self.tables.read();
        Ok(Self::scan_blocks(&tables, tables.height_entries(height).iter().map(|e| &e.hash)))
    }

    /// Every block tagged with `supply_chain_type`.
    pub fn get_blocks_by_type(&self, supply_chain_type: &str) -> StoreResult<Vec<Block>> {
        let tables = self.tables.read();
        Ok(Self::scan_blocks(
            &tables,
            tables.type_entries(supply_chain_type).iter().map(|e| &e.hash),
        ))
    }

    /// Every block in admission order, parents before children.
    pub fn all_blocks(&self) -> StoreResult<Vec<Block>> {
        let tables = self.tables.read();
        Ok(Self::scan_blocks(&tables, &tables.block_order))
    }

    /// Highest height in the height index.
    pub fn max_height(&self) -> Option<u64> {
        self.tables.read().height_index.keys().next_back().copied()
    }

    // ---------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------

    pub fn put_transaction(&self, txn: &Transaction) -> StoreResult<()> {
        if !txn.verify_hash() {
            return Err(StoreError::InvalidTransaction(txn.hash));
        }
        let hash = txn.hash;
        let record = WalRecord::Transaction {
            hash,
            txn: encode(hash, txn)?,
        };
        self.commit(record, |t| t.transactions.contains_key(&hash))?;
        Ok(())
    }

    pub fn get_transaction(&self, hash: &Digest) -> StoreResult<Transaction> {
        let tables = self.tables.read();
        let bytes = tables
            .transactions
            .get(hash)
            .ok_or(StoreError::NotFound(*hash))?;
        decode(*hash, bytes)
    }

    pub fn contains_transaction(&self, hash: &Digest) -> bool {
        self.tables.read().transactions.contains_key(hash)
    }

    // ---------------------------------------------------------------
    // Summary tiers
    // ---------------------------------------------------------------

    /// Persist an aggregation or checkpoint block and mark its references
    /// folded. Every reference must already be stored in the tier below.
    pub fn put_summary(&self, summary: &SummaryBlock) -> StoreResult<bool> {
        summary
            .check_well_formed()
            .map_err(|e| StoreError::InvalidBlock(e.to_string()))?;
        {
            let tables = self.tables.read();
            let known = |hash: &Digest| match summary.tier() {
                Tier::Checkpoint => tables.summary_tiers.get(hash) == Some(&Tier::Aggregation),
                _ => tables.blocks.contains_key(hash),
            };
            if let Some(missing) = summary.references().iter().find(|h| !known(*h)) {
                return Err(StoreError::InvalidBlock(format!(
                    "{} references {}, which is not in the tier below",
                    summary.tier(),
                    missing.short_hex()
                )));
            }
        }

        let hash = summary.hash();
        let record = WalRecord::Summary {
            hash,
            tier: summary.tier(),
            timestamp: summary.timestamp(),
            references: summary.references().to_vec(),
            summary: encode(hash, summary)?,
        };
        let inserted = self.commit(record, |t| t.summaries.contains_key(&hash))?;
        if inserted {
            debug!(
                block = %hash.short_hex(),
                tier = %summary.tier(),
                refs = summary.references().len(),
                "stored summary block"
            );
        }
        Ok(inserted)
    }

    pub fn get_summary(&self, hash: &Digest) -> StoreResult<SummaryBlock> {
        let tables = self.tables.read();
        let bytes = tables.summaries.get(hash).ok_or(StoreError::NotFound(*hash))?;
        decode(*hash, bytes)
    }

    /// Summary blocks of one tier, oldest first. Corrupt records are skipped.
    pub fn summaries_by_tier(&self, tier: Tier) -> StoreResult<Vec<SummaryBlock>> {
        let tables = self.tables.read();
        Ok(tables
            .tier_entries(tier)
            .iter()
            .filter_map(|entry| {
                let bytes = tables.summaries.get(&entry.hash)?;
                decode::<SummaryBlock>(entry.hash, bytes)
                    .map_err(|e| warn!(block = %entry.hash.short_hex(), error = %e, "skipping corrupt summary"))
                    .ok()
            })
            .collect())
    }

    /// Data blocks not yet referenced by any aggregation block, in admission order.
    pub fn pending_data_blocks(&self) -> StoreResult<Vec<Block>> {
        let tables = self.tables.read();
        Ok(Self::scan_blocks(
            &tables,
            tables.block_order.iter().filter(|h| !tables.folded.contains(*h)),
        ))
    }

    /// Number of data blocks not yet folded.
    pub fn pending_data_count(&self) -> usize {
        let tables = self.tables.read();
        tables
            .block_order
            .iter()
            .filter(|h| !tables.folded.contains(*h))
            .count()
    }

    /// Aggregation blocks not yet referenced by any checkpoint block.
    pub fn pending_aggregations(&self) -> StoreResult<Vec<AggregationBlock>> {
        let folded = {
            let tables = self.tables.read();
            tables.folded.clone()
        };
        Ok(self
            .summaries_by_tier(Tier::Aggregation)?
            .into_iter()
            .filter(|s| !folded.contains(&s.hash()))
            .filter_map(|s| s.as_aggregation().cloned())
            .collect())
    }

    // ---------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------

    /// Drop every record. Refused under the production profile.
    pub fn reset(&self) -> StoreResult<()> {
        if !self.config.profile.allows_reset() {
            return Err(StoreError::ResetForbidden(self.config.profile));
        }
        let timeout = self.config.write_timeout();
        let mut writer = self
            .writer
            .try_lock_for(timeout)
            .ok_or(StoreError::Timeout(timeout))?;
        if let Some(wal) = writer.as_mut() {
            wal.truncate()?;
        }
        *self.tables.write() = Tables::default();
        warn!(profile = ?self.config.profile, "block store reset");
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        let wal_bytes = self.writer.lock().as_ref().map_or(0, WriteAheadLog::offset);
        let pending_data_blocks = self.pending_data_count();
        let tables = self.tables.read();
        StoreStats {
            blocks: tables.blocks.len(),
            transactions: tables.transactions.len(),
            aggregation_blocks: tables.tier_entries(Tier::Aggregation).len(),
            checkpoint_blocks: tables.tier_entries(Tier::Checkpoint).len(),
            heights: tables.height_index.len(),
            supply_chain_types: tables.type_index.len(),
            pending_data_blocks,
            wal_bytes,
            recovered_records: self.recovered,
            skipped_records: self.skipped,
            persistent: self.config.data_dir.is_some(),
        }
    }
}
