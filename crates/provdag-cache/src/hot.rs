use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use provdag_block::{Block, Transaction};
use provdag_types::Digest;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};

/// How long a cache operation waits for its lock before giving up.
const LOCK_WAIT: Duration = Duration::from_millis(50);

/// Hit, miss, and eviction counters for one table.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// One bounded LRU table with its counters.
struct Table<V> {
    entries: Mutex<LruCache<Digest, V>>,
    counters: Counters,
}

impl<V: Clone> Table<V> {
    fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            counters: Counters::default(),
        }
    }

    fn put(&self, key: Digest, value: V) -> CacheResult<()> {
        let mut entries = self.entries.try_lock_for(LOCK_WAIT).ok_or(CacheError::Busy)?;
        if let Some((evicted, _)) = entries.push(key, value) {
            if evicted != key {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(evicted = %evicted.short_hex(), "evicted cache entry");
            }
        }
        Ok(())
    }

    fn get(&self, key: &Digest) -> Option<V> {
        let found = match self.entries.try_lock_for(LOCK_WAIT) {
            Some(mut entries) => entries.get(key).cloned(),
            None => {
                debug!(key = %key.short_hex(), "cache busy; treating read as miss");
                None
            }
        };
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn contains(&self, key: &Digest) -> bool {
        self.entries
            .try_lock_for(LOCK_WAIT)
            .is_some_and(|entries| entries.contains(key))
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

/// Cache statistics for monitoring.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub block_entries: usize,
    pub block_hits: u64,
    pub block_misses: u64,
    pub block_evictions: u64,
    pub transaction_entries: usize,
    pub transaction_hits: u64,
    pub transaction_misses: u64,
    pub transaction_evictions: u64,
}

impl CacheStats {
    /// Fraction of block reads served from the cache.
    pub fn block_hit_rate(&self) -> f64 {
        let total = self.block_hits + self.block_misses;
        if total == 0 {
            0.0
        } else {
            self.block_hits as f64 / total as f64
        }
    }
}

/// Bounded, thread-safe LRU cache of recently touched blocks and transactions.
///
/// Blocks and transactions are kept in separate tables with their own locks
/// and capacities. A miss is `None`, never an error.
pub struct HotCache {
    enabled: AtomicBool,
    blocks: Table<Block>,
    transactions: Table<Transaction>,
}

impl HotCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            blocks: Table::new(config.block_capacity),
            transactions: Table::new(config.transaction_capacity),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turn caching on or off. Disabling drops every cached entry.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.clear();
        }
        debug!(enabled, "hot cache toggled");
    }

    /// Cache a block and each transaction it carries.
    pub fn put_block(&self, block: &Block) -> CacheResult<()> {
        if !self.is_enabled() {
            return Err(CacheError::Disabled);
        }
        self.blocks.put(block.hash, block.clone())?;
        for txn in &block.transactions {
            self.transactions.put(txn.hash, txn.clone())?;
        }
        Ok(())
    }

    pub fn get_block(&self, hash: &Digest) -> Option<Block> {
        if !self.is_enabled() {
            return None;
        }
        self.blocks.get(hash)
    }

    pub fn put_transaction(&self, txn: &Transaction) -> CacheResult<()> {
        if !self.is_enabled() {
            return Err(CacheError::Disabled);
        }
        self.transactions.put(txn.hash, txn.clone())
    }

    pub fn get_transaction(&self, hash: &Digest) -> Option<Transaction> {
        if !self.is_enabled() {
            return None;
        }
        self.transactions.get(hash)
    }

    /// Membership check. Does not promote the entry or touch the counters.
    pub fn has_block(&self, hash: &Digest) -> bool {
        self.is_enabled() && self.blocks.contains(hash)
    }

    /// Membership check. Does not promote the entry or touch the counters.
    pub fn has_transaction(&self, hash: &Digest) -> bool {
        self.is_enabled() && self.transactions.contains(hash)
    }

    pub fn clear(&self) {
        self.blocks.clear();
        self.transactions.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            block_entries: self.blocks.len(),
            block_hits: load(&self.blocks.counters.hits),
            block_misses: load(&self.blocks.counters.misses),
            block_evictions: load(&self.blocks.counters.evictions),
            transaction_entries: self.transactions.len(),
            transaction_hits: load(&self.transactions.counters.hits),
            transaction_misses: load(&self.transactions.counters.misses),
            transaction_evictions: load(&self.transactions.counters.evictions),
        }
    }
}

impl Default for HotCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provdag_block::{BlockDraft, Metadata};
    use provdag_types::ValidatorKey;

    fn block(seed: u8) -> Block {
        Block::assemble(BlockDraft {
            timestamp: seed as i64,
            validator: ValidatorKey::from_bytes([1; 32]),
            transactions: vec![Transaction::with_timestamp("prov:Entity", vec![seed], 0).unwrap()],
            supply_chain_type: "t".into(),
            metadata: Metadata::new(),
            ..BlockDraft::default()
        })
        .unwrap()
    }

    fn small() -> HotCache {
        HotCache::new(&CacheConfig {
            enabled: true,
            block_capacity: 2,
            transaction_capacity: 8,
        })
    }

    #[test]
    fn put_get_roundtrip() {
        let cache = small();
        let b = block(1);
        cache.put_block(&b).unwrap();
        assert_eq!(cache.get_block(&b.hash), Some(b.clone()));
        assert_eq!(cache.get_transaction(&b.transactions[0].hash), Some(b.transactions[0].clone()));
        assert!(cache.has_block(&b.hash));
    }

    #[test]
    fn miss_is_none_and_counted() {
        let cache = small();
        assert_eq!(cache.get_block(&Digest::of(b"missing")), None);
        let stats = cache.stats();
        assert_eq!(stats.block_misses, 1);
        assert_eq!(stats.block_hits, 0);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = small();
        let (a, b, c) = (block(1), block(2), block(3));
        cache.put_block(&a).unwrap();
        cache.put_block(&b).unwrap();
        // Touch `a` so `b` becomes the eviction candidate.
        assert!(cache.get_block(&a.hash).is_some());
        cache.put_block(&c).unwrap();

        assert!(cache.has_block(&a.hash));
        assert!(!cache.has_block(&b.hash));
        assert!(cache.has_block(&c.hash));
        assert_eq!(cache.stats().block_evictions, 1);
        assert_eq!(cache.stats().block_entries, 2);
    }

    #[test]
    fn reinsert_is_not_an_eviction() {
        let cache = small();
        let a = block(1);
        cache.put_block(&a).unwrap();
        cache.put_block(&a).unwrap();
        assert_eq!(cache.stats().block_evictions, 0);
    }

    #[test]
    fn disabled_cache_rejects_writes_and_misses_reads() {
        let cache = small();
        let a = block(1);
        cache.put_block(&a).unwrap();
        cache.set_enabled(false);

        assert_eq!(cache.put_block(&a), Err(CacheError::Disabled));
        assert_eq!(cache.get_block(&a.hash), None);
        assert!(!cache.has_block(&a.hash));

        cache.set_enabled(true);
        assert!(!cache.has_block(&a.hash));
    }

    #[test]
    fn hit_rate() {
        let cache = small();
        let a = block(1);
        cache.put_block(&a).unwrap();
        cache.get_block(&a.hash);
        cache.get_block(&Digest::of(b"x"));
        assert!((cache.stats().block_hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
