//! Block production and admission.

use provdag_block::{
    AggregationBlock, Block, CheckpointBlock, MetaValue, Metadata, SummaryBlock, Transaction,
};
use provdag_cache::{CacheError, CacheStats, HotCache, TipRegistry, TipSet};
use provdag_crypto::SigningKey;
use provdag_dag::{
    aggregate_aggregation_blocks, aggregate_data_blocks, order_batch, select_tips, BlockBuilder,
    BlockDag,
};
use parking_lot::Mutex;
use provdag_store::{BlockStore, StoreResult, StoreStats};
use provdag_types::{Digest, ValidatorKey};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::events::NodeEvent;
use crate::resolver::StoreResolver;

const EVENT_CAPACITY: usize = 1024;

/// Combined store, cache, and tip statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeStats {
    pub store: StoreStats,
    pub cache: CacheStats,
    pub tips: TipSet,
}

/// A ledger node.
pub struct Node {
    config: NodeConfig,
    store: BlockStore,
    cache: HotCache,
    tips: TipRegistry,
    /// Held from the store insert through the tip update of one admission.
    admission: Mutex<()>,
    builder: BlockBuilder,
    signer: Option<SigningKey>,
    events: broadcast::Sender<NodeEvent>,
}

impl Node {
    /// Open the store and rebuild the tip set from it.
    pub fn open(config: NodeConfig) -> NodeResult<Self> {
        let store = BlockStore::open(config.store.clone())?;
        Self::with_store(config, store)
    }

    /// A memory-only node with default settings.
    pub fn in_memory() -> Self {
        let config = NodeConfig::default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache: HotCache::new(&config.cache),
            builder: BlockBuilder::new(config.rules),
            store: BlockStore::in_memory(),
            tips: TipRegistry::new(),
            admission: Mutex::new(()),
            signer: None,
            events,
            config,
        }
    }

    fn with_store(config: NodeConfig, store: BlockStore) -> NodeResult<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let node = Self {
            cache: HotCache::new(&config.cache),
            builder: BlockBuilder::new(config.rules),
            store,
            tips: TipRegistry::new(),
            admission: Mutex::new(()),
            signer: None,
            events,
            config,
        };
        node.recompute_tips()?;
        Ok(node)
    }

    /// Sign produced blocks with `key`.
    pub fn with_signer(mut self, key: SigningKey) -> Self {
        self.signer = Some(key);
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn cache(&self) -> &HotCache {
        &self.cache
    }

    pub fn validator(&self) -> Option<ValidatorKey> {
        self.signer.as_ref().map(SigningKey::validator_key)
    }

    fn signer(&self) -> NodeResult<&SigningKey> {
        self.signer.as_ref().ok_or(NodeError::NoSigningKey)
    }

    fn resolver(&self) -> StoreResolver<'_> {
        StoreResolver::new(&self.store)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: NodeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ---------------------------------------------------------------
    // Production and admission
    // ---------------------------------------------------------------

    /// Build, sign, and admit a block carrying `transactions` on top of the
    /// current tips.
    pub fn produce_block(
        &self,
        transactions: Vec<Transaction>,
        supply_chain_type: impl Into<String>,
        metadata: Metadata,
    ) -> NodeResult<Block> {
        let signer = self.signer()?;
        let resolver = self.resolver();
        let pending = transactions.len();

        let mut parents =
            self.config
                .references
                .choose_parents(&self.tips.get(), pending, &resolver)?;
        if parents.is_empty() && self.store.block_count() > 0 {
            debug!("tip registry stale; recomputing from store");
            let tips = self.recompute_tips()?;
            parents = self.config.references.choose_parents(&tips, pending, &resolver)?;
        }

        let block = self
            .builder
            .new_block(
                parents,
                transactions,
                signer.validator_key(),
                supply_chain_type,
                metadata,
                &resolver,
            )?
            .signed(signer);
        self.admit(block.clone())?;
        Ok(block)
    }

    /// Validate and persist a block. Returns `false` if it was already known.
    ///
    /// A signature that does not verify is dropped and the block is treated
    /// as unsigned.
    pub fn admit(&self, mut block: Block) -> NodeResult<bool> {
        block.check_well_formed()?;
        if block.signature.is_some() && !block.verify_signature() {
            warn!(block = %block.hash.short_hex(), "invalid signature; treating block as unsigned");
            block.signature = None;
        }
        if self.config.admission.require_signatures && block.signature.is_none() {
            return Err(NodeError::UnsignedBlock(block.hash));
        }
        if self.store.contains_block(&block.hash) {
            debug!(block = %block.hash.short_hex(), "block already admitted");
            return Ok(false);
        }

        self.builder.verify_placement(&block, &self.resolver())?;

        // A child can only be placed once its parent is stored, so holding
        // this across insert and advance applies tip updates parents first.
        let tips = {
            let _admission = self.admission.lock();
            if !self.write_with_retry(|| self.store.insert_block(&block))? {
                return Ok(false);
            }
            self.tips.advance(&block.prev_hashes, block.hash)
        };

        match self.cache.put_block(&block) {
            Ok(()) | Err(CacheError::Disabled) => {}
            Err(e) => warn!(block = %block.hash.short_hex(), error = %e, "cache write failed"),
        }

        info!(
            block = %block.hash.short_hex(),
            height = block.height,
            weight = block.dag_weight,
            tips = tips.tips.len(),
            "admitted block"
        );
        self.emit(NodeEvent::BlockAdmitted {
            hash: block.hash,
            height: block.height,
            weight: block.dag_weight,
            supply_chain_type: block.supply_chain_type.clone(),
        });
        Ok(true)
    }

    /// Admit blocks in parents-first order. Returns how many were new.
    pub fn admit_batch(&self, blocks: Vec<Block>) -> NodeResult<usize> {
        let mut admitted = 0;
        for block in order_batch(blocks) {
            if self.admit(block)? {
                admitted += 1;
            }
        }
        Ok(admitted)
    }

    fn write_with_retry<T>(&self, mut write: impl FnMut() -> StoreResult<T>) -> NodeResult<T> {
        let attempts = self.config.admission.max_write_attempts.max(1);
        let mut attempt = 1;
        loop {
            match write() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(attempt, max = attempts, error = %e, "store write failed; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Store a standalone transaction.
    pub fn put_transaction(&self, txn: &Transaction) -> NodeResult<()> {
        self.write_with_retry(|| self.store.put_transaction(txn))?;
        if let Err(e) = self.cache.put_transaction(txn) {
            debug!(txn = %txn.hash.short_hex(), error = %e, "cache write skipped");
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn get_block(&self, hash: &Digest) -> NodeResult<Block> {
        if let Some(block) = self.cache.get_block(hash) {
            return Ok(block);
        }
        let block = self.store.get_block(hash)?;
        if let Err(e) = self.cache.put_block(&block) {
            debug!(block = %hash.short_hex(), error = %e, "cache warm skipped");
        }
        Ok(block)
    }

    pub fn get_transaction(&self, hash: &Digest) -> NodeResult<Transaction> {
        if let Some(txn) = self.cache.get_transaction(hash) {
            return Ok(txn);
        }
        let txn = self.store.get_transaction(hash)?;
        if let Err(e) = self.cache.put_transaction(&txn) {
            debug!(txn = %hash.short_hex(), error = %e, "cache warm skipped");
        }
        Ok(txn)
    }

    pub fn blocks_at_height(&self, height: u64) -> NodeResult<Vec<Block>> {
        Ok(self.store.get_blocks_by_height(height)?)
    }

    pub fn blocks_of_type(&self, supply_chain_type: &str) -> NodeResult<Vec<Block>> {
        Ok(self.store.get_blocks_by_type(supply_chain_type)?)
    }

    pub fn get_summary(&self, hash: &Digest) -> NodeResult<SummaryBlock> {
        Ok(self.store.get_summary(hash)?)
    }

    /// The advisory tip set.
    pub fn tips(&self) -> Vec<Digest> {
        self.tips.get()
    }

    /// Rebuild the tip set from every stored block.
    pub fn recompute_tips(&self) -> NodeResult<Vec<Digest>> {
        let _admission = self.admission.lock();
        let blocks = self.store.all_blocks()?;
        let tips = select_tips(&blocks);
        let version = self.tips.update(tips.clone());
        debug!(tips = tips.len(), version, "recomputed tip set");
        Ok(tips)
    }

    /// Every stored block as an in-memory DAG.
    pub fn dag_snapshot(&self) -> NodeResult<BlockDag> {
        Ok(BlockDag::from_blocks(self.store.all_blocks()?)?)
    }

    // ---------------------------------------------------------------
    // Aggregation
    // ---------------------------------------------------------------

    /// Fold the oldest pending data blocks (at most one batch) into an
    /// aggregation block. Fails with `NoInputBlocks` when nothing is pending.
    pub fn aggregate_pending(&self) -> NodeResult<AggregationBlock> {
        let signer = self.signer()?;
        let batch = self.config.aggregation.data_block_threshold.max(1);
        let pending: Vec<Block> = self.store.pending_data_blocks()?.into_iter().take(batch).collect();

        let mut metadata = Metadata::new();
        metadata.insert("data_blocks".into(), MetaValue::Int(pending.len() as i64));
        let agg = aggregate_data_blocks(&pending, signer.validator_key(), metadata)?;
        self.write_with_retry(|| self.store.put_summary(&SummaryBlock::from(agg.clone())))?;

        info!(block = %agg.hash.short_hex(), data_blocks = pending.len(), "aggregated data blocks");
        self.emit(NodeEvent::Aggregated {
            hash: agg.hash,
            data_blocks: pending.len(),
        });
        Ok(agg)
    }

    /// Fold the oldest pending aggregation blocks (at most one batch) into a
    /// checkpoint block.
    pub fn checkpoint_pending(&self) -> NodeResult<CheckpointBlock> {
        let signer = self.signer()?;
        let batch = self.config.aggregation.checkpoint_threshold.max(1);
        let pending: Vec<AggregationBlock> =
            self.store.pending_aggregations()?.into_iter().take(batch).collect();

        let mut metadata = Metadata::new();
        metadata.insert("aggregation_blocks".into(), MetaValue::Int(pending.len() as i64));
        let ckpt = aggregate_aggregation_blocks(&pending, signer.validator_key(), metadata)?;
        self.write_with_retry(|| self.store.put_summary(&SummaryBlock::from(ckpt.clone())))?;

        info!(block = %ckpt.hash.short_hex(), aggregations = pending.len(), "checkpointed");
        self.emit(NodeEvent::Checkpointed {
            hash: ckpt.hash,
            aggregation_blocks: pending.len(),
        });
        Ok(ckpt)
    }

    // ---------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            store: self.store.stats(),
            cache: self.cache.stats(),
            tips: self.tips.snapshot(),
        }
    }

    /// Clear the store, cache, and tip set. Refused in production.
    pub fn reset(&self) -> NodeResult<()> {
        let _admission = self.admission.lock();
        self.store.reset()?;
        self.cache.clear();
        self.tips.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provdag_dag::{DagError, DagRules};
    use provdag_store::StoreError;

    fn signer() -> SigningKey {
        SigningKey::from_bytes([21; 32])
    }

    fn node() -> Node {
        Node::in_memory().with_signer(signer())
    }

    fn txn(seed: u8) -> Transaction {
        Transaction::with_timestamp("prov:Entity", vec![seed], seed as i64).unwrap()
    }

    #[test]
    fn first_block_is_genesis() {
        let node = node();
        let g = node.produce_block(vec![txn(1)], "milk_collection", Metadata::new()).unwrap();
        assert!(g.is_genesis());
        assert!(g.verify_signature());
        assert_eq!(node.tips(), vec![g.hash]);
    }

    #[test]
    fn produced_chain_advances_tips() {
        let node = node();
        let g = node.produce_block(vec![txn(1)], "t", Metadata::new()).unwrap();
        let c = node.produce_block(vec![txn(2)], "t", Metadata::new()).unwrap();
        assert_eq!(c.prev_hashes, vec![g.hash]);
        assert_eq!(c.height, 1);
        assert_eq!(node.tips(), vec![c.hash]);
        assert_eq!(node.recompute_tips().unwrap(), vec![c.hash]);
    }

    #[test]
    fn produce_without_key_fails() {
        let node = Node::in_memory();
        assert!(matches!(
            node.produce_block(vec![], "t", Metadata::new()),
            Err(NodeError::NoSigningKey)
        ));
    }

    #[test]
    fn admit_rejects_unknown_parent() {
        let node = node();
        let orphan = Block::assemble(provdag_block::BlockDraft {
            prev_hashes: vec![Digest::of(b"elsewhere")],
            height: 1,
            dag_weight: 1,
            validator: signer().validator_key(),
            supply_chain_type: "t".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            node.admit(orphan),
            Err(NodeError::Dag(DagError::UnresolvedParent(_)))
        ));
        assert_eq!(node.store().block_count(), 0);
    }

    #[test]
    fn admit_rejects_wrong_weight() {
        let node = node();
        let g = node.produce_block(vec![], "t", Metadata::new()).unwrap();
        let legacy = BlockBuilder::new(DagRules::legacy())
            .new_block(
                vec![g.hash],
                vec![txn(3)],
                signer().validator_key(),
                "t",
                Metadata::new(),
                &node.resolver(),
            )
            .unwrap();
        // Legacy weight = 1 parent + height 1 = 2; past set is 1.
        assert!(matches!(
            node.admit(legacy),
            Err(NodeError::Dag(DagError::WeightMismatch { .. }))
        ));
    }

    #[test]
    fn admit_is_idempotent() {
        let node = node();
        let g = node.produce_block(vec![], "t", Metadata::new()).unwrap();
        assert!(!node.admit(g).unwrap());
        assert_eq!(node.store().block_count(), 1);
    }

    #[test]
    fn signatures_can_be_required() {
        let mut config = NodeConfig::default();
        config.admission.require_signatures = true;
        let node = Node::with_store(config, BlockStore::in_memory()).unwrap();
        let unsigned = Block::assemble(provdag_block::BlockDraft {
            validator: signer().validator_key(),
            supply_chain_type: "t".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(node.admit(unsigned.clone()), Err(NodeError::UnsignedBlock(_))));

        // A signature from another key does not count.
        let forged = unsigned.clone().signed(&SigningKey::from_bytes([99; 32]));
        assert!(matches!(node.admit(forged), Err(NodeError::UnsignedBlock(_))));

        assert!(node.admit(unsigned.signed(&signer())).unwrap());
    }

    #[test]
    fn reads_go_through_cache() {
        let node = node();
        let g = node.produce_block(vec![txn(7)], "t", Metadata::new()).unwrap();
        assert_eq!(node.get_block(&g.hash).unwrap(), g);
        assert_eq!(node.get_transaction(&g.transactions[0].hash).unwrap(), g.transactions[0]);
        assert!(node.stats().cache.block_hits >= 1);

        node.cache().set_enabled(false);
        assert_eq!(node.get_block(&g.hash).unwrap(), g);
        assert!(node.get_block(&Digest::of(b"none")).unwrap_err().is_not_found());
    }

    #[test]
    fn admission_does_not_depend_on_the_cache() {
        let producer = node();
        let g = producer.produce_block(vec![txn(1)], "feed_delivery", Metadata::new()).unwrap();
        let c = producer.produce_block(vec![txn(2)], "feed_delivery", Metadata::new()).unwrap();

        let replica = Node::in_memory();
        replica.cache().set_enabled(false);
        assert_eq!(replica.cache().put_block(&g), Err(CacheError::Disabled));

        assert!(replica.admit(g.clone()).unwrap());
        assert!(replica.admit(c.clone()).unwrap());

        assert_eq!(replica.store().get_block(&c.hash).unwrap(), c);
        assert_eq!(replica.blocks_at_height(1).unwrap(), vec![c.clone()]);
        assert_eq!(replica.blocks_of_type("feed_delivery").unwrap(), vec![g, c.clone()]);
        assert_eq!(replica.tips(), vec![c.hash]);
        assert_eq!(replica.stats().cache.block_entries, 0);
    }

    #[test]
    fn concurrent_admission_keeps_tips_consistent() {
        let producer = node();
        let mut blocks = Vec::new();
        for i in 0..24 {
            blocks.push(producer.produce_block(vec![txn(i)], "t", Metadata::new()).unwrap());
        }

        let replica = Node::in_memory();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for block in &blocks {
                        // Another thread may not have stored the parent yet.
                        while let Err(e) = replica.admit(block.clone()) {
                            assert!(matches!(e, NodeError::Dag(DagError::UnresolvedParent(_))));
                            std::thread::yield_now();
                        }
                    }
                });
            }
        });

        assert_eq!(replica.store().block_count(), 24);
        assert_eq!(replica.tips(), producer.tips());
        assert_eq!(replica.tips(), replica.recompute_tips().unwrap());
    }

    #[test]
    fn standalone_transaction_lookup() {
        let node = node();
        let t = txn(8);
        node.put_transaction(&t).unwrap();
        assert_eq!(node.get_transaction(&t.hash).unwrap(), t);
    }

    #[test]
    fn aggregation_folds_pending_blocks() {
        let node = node();
        assert!(node.aggregate_pending().unwrap_err().is_no_input());

        for i in 0..3 {
            node.produce_block(vec![txn(i)], "t", Metadata::new()).unwrap();
        }
        let agg = node.aggregate_pending().unwrap();
        assert_eq!(agg.referenced_data_block_hashes.len(), 3);
        assert!(node.store().pending_data_blocks().unwrap().is_empty());

        let ckpt = node.checkpoint_pending().unwrap();
        assert_eq!(ckpt.referenced_aggregation_block_hashes, vec![agg.hash]);
        assert!(node.checkpoint_pending().unwrap_err().is_no_input());
    }

    #[test]
    fn batch_admission_orders_parents_first() {
        let producer = node();
        let blocks: Vec<Block> = (0..4)
            .map(|i| producer.produce_block(vec![txn(i)], "t", Metadata::new()).unwrap())
            .collect();

        let replica = Node::in_memory();
        let mut shuffled = blocks.clone();
        shuffled.reverse();
        assert_eq!(replica.admit_batch(shuffled).unwrap(), 4);
        assert_eq!(replica.tips(), producer.tips());
        assert_eq!(replica.dag_snapshot().unwrap().len(), 4);
    }

    #[test]
    fn reset_clears_everything() {
        let node = node();
        node.produce_block(vec![], "t", Metadata::new()).unwrap();
        node.reset().unwrap();
        assert_eq!(node.store().block_count(), 0);
        assert!(node.tips().is_empty());
        assert!(matches!(
            node.get_block(&Digest::of(b"x")),
            Err(NodeError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn admission_is_broadcast() {
        let node = node();
        let mut rx = node.subscribe();
        let g = node.produce_block(vec![], "milk_collection", Metadata::new()).unwrap();
        match rx.recv().await.unwrap() {
            NodeEvent::BlockAdmitted { hash, height, supply_chain_type, .. } => {
                assert_eq!(hash, g.hash);
                assert_eq!(height, 0);
                assert_eq!(supply_chain_type, "milk_collection");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
