//! Producer-side block construction.

use provdag_block::{Block, BlockDraft, Metadata, Transaction};
use provdag_types::{now_millis, Digest, ValidatorKey};

use crate::error::{DagError, DagResult};
use crate::resolver::BlockResolver;
use crate::rules::DagRules;
use crate::tips::GENESIS_SENTINEL;

/// Builds blocks whose height and weight follow a fixed set of [`DagRules`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockBuilder {
    rules: DagRules,
}

impl BlockBuilder {
    pub fn new(rules: DagRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> DagRules {
        self.rules
    }

    /// Build a new block stamped with the current time.
    ///
    /// Parents must resolve through `resolver`; `[GENESIS_SENTINEL]` builds a
    /// genesis block.
    pub fn new_block<R: BlockResolver + ?Sized>(
        &self,
        prev_hashes: Vec<Digest>,
        transactions: Vec<Transaction>,
        validator: ValidatorKey,
        supply_chain_type: impl Into<String>,
        metadata: Metadata,
        resolver: &R,
    ) -> DagResult<Block> {
        self.new_block_at(
            prev_hashes,
            transactions,
            validator,
            supply_chain_type,
            metadata,
            now_millis(),
            resolver,
        )
    }

    /// [`BlockBuilder::new_block`] with an explicit timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new_block_at<R: BlockResolver + ?Sized>(
        &self,
        mut prev_hashes: Vec<Digest>,
        transactions: Vec<Transaction>,
        validator: ValidatorKey,
        supply_chain_type: impl Into<String>,
        metadata: Metadata,
        timestamp: i64,
        resolver: &R,
    ) -> DagResult<Block> {
        if prev_hashes.as_slice() == [GENESIS_SENTINEL] {
            prev_hashes.clear();
        }
        let mut draft = BlockDraft {
            prev_hashes,
            timestamp,
            height: 0,
            dag_weight: 0,
            validator,
            transactions,
            supply_chain_type: supply_chain_type.into(),
            metadata,
        };
        draft.validate()?;

        let (height, weight) = self.rules.height_and_weight(&draft.prev_hashes, resolver)?;
        draft.height = height;
        draft.dag_weight = weight;
        Ok(Block::assemble(draft)?)
    }

    /// Check that `block`'s recorded height and weight match these rules.
    pub fn verify_placement<R: BlockResolver + ?Sized>(
        &self,
        block: &Block,
        resolver: &R,
    ) -> DagResult<()> {
        let (height, weight) = self.rules.height_and_weight(&block.prev_hashes, resolver)?;
        if block.height != height {
            return Err(DagError::HeightMismatch {
                hash: block.hash,
                recorded: block.height,
                expected: height,
            });
        }
        if block.dag_weight != weight {
            return Err(DagError::WeightMismatch {
                hash: block.hash,
                recorded: block.dag_weight,
                expected: weight,
            });
        }
        Ok(())
    }
}
