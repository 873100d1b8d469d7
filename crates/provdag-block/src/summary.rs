//! Mid and top tier blocks.
//!
//! Summary blocks only record the hashes of the blocks they fold in. They
//! never inspect or re-validate the referenced blocks; folding is additive
//! indexing and never removes the originals.

use std::fmt;

use provdag_crypto::ContentHasher;
use provdag_types::{Digest, ValidatorKey};
use serde::{Deserialize, Serialize};

use crate::error::{BlockError, BlockResult};
use crate::meta::{check_metadata, Metadata};

/// Fixed height of every aggregation block.
pub const AGGREGATION_HEIGHT: u64 = 2;
/// Fixed height of every checkpoint block.
pub const CHECKPOINT_HEIGHT: u64 = 3;

/// Block tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Data,
    Aggregation,
    Checkpoint,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Aggregation => write!(f, "aggregation"),
            Self::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

/// Fan-in node over a batch of data blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationBlock {
    pub hash: Digest,
    /// Never empty; input order is preserved.
    pub referenced_data_block_hashes: Vec<Digest>,
    pub timestamp: i64,
    /// Always [`AGGREGATION_HEIGHT`].
    pub height: u64,
    pub validator: ValidatorKey,
    pub metadata: Metadata,
}

/// Fan-in node over a batch of aggregation blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointBlock {
    pub hash: Digest,
    /// Never empty; input order is preserved.
    pub referenced_aggregation_block_hashes: Vec<Digest>,
    pub timestamp: i64,
    /// Always [`CHECKPOINT_HEIGHT`].
    pub height: u64,
    pub validator: ValidatorKey,
    pub metadata: Metadata,
}

#[derive(Serialize)]
struct SummaryPreimage<'a> {
    references: Vec<String>,
    timestamp: i64,
    height: u64,
    validator: String,
    metadata: &'a Metadata,
}

fn summary_hash(
    hasher: &ContentHasher,
    references: &[Digest],
    timestamp: i64,
    height: u64,
    validator: &ValidatorKey,
    metadata: &Metadata,
) -> BlockResult<Digest> {
    check_metadata(metadata)?;
    let preimage = SummaryPreimage {
        references: references.iter().map(Digest::to_hex).collect(),
        timestamp,
        height,
        validator: validator.to_hex(),
        metadata,
    };
    Ok(hasher.hash_canonical(&preimage)?)
}

fn check_summary_input(references: &[Digest], validator: &ValidatorKey) -> BlockResult<()> {
    if references.is_empty() {
        return Err(BlockError::InvalidInput("summary block references nothing".into()));
    }
    if validator.is_empty() {
        return Err(BlockError::InvalidInput("validator is empty".into()));
    }
    let mut sorted = references.to_vec();
    sorted.sort();
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(BlockError::InvalidInput("summary block references a block twice".into()));
    }
    Ok(())
}

impl AggregationBlock {
    /// Build an aggregation block over `references` (order preserved).
    pub fn new(
        references: Vec<Digest>,
        validator: ValidatorKey,
        metadata: Metadata,
        timestamp: i64,
    ) -> BlockResult<Self> {
        check_summary_input(&references, &validator)?;
        let mut block = Self {
            hash: Digest::zero(),
            referenced_data_block_hashes: references,
            timestamp,
            height: AGGREGATION_HEIGHT,
            validator,
            metadata,
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    pub fn compute_hash(&self) -> BlockResult<Digest> {
        summary_hash(
            &ContentHasher::AGGREGATION,
            &self.referenced_data_block_hashes,
            self.timestamp,
            self.height,
            &self.validator,
            &self.metadata,
        )
    }

    pub fn verify_hash(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    pub fn check_well_formed(&self) -> BlockResult<()> {
        check_summary_input(&self.referenced_data_block_hashes, &self.validator)
            .map_err(|e| BlockError::malformed(self.hash, e.to_string()))?;
        if self.height != AGGREGATION_HEIGHT {
            return Err(BlockError::malformed(self.hash, "aggregation block height must be 2"));
        }
        if !self.verify_hash() {
            return Err(BlockError::malformed(self.hash, "hash does not match content"));
        }
        Ok(())
    }
}

impl CheckpointBlock {
    /// Build a checkpoint block over `references` (order preserved).
    pub fn new(
        references: Vec<Digest>,
        validator: ValidatorKey,
        metadata: Metadata,
        timestamp: i64,
    ) -> BlockResult<Self> {
        check_summary_input(&references, &validator)?;
        let mut block = Self {
            hash: Digest::zero(),
            referenced_aggregation_block_hashes: references,
            timestamp,
            height: CHECKPOINT_HEIGHT,
            validator,
            metadata,
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    pub fn compute_hash(&self) -> BlockResult<Digest> {
        summary_hash(
            &ContentHasher::CHECKPOINT,
            &self.referenced_aggregation_block_hashes,
            self.timestamp,
            self.height,
            &self.validator,
            &self.metadata,
        )
    }

    pub fn verify_hash(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    pub fn check_well_formed(&self) -> BlockResult<()> {
        check_summary_input(&self.referenced_aggregation_block_hashes, &self.validator)
            .map_err(|e| BlockError::malformed(self.hash, e.to_string()))?;
        if self.height != CHECKPOINT_HEIGHT {
            return Err(BlockError::malformed(self.hash, "checkpoint block height must be 3"));
        }
        if !self.verify_hash() {
            return Err(BlockError::malformed(self.hash, "hash does not match content"));
        }
        Ok(())
    }
}

/// Either upper-tier block, as persisted in the summary table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SummaryBlock {
    Aggregation(AggregationBlock),
    Checkpoint(CheckpointBlock),
}

impl SummaryBlock {
    pub fn hash(&self) -> Digest {
        match self {
            Self::Aggregation(b) => b.hash,
            Self::Checkpoint(b) => b.hash,
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            Self::Aggregation(_) => Tier::Aggregation,
            Self::Checkpoint(_) => Tier::Checkpoint,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Aggregation(b) => b.timestamp,
            Self::Checkpoint(b) => b.timestamp,
        }
    }

    /// Hashes of the lower-tier blocks this block folds in.
    pub fn references(&self) -> &[Digest] {
        match self {
            Self::Aggregation(b) => &b.referenced_data_block_hashes,
            Self::Checkpoint(b) => &b.referenced_aggregation_block_hashes,
        }
    }

    pub fn check_well_formed(&self) -> BlockResult<()> {
        match self {
            Self::Aggregation(b) => b.check_well_formed(),
            Self::Checkpoint(b) => b.check_well_formed(),
        }
    }

    pub fn as_aggregation(&self) -> Option<&AggregationBlock> {
        match self {
            Self::Aggregation(b) => Some(b),
            Self::Checkpoint(_) => None,
        }
    }

    pub fn as_checkpoint(&self) -> Option<&CheckpointBlock> {
        match self {
            Self::Checkpoint(b) => Some(b),
            Self::Aggregation(_) => None,
        }
    }
}

impl From<AggregationBlock> for SummaryBlock {
    fn from(block: AggregationBlock) -> Self {
        Self::Aggregation(block)
    }
}

impl From<CheckpointBlock> for SummaryBlock {
    fn from(block: CheckpointBlock) -> Self {
        Self::Checkpoint(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaValue;

    fn validator() -> ValidatorKey {
        ValidatorKey::from_bytes([3; 32])
    }

    fn refs(n: u8) -> Vec<Digest> {
        (0..n).map(|i| Digest::of(&[i])).collect()
    }

    #[test]
    fn aggregation_has_fixed_height_and_preserves_order() {
        let r = refs(3);
        let agg = AggregationBlock::new(r.clone(), validator(), Metadata::new(), 5).unwrap();
        assert_eq!(agg.height, AGGREGATION_HEIGHT);
        assert_eq!(agg.referenced_data_block_hashes, r);
        agg.check_well_formed().unwrap();
    }

    #[test]
    fn checkpoint_has_fixed_height() {
        let ckpt = CheckpointBlock::new(refs(2), validator(), Metadata::new(), 5).unwrap();
        assert_eq!(ckpt.height, CHECKPOINT_HEIGHT);
        ckpt.check_well_formed().unwrap();
    }

    #[test]
    fn empty_references_rejected() {
        assert!(matches!(
            AggregationBlock::new(vec![], validator(), Metadata::new(), 1),
            Err(BlockError::InvalidInput(_))
        ));
        assert!(matches!(
            CheckpointBlock::new(vec![], validator(), Metadata::new(), 1),
            Err(BlockError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_finite_metadata_rejected() {
        let mut meta = Metadata::new();
        meta.insert("yield".into(), MetaValue::Float(f64::NAN));
        assert!(matches!(
            AggregationBlock::new(refs(1), validator(), meta.clone(), 1),
            Err(BlockError::InvalidInput(_))
        ));
        assert!(CheckpointBlock::new(refs(1), validator(), meta, 1).is_err());
    }

    #[test]
    fn duplicate_references_rejected() {
        let d = Digest::of(b"dup");
        assert!(AggregationBlock::new(vec![d, d], validator(), Metadata::new(), 1).is_err());
    }

    #[test]
    fn tiers_hash_differently() {
        let r = refs(2);
        let agg = AggregationBlock::new(r.clone(), validator(), Metadata::new(), 9).unwrap();
        let ckpt = CheckpointBlock::new(r, validator(), Metadata::new(), 9).unwrap();
        assert_ne!(agg.hash, ckpt.hash);
    }

    #[test]
    fn tampered_height_is_malformed() {
        let mut agg = AggregationBlock::new(refs(1), validator(), Metadata::new(), 1).unwrap();
        agg.height = 7;
        assert!(agg.check_well_formed().is_err());
    }

    #[test]
    fn summary_accessors() {
        let agg = AggregationBlock::new(refs(2), validator(), Metadata::new(), 42).unwrap();
        let summary = SummaryBlock::from(agg.clone());
        assert_eq!(summary.hash(), agg.hash);
        assert_eq!(summary.tier(), Tier::Aggregation);
        assert_eq!(summary.timestamp(), 42);
        assert_eq!(summary.references(), agg.referenced_data_block_hashes.as_slice());
        assert!(summary.as_aggregation().is_some());
        assert!(summary.as_checkpoint().is_none());
    }

    #[test]
    fn bincode_roundtrip() {
        let ckpt = CheckpointBlock::new(refs(4), validator(), Metadata::new(), 77).unwrap();
        let summary = SummaryBlock::from(ckpt);
        let bytes = bincode::serialize(&summary).unwrap();
        let back: SummaryBlock = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, summary);
    }
}
