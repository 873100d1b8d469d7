//! Tier aggregation: pure batch-to-summary transforms.
//!
//! When to aggregate (pending count thresholds, time windows) is policy that
//! lives with the caller. These functions only record hashes; validating the
//! referenced blocks beforehand is the caller's job.

use provdag_block::{AggregationBlock, Block, CheckpointBlock, Metadata};
use provdag_types::{now_millis, ValidatorKey};
use tracing::debug;

use crate::error::{DagError, DagResult};

/// Fold a batch of data blocks into one aggregation block at height 2.
pub fn aggregate_data_blocks(
    data_blocks: &[Block],
    validator: ValidatorKey,
    metadata: Metadata,
) -> DagResult<AggregationBlock> {
    aggregate_data_blocks_at(data_blocks, validator, metadata, now_millis())
}

/// [`aggregate_data_blocks`] with an explicit timestamp.
pub fn aggregate_data_blocks_at(
    data_blocks: &[Block],
    validator: ValidatorKey,
    metadata: Metadata,
    timestamp: i64,
) -> DagResult<AggregationBlock> {
    if data_blocks.is_empty() {
        return Err(DagError::NoInputBlocks);
    }
    let references = data_blocks.iter().map(|b| b.hash).collect();
    let block = AggregationBlock::new(references, validator, metadata, timestamp)?;
    debug!(
        block = %block.hash.short_hex(),
        inputs = data_blocks.len(),
        "aggregated data blocks"
    );
    Ok(block)
}

/// Fold a batch of aggregation blocks into one checkpoint block at height 3.
pub fn aggregate_aggregation_blocks(
    agg_blocks: &[AggregationBlock],
    validator: ValidatorKey,
    metadata: Metadata,
) -> DagResult<CheckpointBlock> {
    aggregate_aggregation_blocks_at(agg_blocks, validator, metadata, now_millis())
}

/// [`aggregate_aggregation_blocks`] with an explicit timestamp.
pub fn aggregate_aggregation_blocks_at(
    agg_blocks: &[AggregationBlock],
    validator: ValidatorKey,
    metadata: Metadata,
    timestamp: i64,
) -> DagResult<CheckpointBlock> {
    if agg_blocks.is_empty() {
        return Err(DagError::NoInputBlocks);
    }
    let references = agg_blocks.iter().map(|b| b.hash).collect();
    let block = CheckpointBlock::new(references, validator, metadata, timestamp)?;
    debug!(
        block = %block.hash.short_hex(),
        inputs = agg_blocks.len(),
        "aggregated aggregation blocks"
    );
    Ok(block)
}
