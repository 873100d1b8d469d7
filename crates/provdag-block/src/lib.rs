//! Block model for the ProvDAG ledger.
//!
//! Blocks come in three tiers:
//!
//! - [`Block`]: the leaf tier. Carries transactions and references earlier
//!   blocks through `prev_hashes`. [`DataBlock`] is the same type; the unified
//!   single-tier form is simply a data block with a DAG weight.
//! - [`AggregationBlock`]: fans in a batch of data blocks at fixed height 2.
//! - [`CheckpointBlock`]: fans in a batch of aggregation blocks at fixed height 3.
//!
//! Every block is content-addressed: its `hash` is derived from a canonical
//! serialization of every other field except the signature.

pub mod block;
pub mod error;
pub mod meta;
pub mod summary;
pub mod txn;
pub mod vertex;

pub use block::{Block, BlockDraft, DataBlock};
pub use error::{BlockError, BlockResult};
pub use meta::{metadata_from_json, MetaValue, Metadata};
pub use summary::{
    AggregationBlock, CheckpointBlock, SummaryBlock, Tier, AGGREGATION_HEIGHT, CHECKPOINT_HEIGHT,
};
pub use txn::{OpaqueTxn, Transaction};
pub use vertex::DagVertex;
