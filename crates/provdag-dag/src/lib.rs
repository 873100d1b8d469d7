//! DAG maintenance algorithms for the ProvDAG ledger.
//!
//! Everything here is pure and synchronous: height and weight computation,
//! tip selection, producer-side parent choice, and tier aggregation. Lookups
//! of already-known blocks go through the [`BlockResolver`] trait so the
//! same code runs against the durable store, the hot cache, or an in-memory
//! [`BlockDag`].

pub mod aggregate;
pub mod builder;
pub mod error;
pub mod graph;
pub mod policy;
pub mod resolver;
pub mod rules;
pub mod tips;

pub use aggregate::{
    aggregate_aggregation_blocks, aggregate_aggregation_blocks_at, aggregate_data_blocks,
    aggregate_data_blocks_at,
};
pub use builder::BlockBuilder;
pub use error::{DagError, DagResult};
pub use graph::{order_batch, BlockDag};
pub use policy::ReferencePolicy;
pub use resolver::{BlockResolver, VertexInfo};
pub use rules::{
    compute_height, compute_weight, past_set_size, past_set_weight, DagRules, HeightRule,
    WeightRule,
};
pub use tips::{advance_tips, select_tips, select_tips_or_genesis, GENESIS_SENTINEL};
