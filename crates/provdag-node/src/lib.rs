//! The ProvDAG node: block production, admission, and tier aggregation.
//!
//! A [`Node`] owns the durable [`BlockStore`](provdag_store::BlockStore), the
//! [`HotCache`](provdag_cache::HotCache), and the
//! [`TipRegistry`](provdag_cache::TipRegistry). Admission validates a block
//! against the configured DAG rules, persists it, then updates the cache and
//! tip set and broadcasts a [`NodeEvent`].

pub mod config;
pub mod error;
pub mod events;
pub mod node;
pub mod resolver;
pub mod scheduler;

pub use config::{AdmissionConfig, AggregationPolicy, NodeConfig};
pub use error::{NodeError, NodeResult};
pub use events::NodeEvent;
pub use node::{Node, NodeStats};
pub use resolver::StoreResolver;
pub use scheduler::{AggregationScheduler, SchedulerHandle, StepOutcome};
