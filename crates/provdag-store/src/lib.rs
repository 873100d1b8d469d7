//! Durable block store for the ProvDAG ledger.
//!
//! Blocks, transactions, and summary blocks live in in-memory tables rebuilt
//! from a single append-only write-ahead log on open. Each `put_block` is one
//! framed WAL entry carrying the block, its index keys, and its transactions,
//! so a block becomes visible by hash, height, and type together or not at
//! all. Writes are serialized through one writer lock with a bounded wait.

pub mod config;
pub mod error;
pub mod stats;
pub mod store;
pub mod tables;
pub mod wal;

pub use config::{Profile, StoreConfig, SyncMode};
pub use error::{StoreError, StoreResult};
pub use stats::StoreStats;
pub use store::BlockStore;
pub use tables::{BlockVertex, IndexEntry};
pub use wal::{Recovery, WalRecord, WriteAheadLog};
