//! Hot-path cache and tip registry.
//!
//! Both are advisory. The durable store stays the source of truth: a cache
//! miss falls back to a store read, and a stale or empty tip registry can be
//! rebuilt by running tip selection over the store.

pub mod config;
pub mod error;
pub mod hot;
pub mod tips;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use hot::{CacheStats, HotCache};
pub use tips::{TipRegistry, TipSet};
