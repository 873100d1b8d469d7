use serde::{Deserialize, Serialize};

/// Hot-path cache sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum cached blocks.
    pub block_capacity: usize,
    /// Maximum cached transactions.
    pub transaction_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_capacity: 4_096,
            transaction_capacity: 16_384,
        }
    }
}
