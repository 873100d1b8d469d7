use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use provdag_cache::CacheConfig;
use provdag_dag::{DagRules, ReferencePolicy};
use provdag_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// When pending blocks are folded into the tier above.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationPolicy {
    /// Fold once this many data blocks are pending. Also the batch size.
    pub data_block_threshold: usize,
    /// Checkpoint once this many aggregation blocks are pending.
    pub checkpoint_threshold: usize,
    /// Fold whatever is pending after this long, in milliseconds.
    pub window_ms: u64,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            data_block_threshold: 64,
            checkpoint_threshold: 16,
            window_ms: 30_000,
        }
    }
}

impl AggregationPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Admission checks beyond structural validity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Reject blocks without a valid signature.
    pub require_signatures: bool,
    /// Attempts at a store write that times out or aborts.
    pub max_write_attempts: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            require_signatures: false,
            max_write_attempts: 3,
        }
    }
}

/// Full node configuration, stored as `provdag.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub rules: DagRules,
    pub references: ReferencePolicy,
    pub aggregation: AggregationPolicy,
    pub admission: AdmissionConfig,
}

impl NodeConfig {
    pub const FILE_NAME: &'static str = "provdag.toml";

    /// Defaults with the store persisted under `dir/data`.
    pub fn for_dir(dir: &Path) -> Self {
        Self {
            store: StoreConfig::at(dir.join("data")),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> NodeResult<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> NodeResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(Self::FILE_NAME)
    }
}
