use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Flush/sync strategy for the WAL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every write.
    EveryWrite,
    /// Flush to the OS and rely on page-cache writeback.
    #[default]
    OsDefault,
}

/// Deployment profile. Only non-production stores may be reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Development,
    Test,
    Production,
}

impl Profile {
    pub fn allows_reset(self) -> bool {
        !matches!(self, Profile::Production)
    }
}

/// Block store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `blocks.wal`. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub sync_mode: SyncMode,
    /// Bounded wait for the writer lock, in milliseconds.
    pub write_timeout_ms: u64,
    pub profile: Profile,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_mode: SyncMode::default(),
            write_timeout_ms: 5_000,
            profile: Profile::default(),
        }
    }
}

impl StoreConfig {
    pub const WAL_FILE: &'static str = "blocks.wal";

    /// A persistent configuration rooted at `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// A memory-only configuration for tests.
    pub fn ephemeral() -> Self {
        Self {
            profile: Profile::Test,
            ..Self::default()
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn wal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(Self::WAL_FILE))
    }
}
