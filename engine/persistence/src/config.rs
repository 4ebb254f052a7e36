//! Configuration for the persistence layer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Base directory for persistence files
    pub data_dir: PathBuf,

    /// WAL configuration
    pub wal: WalConfig,

    /// Snapshot configuration
    pub snapshot: SnapshotConfig,
}

/// Write-Ahead Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Maximum size of a single WAL file before rotation
    pub max_file_size: u64,

    /// Number of fully snapshotted WAL files kept after compaction
    pub max_files: usize,

    /// Whether to fsync on every write (for maximum durability)
    pub fsync_every_write: bool,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Seconds between automatic checkpoints taken by the service
    pub interval_secs: u64,

    /// Maximum number of snapshots to keep
    pub max_snapshots: usize,

    /// Whether to gzip snapshot files
    pub compress: bool,

    /// Whether to checkpoint on shutdown
    pub snapshot_on_shutdown: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal: WalConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            max_file_size: 64 * 1024 * 1024, // 64MB
            max_files: 4,
            fsync_every_write: false,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { interval_secs: 300, max_snapshots: 12, compress: true, snapshot_on_shutdown: true }
    }
}

impl PersistenceConfig {
    /// Create a new configuration with custom data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Default::default() }
    }

    /// Get the WAL directory path
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// Get the snapshots directory path
    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.wal.max_file_size == 0 {
            return Err("WAL max_file_size must be greater than 0".to_string());
        }

        if self.snapshot.max_snapshots == 0 {
            return Err("Snapshot max_snapshots must be greater than 0".to_string());
        }

        if self.snapshot.interval_secs == 0 {
            return Err("Snapshot interval_secs must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PersistenceConfig::new("/tmp/engine");
        assert!(config.validate().is_ok());
        assert_eq!(config.wal_dir(), PathBuf::from("/tmp/engine/wal"));
        assert_eq!(config.snapshots_dir(), PathBuf::from("/tmp/engine/snapshots"));
    }

    #[test]
    fn test_zero_snapshot_retention_rejected() {
        let mut config = PersistenceConfig::default();
        config.snapshot.max_snapshots = 0;
        assert!(config.validate().is_err());
    }
}
