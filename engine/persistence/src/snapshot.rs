//! Snapshot implementation for periodic state captures
//!
//! Snapshots provide periodic "photos" of the engine state, enabling
//! faster recovery by starting from a known good state and replaying only
//! the WAL entries written after it.

use crate::config::SnapshotConfig;
use crate::error::{PersistenceError, Result};
use crate::state::EngineState;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A snapshot of the engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier for this snapshot
    pub id: Uuid,

    /// Timestamp when the snapshot was created
    pub timestamp: DateTime<Utc>,

    /// Last WAL sequence folded into `state`
    pub wal_sequence: u64,

    /// The engine state at this point in time
    pub state: EngineState,

    /// Metadata about the snapshot
    pub metadata: SnapshotMetadata,
}

/// Snapshot metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Snapshot version
    pub version: String,

    /// Compression used
    pub compression: Option<String>,

    /// Number of leagues captured
    pub league_count: usize,
}

/// Snapshot file information
#[derive(Debug, Clone)]
pub struct SnapshotFileInfo {
    /// File path
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Snapshot ID
    pub snapshot_id: Uuid,

    /// WAL sequence the snapshot covers
    pub wal_sequence: u64,
}

/// Snapshot manager
pub struct SnapshotManager {
    config: SnapshotConfig,
    snapshots_dir: PathBuf,
}

impl SnapshotManager {
    /// Create a new snapshot manager
    pub fn new(config: SnapshotConfig, snapshots_dir: PathBuf) -> Result<Self> {
        // Ensure snapshots directory exists
        std::fs::create_dir_all(&snapshots_dir).map_err(PersistenceError::Io)?;

        Ok(Self { config, snapshots_dir })
    }

    /// Build the in-memory snapshot record
    pub fn build(state: EngineState, wal_sequence: u64, compress: bool) -> Snapshot {
        let league_count = state.leagues.len();
        Snapshot {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            wal_sequence,
            state,
            metadata: SnapshotMetadata {
                version: "1.0".to_string(),
                compression: if compress { Some("gzip".to_string()) } else { None },
                league_count,
            },
        }
    }

    /// Create a new snapshot
    pub async fn create_snapshot(&self, state: EngineState, wal_sequence: u64) -> Result<Uuid> {
        let start_time = std::time::Instant::now();
        let snapshot = Self::build(state, wal_sequence, self.config.compress);

        let file_path = self.write_snapshot_file(&snapshot)?;
        let file_size = std::fs::metadata(&file_path).map_err(PersistenceError::Io)?.len();

        tracing::info!(
            "Created snapshot {} at WAL sequence {} ({}ms, {} bytes)",
            snapshot.id,
            wal_sequence,
            start_time.elapsed().as_millis(),
            file_size
        );

        // Clean up old snapshots AFTER creating new one
        self.cleanup_old_snapshots().await?;

        Ok(snapshot.id)
    }

    /// Load the most recent snapshot
    pub async fn load_latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let snapshots = self.list_snapshots().await?;

        let Some(latest) = snapshots.last() else {
            tracing::info!("No snapshots found, starting with clean state");
            return Ok(None);
        };

        tracing::info!(
            "Loading latest snapshot: ID={}, wal_sequence={}, path={:?}",
            latest.snapshot_id,
            latest.wal_sequence,
            latest.path
        );

        let snapshot = Self::load_snapshot(&latest.path)?;
        Ok(Some(snapshot))
    }

    /// Load a specific snapshot by ID
    pub async fn load_snapshot_by_id(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>> {
        let snapshots = self.list_snapshots().await?;

        for snapshot_info in snapshots {
            if snapshot_info.snapshot_id == snapshot_id {
                return Ok(Some(Self::load_snapshot(&snapshot_info.path)?));
            }
        }

        Ok(None)
    }

    /// Get information about all snapshots, oldest first
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotFileInfo>> {
        let mut snapshots = Vec::new();

        let entries = std::fs::read_dir(&self.snapshots_dir).map_err(PersistenceError::Io)?;

        for entry in entries {
            let entry = entry.map_err(PersistenceError::Io)?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("snapshot") {
                let size = entry.metadata().map_err(PersistenceError::Io)?.len();

                match Self::load_snapshot(&path) {
                    Ok(snapshot) => snapshots.push(SnapshotFileInfo {
                        path,
                        size,
                        snapshot_id: snapshot.id,
                        wal_sequence: snapshot.wal_sequence,
                    }),
                    Err(e) => tracing::warn!("Skipping unreadable snapshot {:?}: {}", path, e),
                }
            }
        }

        snapshots.sort_by_key(|s| s.wal_sequence);

        Ok(snapshots)
    }

    /// Clean up old snapshots based on retention policy
    pub async fn cleanup_old_snapshots(&self) -> Result<()> {
        let snapshots = self.list_snapshots().await?;

        if snapshots.len() <= self.config.max_snapshots {
            return Ok(());
        }

        let snapshots_to_remove = snapshots.len() - self.config.max_snapshots;
        for snapshot in snapshots.iter().take(snapshots_to_remove) {
            std::fs::remove_file(&snapshot.path).map_err(PersistenceError::Io)?;
            tracing::info!("Removed old snapshot: {:?}", snapshot.path);
        }

        Ok(())
    }

    // Private methods

    fn write_snapshot_file(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let filename = format!("snapshot_{:016x}_{}.snapshot", snapshot.wal_sequence, snapshot.id);
        let file_path = self.snapshots_dir.join(&filename);
        let tmp_path = self.snapshots_dir.join(format!("{filename}.tmp"));

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(PersistenceError::Io)?;

        let writer = BufWriter::new(file);

        if self.config.compress {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            serde_json::to_writer(&mut encoder, snapshot)
                .map_err(PersistenceError::Serialization)?;
            let mut writer = encoder.finish().map_err(PersistenceError::Io)?;
            writer.flush().map_err(PersistenceError::Io)?;
        } else {
            let mut writer = writer;
            serde_json::to_writer(&mut writer, snapshot)
                .map_err(PersistenceError::Serialization)?;
            writer.flush().map_err(PersistenceError::Io)?;
        }

        // Rename so a crash never leaves a half-written snapshot behind
        std::fs::rename(&tmp_path, &file_path).map_err(PersistenceError::Io)?;

        Ok(file_path)
    }

    fn load_snapshot(path: &Path) -> Result<Snapshot> {
        let mut reader = BufReader::new(File::open(path).map_err(PersistenceError::Io)?);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(PersistenceError::Io)?;

        let snapshot: Snapshot = if bytes.starts_with(&GZIP_MAGIC) {
            serde_json::from_reader(GzDecoder::new(bytes.as_slice()))
                .map_err(PersistenceError::Serialization)?
        } else {
            serde_json::from_slice(&bytes).map_err(PersistenceError::Serialization)?
        };

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_compressed_and_plain_snapshots_load() {
        let temp_dir = TempDir::new().unwrap();

        for compress in [true, false] {
            let dir = temp_dir.path().join(format!("compress_{compress}"));
            let config = SnapshotConfig { compress, ..Default::default() };
            let manager = SnapshotManager::new(config, dir).unwrap();

            let mut state = EngineState::new();
            state.next_claim_id = 42;
            let id = manager.create_snapshot(state, 17).await.unwrap();

            let loaded = manager.load_latest_snapshot().await.unwrap().unwrap();
            assert_eq!(loaded.id, id);
            assert_eq!(loaded.wal_sequence, 17);
            assert_eq!(loaded.state.next_claim_id, 42);
            assert_eq!(loaded.metadata.compression.is_some(), compress);
        }
    }

    #[tokio::test]
    async fn test_retention_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        let config = SnapshotConfig { max_snapshots: 2, ..Default::default() };
        let manager = SnapshotManager::new(config, temp_dir.path().to_path_buf()).unwrap();

        for sequence in [5, 10, 15] {
            manager.create_snapshot(EngineState::new(), sequence).await.unwrap();
        }

        let remaining: Vec<u64> =
            manager.list_snapshots().await.unwrap().iter().map(|s| s.wal_sequence).collect();
        assert_eq!(remaining, vec![10, 15]);
    }
}
