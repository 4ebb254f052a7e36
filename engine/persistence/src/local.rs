//! Constructors for the on-disk journal backend

use crate::backend::LocalPersistence;
use crate::config::PersistenceConfig;
use crate::error::Result;
use std::path::PathBuf;

/// WAL and snapshots under `data_dir`, default settings
pub fn create_local_persistence(data_dir: impl Into<PathBuf>) -> Result<LocalPersistence> {
    LocalPersistence::with_default_config(data_dir)
}

pub fn create_local_persistence_with_config(config: PersistenceConfig) -> Result<LocalPersistence> {
    LocalPersistence::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PersistenceBackend;
    use crate::state::EngineState;
    use crate::wal::WalOperation;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initialize_lays_out_journal_directories() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("journal");

        let persistence = create_local_persistence(data_dir.clone()).unwrap();
        persistence.initialize().await.unwrap();

        assert_eq!(persistence.data_dir(), &data_dir);
        assert!(data_dir.join("wal").is_dir());
        assert!(data_dir.join("snapshots").is_dir());
    }

    #[tokio::test]
    async fn test_halt_record_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let operation = WalOperation::LeagueHalted { league_id: 4, reason: "no rules".into() };
        {
            let persistence = create_local_persistence(temp_dir.path()).unwrap();
            persistence.initialize().await.unwrap();
            assert_eq!(persistence.write_wal_entry(operation.clone()).await.unwrap(), 1);
            persistence.shutdown().await.unwrap();
        }

        let persistence = create_local_persistence(temp_dir.path()).unwrap();
        persistence.initialize().await.unwrap();
        let entries = persistence.read_wal_after(0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, operation);
    }

    #[tokio::test]
    async fn test_uncompressed_snapshot_loads_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = PersistenceConfig::new(temp_dir.path());
        config.snapshot.compress = false;
        let persistence = create_local_persistence_with_config(config).unwrap();
        persistence.initialize().await.unwrap();

        let snapshot_id = persistence.create_snapshot(EngineState::new(), 100).await.unwrap();

        let snapshot = persistence.load_snapshot_by_id(snapshot_id).await.unwrap().unwrap();
        assert_eq!(snapshot.id, snapshot_id);
        assert_eq!(snapshot.wal_sequence, 100);
    }
}
