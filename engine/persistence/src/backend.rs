//! Persistence backend trait and implementations

use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, Result};
use crate::snapshot::{Snapshot, SnapshotManager};
use crate::state::EngineState;
use crate::wal::{Wal, WalEntry, WalOperation};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Abstract trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Initialize the persistence backend
    async fn initialize(&self) -> Result<()>;

    /// Shutdown the persistence backend
    async fn shutdown(&self) -> Result<()>;

    /// Write a WAL entry; returns its sequence number
    async fn write_wal_entry(&self, operation: WalOperation) -> Result<u64>;

    /// Read every WAL entry with a sequence greater than `after`
    async fn read_wal_after(&self, after: u64) -> Result<Vec<WalEntry>>;

    /// Drop WAL data fully covered by a snapshot at `through`
    async fn compact_wal(&self, through: u64) -> Result<usize>;

    /// Create a snapshot of the engine state at a WAL sequence
    async fn create_snapshot(&self, state: EngineState, wal_sequence: u64) -> Result<Uuid>;

    /// Load the most recent snapshot
    async fn load_latest_snapshot(&self) -> Result<Option<Snapshot>>;

    /// Load a specific snapshot by ID
    async fn load_snapshot_by_id(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>>;

    /// Get the configuration
    fn config(&self) -> &PersistenceConfig;

    /// Get the data directory
    fn data_dir(&self) -> &PathBuf;
}

fn not_initialized() -> PersistenceError {
    PersistenceError::invalid_operation("Persistence backend not initialized")
}

/// Local file-based persistence backend
pub struct LocalPersistence {
    config: PersistenceConfig,
    wal: Wal,
    snapshot_manager: SnapshotManager,
    initialized: AtomicBool,
}

impl LocalPersistence {
    /// Create a new local persistence backend
    pub fn new(config: PersistenceConfig) -> Result<Self> {
        config.validate().map_err(PersistenceError::config)?;

        let wal = Wal::new(config.wal.clone(), config.wal_dir())?;
        let snapshot_manager =
            SnapshotManager::new(config.snapshot.clone(), config.snapshots_dir())?;

        Ok(Self { config, wal, snapshot_manager, initialized: AtomicBool::new(false) })
    }

    /// Create a new local persistence backend with default config
    pub fn with_default_config(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(PersistenceConfig::new(data_dir))
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(not_initialized())
        }
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for LocalPersistence {
    async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        std::fs::create_dir_all(&self.config.data_dir).map_err(PersistenceError::Io)?;
        std::fs::create_dir_all(self.config.wal_dir()).map_err(PersistenceError::Io)?;
        std::fs::create_dir_all(self.config.snapshots_dir()).map_err(PersistenceError::Io)?;

        self.initialized.store(true, Ordering::Release);

        tracing::info!("Local persistence backend initialized at: {:?}", self.config.data_dir);

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.wal.flush().await?;

        tracing::info!("Local persistence backend shutdown complete");

        Ok(())
    }

    async fn write_wal_entry(&self, operation: WalOperation) -> Result<u64> {
        self.ensure_initialized()?;
        self.wal.write_entry(operation).await
    }

    async fn read_wal_after(&self, after: u64) -> Result<Vec<WalEntry>> {
        self.ensure_initialized()?;
        self.wal.read_entries_after(after).await
    }

    async fn compact_wal(&self, through: u64) -> Result<usize> {
        self.ensure_initialized()?;
        self.wal.compact(through).await
    }

    async fn create_snapshot(&self, state: EngineState, wal_sequence: u64) -> Result<Uuid> {
        self.ensure_initialized()?;
        self.snapshot_manager.create_snapshot(state, wal_sequence).await
    }

    async fn load_latest_snapshot(&self) -> Result<Option<Snapshot>> {
        self.ensure_initialized()?;
        self.snapshot_manager.load_latest_snapshot().await
    }

    async fn load_snapshot_by_id(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>> {
        self.ensure_initialized()?;
        self.snapshot_manager.load_snapshot_by_id(snapshot_id).await
    }

    fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }
}

/// In-memory persistence backend (for testing)
///
/// Clones share storage, so a test can "restart" by opening a fresh
/// journal over a clone of the same backend.
#[derive(Clone)]
pub struct InMemoryPersistence {
    config: PersistenceConfig,
    wal_entries: Arc<tokio::sync::Mutex<Vec<WalEntry>>>,
    last_sequence: Arc<AtomicU64>,
    snapshots: Arc<tokio::sync::Mutex<HashMap<Uuid, Snapshot>>>,
    faults: FaultInjector,
    initialized: Arc<AtomicBool>,
}

/// Handle that makes an [`InMemoryPersistence`] refuse writes
#[derive(Clone, Default)]
pub struct FaultInjector {
    /// Writes still allowed before failing; negative means unlimited
    remaining_writes: Arc<AtomicI64>,
}

impl FaultInjector {
    /// Let `writes` more WAL writes succeed, then fail every write
    pub fn fail_after(&self, writes: u32) {
        self.remaining_writes.store(writes as i64, Ordering::SeqCst);
    }

    pub fn fail_now(&self) {
        self.fail_after(0);
    }

    pub fn heal(&self) {
        self.remaining_writes.store(-1, Ordering::SeqCst);
    }

    fn admit(&self) -> Result<()> {
        let outcome =
            self.remaining_writes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                n if n < 0 => Some(n),
                0 => None,
                n => Some(n - 1),
            });
        match outcome {
            Ok(_) => Ok(()),
            Err(_) => Err(PersistenceError::unavailable("injected write failure")),
        }
    }
}

impl InMemoryPersistence {
    /// Create a new in-memory persistence backend
    pub fn new(config: PersistenceConfig) -> Self {
        let faults = FaultInjector::default();
        faults.heal();
        Self {
            config,
            wal_entries: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            last_sequence: Arc::new(AtomicU64::new(0)),
            snapshots: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            faults,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a new in-memory persistence backend with default config
    pub fn with_default_config() -> Self {
        Self::new(PersistenceConfig::default())
    }

    pub fn faults(&self) -> FaultInjector {
        self.faults.clone()
    }

    /// Number of WAL entries written so far
    pub async fn wal_len(&self) -> usize {
        self.wal_entries.lock().await.len()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(not_initialized())
        }
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn initialize(&self) -> Result<()> {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            tracing::info!("In-memory persistence backend initialized");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }

    async fn write_wal_entry(&self, operation: WalOperation) -> Result<u64> {
        self.ensure_initialized()?;
        self.faults.admit()?;

        let mut entries = self.wal_entries.lock().await;
        let sequence = self.last_sequence.load(Ordering::SeqCst) + 1;
        entries.push(WalEntry::new(operation, sequence)?);
        self.last_sequence.store(sequence, Ordering::SeqCst);

        Ok(sequence)
    }

    async fn read_wal_after(&self, after: u64) -> Result<Vec<WalEntry>> {
        self.ensure_initialized()?;
        let entries = self.wal_entries.lock().await;
        let mut out = Vec::new();
        for entry in entries.iter().filter(|e| e.sequence > after) {
            entry.verify()?;
            out.push(entry.clone());
        }
        Ok(out)
    }

    async fn compact_wal(&self, through: u64) -> Result<usize> {
        self.ensure_initialized()?;
        let mut entries = self.wal_entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.sequence > through);
        Ok(before - entries.len())
    }

    async fn create_snapshot(&self, state: EngineState, wal_sequence: u64) -> Result<Uuid> {
        self.ensure_initialized()?;

        let snapshot = SnapshotManager::build(state, wal_sequence, false);
        let snapshot_id = snapshot.id;
        self.snapshots.lock().await.insert(snapshot_id, snapshot);

        Ok(snapshot_id)
    }

    async fn load_latest_snapshot(&self) -> Result<Option<Snapshot>> {
        self.ensure_initialized()?;

        let snapshots = self.snapshots.lock().await;
        let latest = snapshots.values().max_by_key(|s| (s.wal_sequence, s.timestamp)).cloned();

        Ok(latest)
    }

    async fn load_snapshot_by_id(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>> {
        self.ensure_initialized()?;
        Ok(self.snapshots.lock().await.get(&snapshot_id).cloned())
    }

    fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resumed(league_id: u32) -> WalOperation {
        WalOperation::LeagueResumed { league_id }
    }

    #[tokio::test]
    async fn test_uninitialized_backend_rejects_writes() {
        let backend = InMemoryPersistence::with_default_config();
        let err = backend.write_wal_entry(resumed(1)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let backend = InMemoryPersistence::with_default_config();
        backend.initialize().await.unwrap();
        let faults = backend.faults();

        faults.fail_after(1);
        assert_eq!(backend.write_wal_entry(resumed(1)).await.unwrap(), 1);
        let err = backend.write_wal_entry(resumed(2)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
        assert_eq!(backend.wal_len().await, 1);

        faults.heal();
        assert_eq!(backend.write_wal_entry(resumed(3)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let backend = InMemoryPersistence::with_default_config();
        backend.initialize().await.unwrap();
        backend.write_wal_entry(resumed(1)).await.unwrap();

        let restarted = backend.clone();
        let entries = restarted.read_wal_after(0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, resumed(1));
    }
}
