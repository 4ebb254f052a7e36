//! Journal: WAL writes plus the folded state mirror
//!
//! Engines append operations through the journal. Each successful append is
//! folded into an in-memory [`EngineState`] so a checkpoint can snapshot a
//! state that matches the WAL sequence exactly.

use crate::backend::PersistenceBackend;
use crate::error::Result;
use crate::state::EngineState;
use crate::wal::WalOperation;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// What `Journal::open` found on storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub snapshot_id: Option<Uuid>,
    pub snapshot_sequence: u64,
    pub replayed_entries: usize,
    pub last_sequence: u64,
}

impl RecoveryReport {
    /// Nothing was on storage
    pub fn is_fresh(&self) -> bool {
        self.snapshot_id.is_none() && self.replayed_entries == 0
    }
}

struct Mirror {
    state: EngineState,
    last_sequence: u64,
}

pub struct Journal {
    backend: Arc<dyn PersistenceBackend>,
    mirror: Mutex<Mirror>,
    recovery: RecoveryReport,
}

impl Journal {
    /// Initialize the backend and rebuild state from snapshot + WAL suffix
    pub async fn open(backend: Arc<dyn PersistenceBackend>) -> Result<Self> {
        backend.initialize().await?;

        let snapshot = backend.load_latest_snapshot().await?;
        let (mut state, snapshot_id, snapshot_sequence) = match snapshot {
            Some(snapshot) => (snapshot.state, Some(snapshot.id), snapshot.wal_sequence),
            None => (EngineState::new(), None, 0),
        };

        let entries = backend.read_wal_after(snapshot_sequence).await?;
        let mut last_sequence = snapshot_sequence;
        for entry in &entries {
            state.apply(&entry.operation);
            last_sequence = entry.sequence;
        }

        let recovery = RecoveryReport {
            snapshot_id,
            snapshot_sequence,
            replayed_entries: entries.len(),
            last_sequence,
        };

        tracing::info!(
            "Journal recovered: snapshot={:?} at {}, replayed {} WAL entries, {} leagues",
            recovery.snapshot_id,
            recovery.snapshot_sequence,
            recovery.replayed_entries,
            state.leagues.len()
        );

        Ok(Self { backend, mirror: Mutex::new(Mirror { state, last_sequence }), recovery })
    }

    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.backend
    }

    /// Durably append an operation; nothing is folded if the write fails
    pub async fn append(&self, operation: WalOperation) -> Result<u64> {
        let mut mirror = self.mirror.lock().await;
        let sequence = self.backend.write_wal_entry(operation.clone()).await?;
        mirror.state.apply(&operation);
        mirror.last_sequence = sequence;
        Ok(sequence)
    }

    /// Copy of the folded state
    pub async fn state(&self) -> EngineState {
        self.mirror.lock().await.state.clone()
    }

    pub async fn last_sequence(&self) -> u64 {
        self.mirror.lock().await.last_sequence
    }

    /// Snapshot the folded state and compact the WAL behind it
    pub async fn checkpoint(&self) -> Result<Uuid> {
        let mut mirror = self.mirror.lock().await;
        let through = mirror.last_sequence;
        let snapshot_id = self.backend.create_snapshot(mirror.state.clone(), through).await?;

        let marker = WalOperation::Checkpoint { snapshot_id, timestamp: Utc::now() };
        mirror.last_sequence = self.backend.write_wal_entry(marker).await?;
        drop(mirror);

        let removed = self.backend.compact_wal(through).await?;
        tracing::debug!("Checkpoint {} through {}; compacted {} WAL units", snapshot_id, through, removed);

        Ok(snapshot_id)
    }

    /// Final checkpoint (when configured) and backend shutdown
    pub async fn close(&self) -> Result<()> {
        if self.backend.config().snapshot.snapshot_on_shutdown {
            self.checkpoint().await?;
        }
        self.backend.shutdown().await
    }
}
