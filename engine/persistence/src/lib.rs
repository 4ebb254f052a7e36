//! # Persistence Layer
//!
//! Durability for the scoring and settlement engine. Every state change is
//! written to a Write-Ahead Log (WAL) before it is applied in memory;
//! periodic snapshots of the folded [`EngineState`] bound recovery time.
//!
//! ## Architecture
//!
//! - **PersistenceBackend**: Abstract trait for different storage backends
//! - **LocalPersistence**: Local file-based implementation
//! - **InMemoryPersistence**: Shared-storage backend for tests, with fault injection
//! - **Journal**: WAL appends plus the folded state mirror; recovery on open
//!
//! ## Usage
//!
//! ```rust
//! use persistence::{create_local_persistence, Journal, WalOperation};
//! use std::sync::Arc;
//! use tempfile::TempDir;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let backend = create_local_persistence(temp_dir.path())?;
//!     let journal = Journal::open(Arc::new(backend)).await?;
//!
//!     journal.append(WalOperation::LeagueResumed { league_id: 1 }).await?;
//!     journal.checkpoint().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod journal;
pub mod local;
pub mod snapshot;
pub mod state;
pub mod wal;

pub use backend::{FaultInjector, InMemoryPersistence, LocalPersistence, PersistenceBackend};
pub use config::PersistenceConfig;
pub use error::{PersistenceError, Result};
pub use journal::{Journal, RecoveryReport};
pub use local::{create_local_persistence, create_local_persistence_with_config};
pub use snapshot::Snapshot;
pub use state::{
    score_key, BatchRecord, BudgetRecord, ClaimRecord, EngineState, LeagueState, RuleVersionRecord,
    ScoreRecord, StatusChange,
};
pub use wal::{PriorityRecord, WalEntry, WalOperation};

pub use uuid::Uuid;
