//! Write-Ahead Log (WAL) implementation
//!
//! Every engine state change is appended here before it is applied in
//! memory. Entries are JSON lines carrying a sequence number and a SipHash
//! checksum of the serialized operation.

use crate::config::WalConfig;
use crate::error::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use league_core::{
    ClaimStatus, EventKind, LeagueId, LeagueSettings, PlayerId, RejectionReason, RuleSpec, TeamId,
    TeamSeed, Week,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::hash::Hasher;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A single entry in the Write-Ahead Log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Unique identifier for this entry
    pub id: Uuid,

    /// Timestamp when the entry was created
    pub timestamp: DateTime<Utc>,

    /// The operation type
    pub operation: WalOperation,

    /// Sequence number for ordering
    pub sequence: u64,

    /// Checksum for integrity verification
    pub checksum: u64,
}

impl WalEntry {
    pub fn new(operation: WalOperation, sequence: u64) -> Result<Self> {
        let checksum = checksum_of(&operation)?;
        Ok(Self { id: Uuid::new_v4(), timestamp: Utc::now(), operation, sequence, checksum })
    }

    pub fn verify(&self) -> Result<()> {
        let expected = checksum_of(&self.operation)?;
        if expected != self.checksum {
            return Err(PersistenceError::corruption(format!(
                "checksum mismatch at sequence {}",
                self.sequence
            )));
        }
        Ok(())
    }
}

/// Waiver order as persisted alongside the claim that rotated it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRecord {
    pub order: Vec<TeamId>,
    pub version: u64,
}

/// Types of operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalOperation {
    /// League registered from seed data with its opening rosters and budgets
    LeagueRegistered { settings: LeagueSettings, teams: Vec<TeamSeed>, priority: Vec<TeamId> },

    /// New immutable scoring rule version
    RulePublished {
        league_id: LeagueId,
        version: u32,
        effective_from: DateTime<Utc>,
        rules: Vec<RuleSpec>,
    },

    /// Stat event applied to a score snapshot row
    ScoreApplied {
        league_id: LeagueId,
        player_id: PlayerId,
        week: Week,
        rule_version: u32,
        total_points: Decimal,
        delta: Decimal,
        sequence_id: u64,
        applied_at: DateTime<Utc>,
        /// Running yardage per kind, for threshold bonuses
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        stat_totals: BTreeMap<EventKind, Decimal>,
    },

    /// Latest standings, best team first
    StandingsRecorded { league_id: LeagueId, standings: Vec<TeamId>, at: DateTime<Utc> },

    /// Scoring halted for a league
    LeagueHalted { league_id: LeagueId, reason: String },

    /// Scoring resumed by an operator
    LeagueResumed { league_id: LeagueId },

    /// Roster and budget mutation for an accepted claim
    LedgerApplied {
        league_id: LeagueId,
        claim_id: u64,
        team_id: TeamId,
        acquire: PlayerId,
        drop: Option<PlayerId>,
        cost: u32,
    },

    /// Claim accepted into the league queue
    ClaimSubmitted {
        league_id: LeagueId,
        claim_id: u64,
        team_id: TeamId,
        target_player_id: PlayerId,
        drop_player_id: Option<PlayerId>,
        bid_amount: u32,
        submitted_at: DateTime<Utc>,
    },

    /// Claim withdrawn by its team before evaluation
    ClaimWithdrawn { league_id: LeagueId, claim_id: u64, at: DateTime<Utc> },

    /// Settlement batch opened over the pending claims
    BatchOpened {
        league_id: LeagueId,
        batch_id: u64,
        cutoff: DateTime<Utc>,
        /// (claim id, priority at submission)
        assignments: Vec<(u64, u32)>,
        opened_at: DateTime<Utc>,
    },

    /// Evaluation began for a claim
    ClaimEvaluating { league_id: LeagueId, batch_id: u64, claim_id: u64, at: DateTime<Utc> },

    /// Claim reached a terminal status
    ClaimResolved {
        league_id: LeagueId,
        batch_id: u64,
        claim_id: u64,
        status: ClaimStatus,
        reason: Option<RejectionReason>,
        cost_charged: Option<u32>,
        /// Rotated waiver order when the claim was accepted
        priority: Option<PriorityRecord>,
        at: DateTime<Utc>,
    },

    /// Every claim in the batch is terminal
    BatchResolved { league_id: LeagueId, batch_id: u64, resolved_at: DateTime<Utc> },

    /// System checkpoint
    Checkpoint { snapshot_id: Uuid, timestamp: DateTime<Utc> },
}

impl WalOperation {
    /// League the operation belongs to, if any
    pub fn league_id(&self) -> Option<LeagueId> {
        match self {
            WalOperation::LeagueRegistered { settings, .. } => Some(settings.league_id),
            WalOperation::RulePublished { league_id, .. }
            | WalOperation::ScoreApplied { league_id, .. }
            | WalOperation::StandingsRecorded { league_id, .. }
            | WalOperation::LeagueHalted { league_id, .. }
            | WalOperation::LeagueResumed { league_id }
            | WalOperation::LedgerApplied { league_id, .. }
            | WalOperation::ClaimSubmitted { league_id, .. }
            | WalOperation::ClaimWithdrawn { league_id, .. }
            | WalOperation::BatchOpened { league_id, .. }
            | WalOperation::ClaimEvaluating { league_id, .. }
            | WalOperation::ClaimResolved { league_id, .. }
            | WalOperation::BatchResolved { league_id, .. } => Some(*league_id),
            WalOperation::Checkpoint { .. } => None,
        }
    }
}

fn checksum_of(operation: &WalOperation) -> Result<u64> {
    let bytes = serde_json::to_vec(operation).map_err(PersistenceError::Serialization)?;
    let mut hasher = SipHasher13::new_with_keys(0x5741_4956, 0x4552_5321);
    hasher.write(&bytes);
    Ok(hasher.finish())
}

/// WAL file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalFileInfo {
    /// File path
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// First sequence number in this file
    pub first_sequence: u64,

    /// Last sequence number in this file
    pub last_sequence: u64,
}

/// Write-Ahead Log implementation
pub struct Wal {
    config: WalConfig,
    wal_dir: PathBuf,
    current_file: Arc<Mutex<Option<WalFile>>>,
    sequence_counter: Arc<Mutex<u64>>,
}

/// Current WAL file being written to
struct WalFile {
    writer: BufWriter<File>,
    current_size: u64,
}

impl Wal {
    /// Create a new WAL instance
    pub fn new(config: WalConfig, wal_dir: PathBuf) -> Result<Self> {
        // Ensure WAL directory exists
        std::fs::create_dir_all(&wal_dir).map_err(PersistenceError::Io)?;

        // New writes must never land on the end of a torn line
        Self::repair_torn_tails(&wal_dir)?;

        // Find the highest sequence number from existing files
        let sequence_counter = Self::find_highest_sequence(&wal_dir)?;

        Ok(Self {
            config,
            wal_dir,
            current_file: Arc::new(Mutex::new(None)),
            sequence_counter: Arc::new(Mutex::new(sequence_counter)),
        })
    }

    /// Write an entry to the WAL and flush it before returning
    pub async fn write_entry(&self, operation: WalOperation) -> Result<u64> {
        // Holding the counter across the write keeps file order equal to
        // sequence order.
        let mut counter = self.sequence_counter.lock().await;
        let sequence = *counter + 1;
        let entry = WalEntry::new(operation, sequence)?;

        self.write_to_file(&entry).await?;
        *counter = sequence;
        drop(counter);

        self.check_rotation().await?;

        Ok(sequence)
    }

    /// Highest sequence written so far
    pub async fn last_sequence(&self) -> u64 {
        *self.sequence_counter.lock().await
    }

    /// Flush all pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        let mut current_file = self.current_file.lock().await;
        if let Some(ref mut file) = *current_file {
            file.writer.flush().map_err(PersistenceError::Io)?;
            file.writer.get_ref().sync_all().map_err(PersistenceError::Io)?;
        }
        Ok(())
    }

    /// Read every verified entry with a sequence greater than `after`
    pub async fn read_entries_after(&self, after: u64) -> Result<Vec<WalEntry>> {
        let files = self.list_files().await?;
        let mut entries = Vec::new();

        for file in files.iter().filter(|f| f.last_sequence > after) {
            let content = std::fs::read_to_string(&file.path).map_err(PersistenceError::Io)?;
            let lines: Vec<&str> = content.lines().collect();
            for (index, line) in lines.iter().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let entry = match serde_json::from_str::<WalEntry>(line) {
                    Ok(entry) => entry,
                    // A torn final line is what a crash mid-write leaves behind
                    Err(e) if index + 1 == lines.len() => {
                        tracing::warn!("Ignoring torn WAL tail in {:?}: {}", file.path, e);
                        break;
                    }
                    Err(e) => return Err(PersistenceError::Serialization(e)),
                };
                entry.verify()?;
                if entry.sequence > after {
                    entries.push(entry);
                }
            }
        }

        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    /// Get information about all WAL files
    pub async fn list_files(&self) -> Result<Vec<WalFileInfo>> {
        let mut files = Vec::new();

        let entries = std::fs::read_dir(&self.wal_dir).map_err(PersistenceError::Io)?;

        for entry in entries {
            let entry = entry.map_err(PersistenceError::Io)?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("wal") {
                let metadata = entry.metadata().map_err(PersistenceError::Io)?;
                let size = metadata.len();

                // Read first and last sequence from file
                let (first_sequence, last_sequence) = Wal::read_sequence_range(&path)?;

                files.push(WalFileInfo { path, size, first_sequence, last_sequence });
            }
        }

        // Sort by sequence number
        files.sort_by_key(|f| f.first_sequence);

        Ok(files)
    }

    /// Remove closed WAL files fully covered by a snapshot at `through`,
    /// keeping the newest `max_files` of them
    pub async fn compact(&self, through: u64) -> Result<usize> {
        let current = {
            let current_file = self.current_file.lock().await;
            current_file.is_some()
        };
        let files = self.list_files().await?;
        let mut covered: Vec<&WalFileInfo> =
            files.iter().filter(|f| f.last_sequence > 0 && f.last_sequence <= through).collect();

        // The newest file may still be open for appends
        if current {
            if let Some(last) = files.last() {
                covered.retain(|f| f.path != last.path);
            }
        }

        if covered.len() <= self.config.max_files {
            return Ok(0);
        }

        let to_remove = covered.len() - self.config.max_files;
        for file in covered.iter().take(to_remove) {
            std::fs::remove_file(&file.path).map_err(PersistenceError::Io)?;
            tracing::info!("Removed compacted WAL file: {:?}", file.path);
        }

        Ok(to_remove)
    }

    // Private methods

    async fn write_to_file(&self, entry: &WalEntry) -> Result<()> {
        let mut current_file = self.current_file.lock().await;

        // Open new file if needed
        if current_file.is_none() {
            *current_file = Some(self.create_new_file(entry.sequence)?);
        }

        let file = current_file
            .as_mut()
            .ok_or_else(|| PersistenceError::invalid_operation("WAL file not open"))?;

        // Serialize entry to JSON
        let json = serde_json::to_string(entry).map_err(PersistenceError::Serialization)?;

        // Write entry (one per line)
        writeln!(file.writer, "{json}").map_err(PersistenceError::Io)?;
        file.writer.flush().map_err(PersistenceError::Io)?;
        if self.config.fsync_every_write {
            file.writer.get_ref().sync_data().map_err(PersistenceError::Io)?;
        }

        // Update file metadata
        file.current_size += json.len() as u64 + 1; // +1 for newline

        Ok(())
    }

    fn create_new_file(&self, first_sequence: u64) -> Result<WalFile> {
        let filename = format!("wal_{first_sequence:016x}.wal");
        let path = self.wal_dir.join(filename);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(PersistenceError::Io)?;

        Ok(WalFile { writer: BufWriter::new(file), current_size: 0 })
    }

    async fn check_rotation(&self) -> Result<()> {
        let mut current_file = self.current_file.lock().await;

        if let Some(ref mut file) = *current_file {
            if file.current_size >= self.config.max_file_size {
                file.writer.flush().map_err(PersistenceError::Io)?;
                *current_file = None;
            }
        }

        Ok(())
    }

    fn repair_torn_tails(wal_dir: &Path) -> Result<()> {
        let entries = std::fs::read_dir(wal_dir).map_err(PersistenceError::Io)?;
        for entry in entries {
            let path = entry.map_err(PersistenceError::Io)?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("wal") {
                Self::repair_tail(&path)?;
            }
        }
        Ok(())
    }

    /// Cut an unparseable final line back to the last complete entry, and
    /// remove a file left holding no entry at all. A bad line followed by
    /// good ones is left in place for `read_entries_after` to report.
    fn repair_tail(path: &Path) -> Result<()> {
        let content = std::fs::read(path).map_err(PersistenceError::Io)?;

        let mut offset = 0usize;
        let mut valid_end = 0usize;
        let mut valid_entries = 0usize;
        let mut missing_newline = false;
        for segment in content.split_inclusive(|b| *b == b'\n') {
            let end = offset + segment.len();
            let complete = segment.ends_with(b"\n");
            let line = segment.strip_suffix(b"\n").unwrap_or(segment);

            if line.iter().all(u8::is_ascii_whitespace) {
                if complete {
                    valid_end = end;
                }
            } else if serde_json::from_slice::<WalEntry>(line).is_ok() {
                valid_entries += 1;
                valid_end = end;
                missing_newline = !complete;
            } else if end < content.len() {
                return Ok(());
            }
            offset = end;
        }

        if valid_entries == 0 {
            if !content.is_empty() {
                tracing::warn!("Removing WAL file {:?} holding only a torn write", path);
            }
            std::fs::remove_file(path).map_err(PersistenceError::Io)?;
            return Ok(());
        }

        if valid_end < content.len() {
            tracing::warn!(
                "Truncating torn WAL tail in {:?} ({} bytes dropped)",
                path,
                content.len() - valid_end
            );
            let file = OpenOptions::new().write(true).open(path).map_err(PersistenceError::Io)?;
            file.set_len(valid_end as u64).map_err(PersistenceError::Io)?;
            file.sync_all().map_err(PersistenceError::Io)?;
        }
        if missing_newline {
            let mut file = OpenOptions::new().append(true).open(path).map_err(PersistenceError::Io)?;
            file.write_all(b"\n").map_err(PersistenceError::Io)?;
            file.sync_all().map_err(PersistenceError::Io)?;
        }
        Ok(())
    }

    fn find_highest_sequence(wal_dir: &Path) -> Result<u64> {
        let mut highest = 0u64;

        if !wal_dir.exists() {
            return Ok(highest);
        }

        let entries = std::fs::read_dir(wal_dir).map_err(PersistenceError::Io)?;

        for entry in entries {
            let entry = entry.map_err(PersistenceError::Io)?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("wal") {
                let (_, last_sequence) = Self::read_sequence_range(&path)?;
                highest = highest.max(last_sequence);
            }
        }

        Ok(highest)
    }

    fn read_sequence_range(path: &Path) -> Result<(u64, u64)> {
        let content = std::fs::read_to_string(path).map_err(PersistenceError::Io)?;

        let mut first_sequence = None;
        let mut last_sequence = 0u64;

        for line in content.lines() {
            if let Ok(entry) = serde_json::from_str::<WalEntry>(line) {
                if first_sequence.is_none() {
                    first_sequence = Some(entry.sequence);
                }
                last_sequence = entry.sequence;
            }
        }

        Ok((first_sequence.unwrap_or(0), last_sequence))
    }
}
