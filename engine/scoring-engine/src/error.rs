//! Error types for rule publication and stat ingestion

use chrono::{DateTime, Utc};
use league_core::{EventKind, GameId, LeagueId, PlayerId, SequenceId};
use persistence::PersistenceError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Unknown league: {league_id}")]
    UnknownLeague { league_id: LeagueId },

    #[error("Unknown player {player_id} in event {sequence_id}")]
    UnknownPlayer { player_id: PlayerId, sequence_id: SequenceId },

    #[error("Unknown game {game_id} in event {sequence_id}")]
    UnknownGame { game_id: GameId, sequence_id: SequenceId },

    #[error("Magnitude {magnitude} out of bounds for {event_kind} in event {sequence_id}")]
    MagnitudeOutOfBounds { event_kind: EventKind, magnitude: Decimal, sequence_id: SequenceId },

    #[error("Negative magnitude {magnitude} not allowed for {event_kind} in event {sequence_id}")]
    NegativeMagnitude { event_kind: EventKind, magnitude: Decimal, sequence_id: SequenceId },

    #[error("No active scoring rules for league {league_id} at {at}; league halted")]
    NoActiveRules { league_id: LeagueId, at: DateTime<Utc> },

    #[error("League {league_id} is halted: {reason}")]
    LeagueHalted { league_id: LeagueId, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl IngestionError {
    /// Malformed events are dropped; everything else is league or storage state
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            IngestionError::UnknownPlayer { .. }
                | IngestionError::UnknownGame { .. }
                | IngestionError::MagnitudeOutOfBounds { .. }
                | IngestionError::NegativeMagnitude { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Unknown league: {league_id}")]
    UnknownLeague { league_id: LeagueId },

    #[error("Rule set is empty")]
    EmptyRuleSet,

    #[error("Event kind {event_kind} listed more than once")]
    DuplicateEventKind { event_kind: EventKind },

    #[error("effective_from {requested} precedes latest version {latest_version} ({latest})")]
    EffectiveFromRegression {
        requested: DateTime<Utc>,
        latest: DateTime<Utc>,
        latest_version: u32,
    },

    #[error("Invalid yardage bonus on {event_kind}: {reason}")]
    InvalidBonus { event_kind: EventKind, reason: String },

    #[error("Unknown scoring preset: {name}")]
    UnknownPreset { name: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
