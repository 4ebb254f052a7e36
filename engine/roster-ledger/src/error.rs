//! Error types for the roster ledger

use league_core::{LeagueId, PlayerId};
use thiserror::Error;

/// Infrastructure and lookup failures; rule violations are
/// [`crate::LedgerDecision::Rejected`] values instead
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("League not found: {league_id}")]
    UnknownLeague { league_id: LeagueId },

    #[error("Player not found: {player_id}")]
    UnknownPlayer { player_id: PlayerId },

    #[error("Persistence error: {0}")]
    Persistence(#[from] persistence::PersistenceError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
