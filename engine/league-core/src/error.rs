//! Error types for reference data loading

use crate::types::{LeagueId, PlayerId, TeamId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Seed parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate league: {league_id}")]
    DuplicateLeague { league_id: LeagueId },

    #[error("Team {team_id} appears in more than one league")]
    DuplicateTeam { team_id: TeamId },

    #[error("Unknown player {player_id} on roster of team {team_id}")]
    UnknownRosterPlayer { team_id: TeamId, player_id: PlayerId },

    #[error("Player {player_id} rostered by more than one team in league {league_id}")]
    PlayerRosteredTwice { league_id: LeagueId, player_id: PlayerId },

    #[error("Invalid league settings for {league_id}: {message}")]
    InvalidSettings { league_id: LeagueId, message: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
