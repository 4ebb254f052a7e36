use league_core::{ClaimId, ClaimStatus, LeagueId, PlayerId, TeamId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("League not found: {league_id}")]
    UnknownLeague { league_id: LeagueId },

    #[error("Team {team_id} is not in league {league_id}")]
    UnknownTeam { league_id: LeagueId, team_id: TeamId },

    #[error("Player not found: {player_id}")]
    UnknownPlayer { player_id: PlayerId },

    #[error("Team {team_id} already rosters player {player_id}")]
    AlreadyRostered { team_id: TeamId, player_id: PlayerId },

    #[error("Bid {bid} outside [{min}, {max}]")]
    BidOutOfRange { bid: u32, min: u32, max: u32 },

    #[error("Drop player {player_id} is not on team {team_id}'s roster")]
    DropNotOnRoster { team_id: TeamId, player_id: PlayerId },

    #[error("Claim not found: {claim_id}")]
    UnknownClaim { claim_id: ClaimId },

    #[error("{claim_id} belongs to team {owner}, not {team_id}")]
    NotClaimOwner { claim_id: ClaimId, owner: TeamId, team_id: TeamId },

    #[error("{claim_id} is already {status}")]
    ClaimNotPending { claim_id: ClaimId, status: ClaimStatus },

    #[error("Invalid standings for league {league_id}: {reason}")]
    InvalidStandings { league_id: LeagueId, reason: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] roster_ledger::LedgerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] persistence::PersistenceError),
}

impl SettlementError {
    /// Submission was refused for a reason the submitter can fix
    pub fn is_validation(&self) -> bool {
        !matches!(self, SettlementError::Ledger(_) | SettlementError::Persistence(_))
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
