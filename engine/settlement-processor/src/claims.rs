//! Claims and batches as the processor sees them

use crate::ordering::CandidateKey;
use chrono::{DateTime, Utc};
use league_core::{
    BatchId, ClaimId, ClaimOutcome, ClaimStatus, LeagueId, PlayerId, RejectionReason, TeamId,
};
use persistence::{BatchRecord, ClaimRecord, StatusChange};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiverClaim {
    pub claim_id: ClaimId,
    pub league_id: LeagueId,
    pub team_id: TeamId,
    pub target_player_id: PlayerId,
    pub drop_player_id: Option<PlayerId>,
    pub bid_amount: u32,
    /// Assigned when the claim's batch opens
    pub priority_at_submission: Option<u32>,
    pub submitted_at: DateTime<Utc>,
    pub batch_id: Option<BatchId>,
    pub status: ClaimStatus,
    pub reason: Option<RejectionReason>,
    pub cost_charged: Option<u32>,
    pub history: Vec<StatusChange>,
}

impl WaiverClaim {
    pub fn from_record(league_id: LeagueId, record: &ClaimRecord) -> Self {
        Self {
            claim_id: ClaimId(record.claim_id),
            league_id,
            team_id: record.team_id,
            target_player_id: record.target_player_id,
            drop_player_id: record.drop_player_id,
            bid_amount: record.bid_amount,
            priority_at_submission: record.priority_at_submission,
            submitted_at: record.submitted_at,
            batch_id: record.batch_id.map(BatchId),
            status: record.status,
            reason: record.reason,
            cost_charged: record.cost_charged,
            history: record.history.clone(),
        }
    }

    /// Still awaiting a decision (interrupted evaluations included)
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn transition(&mut self, status: ClaimStatus, at: DateTime<Utc>) {
        self.status = status;
        self.history.push(StatusChange { status, at });
    }

    pub fn candidate_key(&self) -> CandidateKey {
        CandidateKey {
            claim_id: self.claim_id,
            bid_amount: self.bid_amount,
            priority: self.priority_at_submission.unwrap_or(u32::MAX),
            submitted_at: self.submitted_at,
        }
    }

    pub fn outcome(&self) -> ClaimOutcome {
        ClaimOutcome {
            claim_id: self.claim_id,
            league_id: self.league_id,
            team_id: self.team_id,
            target_player_id: self.target_player_id,
            status: self.status,
            reason: self.reason,
            cost_charged: self.cost_charged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub batch_id: BatchId,
    pub league_id: LeagueId,
    pub cutoff: DateTime<Utc>,
    pub opened_at: DateTime<Utc>,
    pub claim_ids: Vec<ClaimId>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SettlementBatch {
    pub fn from_record(league_id: LeagueId, record: &BatchRecord) -> Self {
        Self {
            batch_id: BatchId(record.batch_id),
            league_id,
            cutoff: record.cutoff,
            opened_at: record.opened_at,
            claim_ids: record.claim_ids.iter().copied().map(ClaimId).collect(),
            resolved_at: record.resolved_at,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}
