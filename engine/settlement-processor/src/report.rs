use chrono::{DateTime, Utc};
use league_core::{BatchId, ClaimId, ClaimOutcome, ClaimStatus, LeagueId};
use serde::{Deserialize, Serialize};
use valuation_engine::Valuation;

/// Result of one settlement pass over a league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub league_id: LeagueId,
    /// None when there was nothing to settle
    pub batch_id: Option<BatchId>,
    pub cutoff: DateTime<Utc>,
    /// Every claim in the batch, in evaluation order
    pub outcomes: Vec<ClaimOutcome>,
    pub valuations: Vec<Valuation>,
    /// Withdrawals that arrived after their claim's evaluation began
    pub deferred_withdrawals: Vec<ClaimId>,
    pub stats: BatchStats,
    /// The batch was already resolved; nothing changed
    pub replayed: bool,
    /// The batch was left open by an earlier, interrupted pass
    pub resumed: bool,
}

impl BatchReport {
    pub fn empty(league_id: LeagueId, cutoff: DateTime<Utc>) -> Self {
        Self {
            league_id,
            batch_id: None,
            cutoff,
            outcomes: Vec::new(),
            valuations: Vec::new(),
            deferred_withdrawals: Vec::new(),
            stats: BatchStats::default(),
            replayed: false,
            resumed: false,
        }
    }

    pub fn outcome(&self, claim_id: ClaimId) -> Option<&ClaimOutcome> {
        self.outcomes.iter().find(|o| o.claim_id == claim_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub claims: usize,
    pub players: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub invalidated: usize,
    pub withdrawn: usize,
    pub faab_spent: u64,
}

impl BatchStats {
    pub fn from_outcomes(outcomes: &[ClaimOutcome], players: usize) -> Self {
        let mut stats = BatchStats { claims: outcomes.len(), players, ..Default::default() };
        for outcome in outcomes {
            match outcome.status {
                ClaimStatus::Accepted => {
                    stats.accepted += 1;
                    stats.faab_spent += outcome.cost_charged.unwrap_or(0) as u64;
                }
                ClaimStatus::Rejected => stats.rejected += 1,
                ClaimStatus::Invalidated => stats.invalidated += 1,
                ClaimStatus::Withdrawn => stats.withdrawn += 1,
                ClaimStatus::Pending | ClaimStatus::Evaluating => {}
            }
        }
        stats
    }
}
