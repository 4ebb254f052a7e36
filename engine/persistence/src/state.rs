//! Engine state folded from WAL operations
//!
//! `EngineState` is what a snapshot captures. Recovery loads the latest
//! snapshot and folds every later WAL entry into it with [`EngineState::apply`];
//! the fold is deterministic, so replaying the same entries always lands on
//! the same state.

use crate::wal::{PriorityRecord, WalOperation};
use chrono::{DateTime, Utc};
use league_core::{
    ClaimStatus, EventKind, LeagueId, LeagueSettings, PlayerId, RejectionReason, RuleSpec, TeamId,
    Week,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everything the engines need to resume after a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub leagues: BTreeMap<LeagueId, LeagueState>,
    /// Next claim id to hand out
    pub next_claim_id: u64,
    /// Next batch id to hand out
    pub next_batch_id: u64,
    /// Number of operations folded into this state
    pub operations_applied: u64,
}

/// Persisted state of one league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueState {
    pub settings: LeagueSettings,
    /// Set while scoring is halted for the league
    pub halted: Option<String>,
    pub rule_versions: Vec<RuleVersionRecord>,
    /// Keyed by [`score_key`]
    pub scores: BTreeMap<String, ScoreRecord>,
    pub budgets: BTreeMap<TeamId, BudgetRecord>,
    pub rosters: BTreeMap<TeamId, Vec<PlayerId>>,
    /// Claim ids whose ledger mutation has been applied
    pub applied_claims: BTreeSet<u64>,
    pub priority: PriorityRecord,
    /// Best team first; empty until standings are recorded
    #[serde(default)]
    pub standings: Vec<TeamId>,
    pub claims: BTreeMap<u64, ClaimRecord>,
    pub batches: BTreeMap<u64, BatchRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleVersionRecord {
    pub version: u32,
    pub effective_from: DateTime<Utc>,
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub player_id: PlayerId,
    pub week: Week,
    pub rule_version: u32,
    pub total_points: Decimal,
    pub last_applied_sequence_id: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub stat_totals: BTreeMap<EventKind, Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub total: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ClaimStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claim_id: u64,
    pub team_id: TeamId,
    pub target_player_id: PlayerId,
    pub drop_player_id: Option<PlayerId>,
    pub bid_amount: u32,
    pub submitted_at: DateTime<Utc>,
    pub priority_at_submission: Option<u32>,
    pub batch_id: Option<u64>,
    pub status: ClaimStatus,
    pub reason: Option<RejectionReason>,
    pub cost_charged: Option<u32>,
    pub history: Vec<StatusChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: u64,
    pub cutoff: DateTime<Utc>,
    pub opened_at: DateTime<Utc>,
    pub claim_ids: Vec<u64>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl BatchRecord {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Map key of a score row within a league
pub fn score_key(player_id: PlayerId, week: Week, rule_version: u32) -> String {
    format!("{player_id}:{week}:{rule_version}")
}

impl EngineState {
    pub fn new() -> Self {
        Self { leagues: BTreeMap::new(), next_claim_id: 1, next_batch_id: 1, operations_applied: 0 }
    }

    pub fn league(&self, league_id: LeagueId) -> Option<&LeagueState> {
        self.leagues.get(&league_id)
    }

    /// Fold one operation into the state
    pub fn apply(&mut self, operation: &WalOperation) {
        self.operations_applied += 1;

        if let WalOperation::LeagueRegistered { settings, teams, priority } = operation {
            if self.leagues.contains_key(&settings.league_id) {
                tracing::warn!("League {} registered twice; keeping first", settings.league_id);
                return;
            }
            let mut budgets = BTreeMap::new();
            let mut rosters = BTreeMap::new();
            for team in teams {
                budgets.insert(
                    team.team_id,
                    BudgetRecord { total: settings.faab_budget, remaining: settings.faab_budget },
                );
                rosters.insert(team.team_id, team.roster.clone());
            }
            self.leagues.insert(
                settings.league_id,
                LeagueState {
                    settings: settings.clone(),
                    halted: None,
                    rule_versions: Vec::new(),
                    scores: BTreeMap::new(),
                    budgets,
                    rosters,
                    applied_claims: BTreeSet::new(),
                    priority: PriorityRecord { order: priority.clone(), version: 0 },
                    standings: Vec::new(),
                    claims: BTreeMap::new(),
                    batches: BTreeMap::new(),
                },
            );
            return;
        }

        if let WalOperation::Checkpoint { .. } = operation {
            return;
        }

        let Some(league_id) = operation.league_id() else {
            return;
        };
        let Some(league) = self.leagues.get_mut(&league_id) else {
            tracing::warn!("Skipping WAL operation for unregistered league {}", league_id);
            return;
        };

        match operation {
            WalOperation::RulePublished { version, effective_from, rules, .. } => {
                league.rule_versions.push(RuleVersionRecord {
                    version: *version,
                    effective_from: *effective_from,
                    rules: rules.clone(),
                });
            }
            WalOperation::ScoreApplied {
                player_id,
                week,
                rule_version,
                total_points,
                sequence_id,
                applied_at,
                stat_totals,
                ..
            } => {
                league.scores.insert(
                    score_key(*player_id, *week, *rule_version),
                    ScoreRecord {
                        player_id: *player_id,
                        week: *week,
                        rule_version: *rule_version,
                        total_points: *total_points,
                        last_applied_sequence_id: *sequence_id,
                        updated_at: *applied_at,
                        stat_totals: stat_totals.clone(),
                    },
                );
            }
            WalOperation::StandingsRecorded { standings, .. } => {
                league.standings = standings.clone();
            }
            WalOperation::LeagueHalted { reason, .. } => {
                league.halted = Some(reason.clone());
            }
            WalOperation::LeagueResumed { .. } => {
                league.halted = None;
            }
            WalOperation::LedgerApplied { claim_id, team_id, acquire, drop, cost, .. } => {
                if !league.applied_claims.insert(*claim_id) {
                    return;
                }
                if let Some(budget) = league.budgets.get_mut(team_id) {
                    budget.remaining = budget.remaining.saturating_sub(*cost);
                }
                let roster = league.rosters.entry(*team_id).or_default();
                if let Some(drop) = drop {
                    roster.retain(|p| p != drop);
                }
                roster.push(*acquire);
            }
            WalOperation::ClaimSubmitted {
                claim_id,
                team_id,
                target_player_id,
                drop_player_id,
                bid_amount,
                submitted_at,
                ..
            } => {
                league.claims.insert(
                    *claim_id,
                    ClaimRecord {
                        claim_id: *claim_id,
                        team_id: *team_id,
                        target_player_id: *target_player_id,
                        drop_player_id: *drop_player_id,
                        bid_amount: *bid_amount,
                        submitted_at: *submitted_at,
                        priority_at_submission: None,
                        batch_id: None,
                        status: ClaimStatus::Pending,
                        reason: None,
                        cost_charged: None,
                        history: vec![StatusChange {
                            status: ClaimStatus::Pending,
                            at: *submitted_at,
                        }],
                    },
                );
                self.next_claim_id = self.next_claim_id.max(claim_id + 1);
            }
            WalOperation::ClaimWithdrawn { claim_id, at, .. } => {
                if let Some(claim) = league.claims.get_mut(claim_id) {
                    if !claim.status.is_terminal() {
                        claim.status = ClaimStatus::Withdrawn;
                        claim.reason = Some(RejectionReason::WithdrawnByTeam);
                        claim.history.push(StatusChange { status: ClaimStatus::Withdrawn, at: *at });
                    }
                }
            }
            WalOperation::BatchOpened { batch_id, cutoff, assignments, opened_at, .. } => {
                for (claim_id, priority) in assignments {
                    if let Some(claim) = league.claims.get_mut(claim_id) {
                        claim.priority_at_submission = Some(*priority);
                        claim.batch_id = Some(*batch_id);
                    }
                }
                league.batches.insert(
                    *batch_id,
                    BatchRecord {
                        batch_id: *batch_id,
                        cutoff: *cutoff,
                        opened_at: *opened_at,
                        claim_ids: assignments.iter().map(|(id, _)| *id).collect(),
                        resolved_at: None,
                    },
                );
                self.next_batch_id = self.next_batch_id.max(batch_id + 1);
            }
            WalOperation::ClaimEvaluating { claim_id, at, .. } => {
                if let Some(claim) = league.claims.get_mut(claim_id) {
                    if claim.status == ClaimStatus::Pending {
                        claim.status = ClaimStatus::Evaluating;
                        claim.history.push(StatusChange { status: ClaimStatus::Evaluating, at: *at });
                    }
                }
            }
            WalOperation::ClaimResolved {
                claim_id, status, reason, cost_charged, priority, at, ..
            } => {
                if let Some(claim) = league.claims.get_mut(claim_id) {
                    claim.status = *status;
                    claim.reason = *reason;
                    claim.cost_charged = *cost_charged;
                    claim.history.push(StatusChange { status: *status, at: *at });
                }
                if let Some(priority) = priority {
                    league.priority = priority.clone();
                }
            }
            WalOperation::BatchResolved { batch_id, resolved_at, .. } => {
                if let Some(batch) = league.batches.get_mut(batch_id) {
                    batch.resolved_at = Some(*resolved_at);
                }
            }
            WalOperation::LeagueRegistered { .. } | WalOperation::Checkpoint { .. } => {}
        }
    }
}
