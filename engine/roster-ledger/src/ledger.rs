use crate::budget::TeamBudget;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::metrics::LedgerMetrics;
use dashmap::DashMap;
use league_core::{
    ClaimId, LeagueId, LeagueSeed, LeagueSettings, PlayerId, Position, ReferenceData,
    RejectionReason, TeamId,
};
use persistence::{EngineState, Journal, LeagueState, WalOperation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One acquisition to validate and apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRequest {
    /// Idempotency key
    pub claim_id: ClaimId,
    pub team_id: TeamId,
    pub acquire: PlayerId,
    pub drop: Option<PlayerId>,
    pub cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerDecision {
    Applied { remaining_budget: u32 },
    /// The claim was applied before; nothing changed
    AlreadyApplied,
    Rejected(RejectionReason),
}

impl LedgerDecision {
    pub fn is_applied(&self) -> bool {
        matches!(self, LedgerDecision::Applied { .. } | LedgerDecision::AlreadyApplied)
    }
}

struct LeagueLedger {
    settings: LeagueSettings,
    budgets: BTreeMap<TeamId, TeamBudget>,
    rosters: BTreeMap<TeamId, Vec<PlayerId>>,
    owners: BTreeMap<PlayerId, TeamId>,
    applied_claims: BTreeSet<u64>,
}

impl LeagueLedger {
    fn from_seed(seed: &LeagueSeed) -> Self {
        let settings = seed.settings.clone();
        let budgets = seed
            .teams
            .iter()
            .map(|t| (t.team_id, TeamBudget::new(t.team_id, settings.season, settings.faab_budget)))
            .collect();
        let rosters = seed.teams.iter().map(|t| (t.team_id, t.roster.clone())).collect();
        Self::assemble(settings, budgets, rosters, BTreeSet::new())
    }

    fn from_state(league: &LeagueState) -> Self {
        let settings = league.settings.clone();
        let budgets = league
            .budgets
            .iter()
            .map(|(team_id, b)| {
                (*team_id, TeamBudget::restore(*team_id, settings.season, b.total, b.remaining))
            })
            .collect();
        Self::assemble(settings, budgets, league.rosters.clone(), league.applied_claims.clone())
    }

    fn assemble(
        settings: LeagueSettings,
        budgets: BTreeMap<TeamId, TeamBudget>,
        rosters: BTreeMap<TeamId, Vec<PlayerId>>,
        applied_claims: BTreeSet<u64>,
    ) -> Self {
        let owners = rosters
            .iter()
            .flat_map(|(team_id, roster)| roster.iter().map(move |p| (*p, *team_id)))
            .collect();
        Self { settings, budgets, rosters, owners, applied_claims }
    }
}

/// Rosters and FAAB budgets for every league
pub struct RosterLedger {
    config: LedgerConfig,
    reference: Arc<dyn ReferenceData>,
    journal: Arc<Journal>,
    leagues: DashMap<LeagueId, Arc<Mutex<LeagueLedger>>>,
    metrics: Arc<LedgerMetrics>,
}

impl RosterLedger {
    pub fn new(config: LedgerConfig, reference: Arc<dyn ReferenceData>, journal: Arc<Journal>) -> Self {
        Self {
            config,
            reference,
            journal,
            leagues: DashMap::new(),
            metrics: Arc::new(LedgerMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<LedgerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Journal a new league's settings, rosters and waiver order
    ///
    /// Returns false if the league is already known.
    pub async fn register_league(&self, seed: &LeagueSeed) -> Result<bool> {
        let league_id = seed.league_id();
        if self.leagues.contains_key(&league_id) {
            return Ok(false);
        }

        self.journal
            .append(WalOperation::LeagueRegistered {
                settings: seed.settings.clone(),
                teams: seed.teams.clone(),
                priority: seed.initial_priority(),
            })
            .await?;

        self.leagues.insert(league_id, Arc::new(Mutex::new(LeagueLedger::from_seed(seed))));
        info!("Registered league {} with {} teams in ledger", league_id, seed.teams.len());
        Ok(true)
    }

    /// Rebuild every league from recovered state
    pub fn restore(&self, state: &EngineState) {
        for (league_id, league) in &state.leagues {
            self.leagues.insert(*league_id, Arc::new(Mutex::new(LeagueLedger::from_state(league))));
        }
        info!("Restored ledger for {} leagues", state.leagues.len());
    }

    pub fn contains_league(&self, league_id: LeagueId) -> bool {
        self.leagues.contains_key(&league_id)
    }

    fn league(&self, league_id: LeagueId) -> Result<Arc<Mutex<LeagueLedger>>> {
        self.leagues
            .get(&league_id)
            .map(|l| Arc::clone(l.value()))
            .ok_or(LedgerError::UnknownLeague { league_id })
    }

    /// Validate and apply one acquisition atomically
    ///
    /// Checks run in a fixed order so roster validity always wins over
    /// budget: availability, drop, roster size, position cap, budget.
    pub async fn try_apply(&self, league_id: LeagueId, request: LedgerRequest) -> Result<LedgerDecision> {
        self.metrics.requests.inc();
        let league = self.league(league_id)?;
        let mut ledger = league.lock().await;

        if ledger.applied_claims.contains(&request.claim_id.0) {
            self.metrics.already_applied.inc();
            debug!("{} already applied in league {}", request.claim_id, league_id);
            return Ok(LedgerDecision::AlreadyApplied);
        }

        if let Some(reason) = self.check(&ledger, &request)? {
            self.metrics.rejected.inc();
            if self.config.log_rejections {
                info!(
                    "Ledger rejected {} (team {} for player {}): {}",
                    request.claim_id, request.team_id, request.acquire, reason
                );
            }
            return Ok(LedgerDecision::Rejected(reason));
        }

        self.journal
            .append(WalOperation::LedgerApplied {
                league_id,
                claim_id: request.claim_id.0,
                team_id: request.team_id,
                acquire: request.acquire,
                drop: request.drop,
                cost: request.cost,
            })
            .await?;

        let ledger = &mut *ledger;
        let remaining_budget = match ledger.budgets.get_mut(&request.team_id) {
            Some(budget) => {
                budget.charge(request.cost);
                budget.remaining()
            }
            None => 0,
        };
        let roster = ledger.rosters.entry(request.team_id).or_default();
        if let Some(drop) = request.drop {
            roster.retain(|p| *p != drop);
            ledger.owners.remove(&drop);
        }
        roster.push(request.acquire);
        ledger.owners.insert(request.acquire, request.team_id);
        ledger.applied_claims.insert(request.claim_id.0);

        self.metrics.applied.inc();
        self.metrics.faab_spent.add(request.cost as u64);
        debug!(
            "Applied {}: team {} acquires {} for ${} (remaining ${})",
            request.claim_id, request.team_id, request.acquire, request.cost, remaining_budget
        );

        Ok(LedgerDecision::Applied { remaining_budget })
    }

    fn check(&self, ledger: &LeagueLedger, request: &LedgerRequest) -> Result<Option<RejectionReason>> {
        let (Some(roster), Some(budget)) =
            (ledger.rosters.get(&request.team_id), ledger.budgets.get(&request.team_id))
        else {
            return Ok(Some(RejectionReason::UnknownTeam));
        };

        if ledger.owners.contains_key(&request.acquire) {
            return Ok(Some(RejectionReason::PlayerUnavailable));
        }

        if let Some(drop) = request.drop {
            if !roster.contains(&drop) {
                return Ok(Some(RejectionReason::DropNotOnRoster));
            }
        }

        let limit = ledger.settings.roster_limit as usize;
        let size_after = roster.len() + 1 - usize::from(request.drop.is_some());
        if size_after > limit {
            return Ok(Some(match request.drop {
                None => RejectionReason::RosterFullNoDrop,
                Some(_) => RejectionReason::RosterLimitExceeded,
            }));
        }

        if self.config.enforce_position_limits {
            let position = self.position_of(request.acquire)?;
            if let Some(cap) = ledger.settings.position_limit(position) {
                let mut at_position =
                    roster.iter().filter(|p| self.position_of(**p).ok() == Some(position)).count();
                if let Some(drop) = request.drop {
                    if self.position_of(drop).ok() == Some(position) {
                        at_position -= 1;
                    }
                }
                if at_position + 1 > cap as usize {
                    return Ok(Some(RejectionReason::PositionLimitExceeded));
                }
            }
        }

        if !budget.can_afford(request.cost) {
            return Ok(Some(RejectionReason::InsufficientBudget));
        }

        Ok(None)
    }

    fn position_of(&self, player_id: PlayerId) -> Result<Position> {
        self.reference
            .player(player_id)
            .map(|p| p.position)
            .ok_or(LedgerError::UnknownPlayer { player_id })
    }

    pub async fn settings(&self, league_id: LeagueId) -> Option<LeagueSettings> {
        let league = self.league(league_id).ok()?;
        let ledger = league.lock().await;
        Some(ledger.settings.clone())
    }

    pub async fn budget(&self, league_id: LeagueId, team_id: TeamId) -> Option<TeamBudget> {
        let league = self.league(league_id).ok()?;
        let ledger = league.lock().await;
        ledger.budgets.get(&team_id).copied()
    }

    pub async fn roster(&self, league_id: LeagueId, team_id: TeamId) -> Option<Vec<PlayerId>> {
        let league = self.league(league_id).ok()?;
        let ledger = league.lock().await;
        ledger.rosters.get(&team_id).cloned()
    }

    pub async fn owner_of(&self, league_id: LeagueId, player_id: PlayerId) -> Option<TeamId> {
        let league = self.league(league_id).ok()?;
        let ledger = league.lock().await;
        ledger.owners.get(&player_id).copied()
    }

    pub async fn team_ids(&self, league_id: LeagueId) -> Vec<TeamId> {
        let Ok(league) = self.league(league_id) else {
            return Vec::new();
        };
        let ledger = league.lock().await;
        ledger.rosters.keys().copied().collect()
    }

    /// Rostered players per position for one team
    pub async fn position_counts(&self, league_id: LeagueId, team_id: TeamId) -> BTreeMap<Position, u32> {
        let mut counts = BTreeMap::new();
        for player_id in self.roster(league_id, team_id).await.unwrap_or_default() {
            if let Ok(position) = self.position_of(player_id) {
                *counts.entry(position).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Every rostered player in the league
    pub async fn rostered_players(&self, league_id: LeagueId) -> BTreeSet<PlayerId> {
        let Ok(league) = self.league(league_id) else {
            return BTreeSet::new();
        };
        let ledger = league.lock().await;
        ledger.owners.keys().copied().collect()
    }
}
