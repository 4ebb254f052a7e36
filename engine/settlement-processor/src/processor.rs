//! Settlement Processor
//!
//! Claims are queued per league and settled in batches. A batch fixes its
//! claim set and every claim's `priority_at_submission` when it opens, then
//! walks one target player at a time: candidates are sorted by the league's
//! [`CandidateOrder`], the first ledger success wins and everyone after it
//! loses with `player_unavailable`. Every transition is journaled before memory
//! changes, so an interrupted batch stays open and the next pass picks up
//! exactly where the journal left off.

use crate::claims::{SettlementBatch, WaiverClaim};
use crate::config::SettlementConfig;
use crate::error::{Result, SettlementError};
use crate::metrics::SettlementMetrics;
use crate::ordering::{sort_candidates, CandidateOrder};
use crate::priority::WaiverPriority;
use crate::report::{BatchReport, BatchStats};
use broadcast_gateway::{deliver, BroadcastGateway, Notification};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use league_core::{
    BatchId, ClaimId, ClaimStatus, ClaimSubmission, LeagueId, PlayerId, Position, ReferenceData,
    RejectionReason, TeamId, WaiverType,
};
use persistence::{EngineState, Journal, StatusChange, WalOperation};
use roster_ledger::{LedgerDecision, LedgerRequest, RosterLedger};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};
use valuation_engine::{AdvisoryService, TeamContext, Valuation};

/// What a withdrawal request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Withdrawal {
    /// The claim is now withdrawn
    Applied,
    /// A batch is running; the withdrawal applies before the claim is
    /// evaluated, or becomes a no-op if evaluation already began
    Queued,
}

struct LeagueBook {
    claims: BTreeMap<ClaimId, WaiverClaim>,
    batches: BTreeMap<BatchId, SettlementBatch>,
    priority: WaiverPriority,
    /// Best team first
    standings: Vec<TeamId>,
}

/// `running` stays set from batch start until its queued withdrawals are drained
#[derive(Default)]
struct WithdrawalGate {
    running: bool,
    queued: BTreeSet<ClaimId>,
}

struct LeagueSlot {
    book: Mutex<LeagueBook>,
    run_lock: Mutex<()>,
    gate: parking_lot::Mutex<WithdrawalGate>,
    /// Signalled whenever `run_lock` is released or `running` is set
    gate_changed: Notify,
}

impl LeagueSlot {
    fn new(book: LeagueBook) -> Self {
        Self {
            book: Mutex::new(book),
            run_lock: Mutex::new(()),
            gate: parking_lot::Mutex::new(WithdrawalGate::default()),
            gate_changed: Notify::new(),
        }
    }
}

enum Plan {
    Resume(SettlementBatch, Vec<WaiverClaim>),
    Open(Vec<WaiverClaim>),
    Replay(BatchReport),
    Nothing,
}

pub struct SettlementProcessor {
    config: SettlementConfig,
    reference: Arc<dyn ReferenceData>,
    journal: Arc<Journal>,
    ledger: Arc<RosterLedger>,
    gateway: Arc<dyn BroadcastGateway>,
    advisory: Option<Arc<AdvisoryService>>,
    leagues: DashMap<LeagueId, Arc<LeagueSlot>>,
    next_claim_id: AtomicU64,
    next_batch_id: AtomicU64,
    metrics: Arc<SettlementMetrics>,
}

impl SettlementProcessor {
    pub fn new(
        config: SettlementConfig,
        reference: Arc<dyn ReferenceData>,
        journal: Arc<Journal>,
        ledger: Arc<RosterLedger>,
        gateway: Arc<dyn BroadcastGateway>,
    ) -> Self {
        Self {
            config,
            reference,
            journal,
            ledger,
            gateway,
            advisory: None,
            leagues: DashMap::new(),
            next_claim_id: AtomicU64::new(1),
            next_batch_id: AtomicU64::new(1),
            metrics: Arc::new(SettlementMetrics::new()),
        }
    }

    pub fn with_advisory(mut self, advisory: Arc<AdvisoryService>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    pub fn metrics(&self) -> Arc<SettlementMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Start tracking a league that has no claims yet
    pub fn register_league(&self, league_id: LeagueId, priority: Vec<TeamId>) {
        self.leagues.entry(league_id).or_insert_with(|| {
            Arc::new(LeagueSlot::new(LeagueBook {
                claims: BTreeMap::new(),
                batches: BTreeMap::new(),
                priority: WaiverPriority::new(priority),
                standings: Vec::new(),
            }))
        });
    }

    /// Rebuild claims, batches and waiver order from recovered state
    pub fn restore(&self, state: &EngineState) {
        let mut open = 0;
        for (league_id, league) in &state.leagues {
            let claims = league
                .claims
                .values()
                .map(|r| (ClaimId(r.claim_id), WaiverClaim::from_record(*league_id, r)))
                .collect();
            let batches: BTreeMap<BatchId, SettlementBatch> = league
                .batches
                .values()
                .map(|r| (BatchId(r.batch_id), SettlementBatch::from_record(*league_id, r)))
                .collect();
            open += batches.values().filter(|b| !b.is_resolved()).count();

            let book = LeagueBook {
                claims,
                batches,
                priority: WaiverPriority::from(&league.priority),
                standings: league.standings.clone(),
            };
            self.leagues.insert(*league_id, Arc::new(LeagueSlot::new(book)));
        }

        self.next_claim_id.fetch_max(state.next_claim_id, Ordering::SeqCst);
        self.next_batch_id.fetch_max(state.next_batch_id, Ordering::SeqCst);
        self.metrics.open_batches.set(open as u64);
        info!("Restored settlement state for {} leagues ({} open batches)", state.leagues.len(), open);
    }

    pub fn league_ids(&self) -> Vec<LeagueId> {
        let mut ids: Vec<LeagueId> = self.leagues.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn slot(&self, league_id: LeagueId) -> Result<Arc<LeagueSlot>> {
        self.leagues
            .get(&league_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or(SettlementError::UnknownLeague { league_id })
    }

    pub async fn priority(&self, league_id: LeagueId) -> Option<WaiverPriority> {
        let slot = self.slot(league_id).ok()?;
        let book = slot.book.lock().await;
        Some(book.priority.clone())
    }

    pub async fn standings(&self, league_id: LeagueId) -> Vec<TeamId> {
        let Ok(slot) = self.slot(league_id) else {
            return Vec::new();
        };
        let book = slot.book.lock().await;
        book.standings.clone()
    }

    /// Record league standings, best team first; reverse-order leagues take
    /// their waiver priority from the latest standings when a batch opens
    pub async fn record_standings(&self, league_id: LeagueId, standings: Vec<TeamId>) -> Result<()> {
        let slot = self.slot(league_id)?;
        if standings.is_empty() {
            return Err(SettlementError::InvalidStandings { league_id, reason: "no teams listed".into() });
        }
        let mut seen = BTreeSet::new();
        for team_id in &standings {
            if self.ledger.roster(league_id, *team_id).await.is_none() {
                return Err(SettlementError::UnknownTeam { league_id, team_id: *team_id });
            }
            if !seen.insert(*team_id) {
                return Err(SettlementError::InvalidStandings {
                    league_id,
                    reason: format!("team {team_id} listed twice"),
                });
            }
        }

        let mut book = slot.book.lock().await;
        self.journal
            .append(WalOperation::StandingsRecorded { league_id, standings: standings.clone(), at: Utc::now() })
            .await?;
        book.standings = standings;
        info!("Recorded standings for league {}: {:?}", league_id, book.standings);
        Ok(())
    }

    async fn order_for(&self, league_id: LeagueId) -> CandidateOrder {
        self.ledger
            .settings(league_id)
            .await
            .map(|settings| CandidateOrder::for_league(&settings))
            .unwrap_or_default()
    }

    pub async fn claim(&self, league_id: LeagueId, claim_id: ClaimId) -> Option<WaiverClaim> {
        let slot = self.slot(league_id).ok()?;
        let book = slot.book.lock().await;
        book.claims.get(&claim_id).cloned()
    }

    pub async fn claims(&self, league_id: LeagueId) -> Vec<WaiverClaim> {
        let Ok(slot) = self.slot(league_id) else {
            return Vec::new();
        };
        let book = slot.book.lock().await;
        book.claims.values().cloned().collect()
    }

    pub async fn batch(&self, league_id: LeagueId, batch_id: BatchId) -> Option<SettlementBatch> {
        let slot = self.slot(league_id).ok()?;
        let book = slot.book.lock().await;
        book.batches.get(&batch_id).cloned()
    }

    /// Leagues with a batch left open by an interrupted pass
    pub async fn open_batches(&self) -> Vec<(LeagueId, BatchId)> {
        let mut open = Vec::new();
        for league_id in self.league_ids() {
            if let Ok(slot) = self.slot(league_id) {
                let book = slot.book.lock().await;
                for batch in book.batches.values().filter(|b| !b.is_resolved()) {
                    open.push((league_id, batch.batch_id));
                }
            }
        }
        open
    }

    /// Validate and queue a claim
    pub async fn submit_claim(&self, submission: ClaimSubmission) -> Result<ClaimId> {
        let league_id = submission.league_id;
        let team_id = submission.team_id;
        let slot = self.slot(league_id)?;

        let settings = self
            .ledger
            .settings(league_id)
            .await
            .ok_or(SettlementError::UnknownLeague { league_id })?;
        let (Some(roster), Some(budget)) = (
            self.ledger.roster(league_id, team_id).await,
            self.ledger.budget(league_id, team_id).await,
        ) else {
            return Err(SettlementError::UnknownTeam { league_id, team_id });
        };

        if self.reference.player(submission.target_player_id).is_none() {
            return Err(SettlementError::UnknownPlayer { player_id: submission.target_player_id });
        }
        if roster.contains(&submission.target_player_id) {
            return Err(SettlementError::AlreadyRostered {
                team_id,
                player_id: submission.target_player_id,
            });
        }
        if settings.waiver_type.uses_bids() {
            if submission.bid_amount < settings.min_bid || submission.bid_amount > budget.total {
                return Err(SettlementError::BidOutOfRange {
                    bid: submission.bid_amount,
                    min: settings.min_bid,
                    max: budget.total,
                });
            }
        } else if submission.bid_amount != 0 {
            return Err(SettlementError::BidOutOfRange { bid: submission.bid_amount, min: 0, max: 0 });
        }
        if let Some(drop) = submission.drop_player_id {
            if !roster.contains(&drop) {
                return Err(SettlementError::DropNotOnRoster { team_id, player_id: drop });
            }
        }

        let claim_id = ClaimId(self.next_claim_id.fetch_add(1, Ordering::SeqCst));
        let mut book = slot.book.lock().await;
        self.journal
            .append(WalOperation::ClaimSubmitted {
                league_id,
                claim_id: claim_id.0,
                team_id,
                target_player_id: submission.target_player_id,
                drop_player_id: submission.drop_player_id,
                bid_amount: submission.bid_amount,
                submitted_at: submission.submitted_at,
            })
            .await?;

        book.claims.insert(
            claim_id,
            WaiverClaim {
                claim_id,
                league_id,
                team_id,
                target_player_id: submission.target_player_id,
                drop_player_id: submission.drop_player_id,
                bid_amount: submission.bid_amount,
                priority_at_submission: None,
                submitted_at: submission.submitted_at,
                batch_id: None,
                status: ClaimStatus::Pending,
                reason: None,
                cost_charged: None,
                history: vec![StatusChange {
                    status: ClaimStatus::Pending,
                    at: submission.submitted_at,
                }],
            },
        );
        drop(book);

        self.metrics.claims_submitted.inc();
        info!(
            "{} submitted: team {} bids ${} on player {} in league {}",
            claim_id, team_id, submission.bid_amount, submission.target_player_id, league_id
        );
        Ok(claim_id)
    }

    /// Withdraw a pending claim; never waits for a running batch
    pub async fn withdraw_claim(
        &self,
        league_id: LeagueId,
        team_id: TeamId,
        claim_id: ClaimId,
    ) -> Result<Withdrawal> {
        let slot = self.slot(league_id)?;
        {
            let book = slot.book.lock().await;
            let claim = book.claims.get(&claim_id).ok_or(SettlementError::UnknownClaim { claim_id })?;
            if claim.team_id != team_id {
                return Err(SettlementError::NotClaimOwner { claim_id, owner: claim.team_id, team_id });
            }
            if claim.status.is_terminal() {
                return Err(SettlementError::ClaimNotPending { claim_id, status: claim.status });
            }
        }

        loop {
            // Registered before checking so a release in between is not missed
            let changed = slot.gate_changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Ok(run) = slot.run_lock.try_lock() {
                let result = self.withdraw_pending(league_id, &slot, claim_id, true).await;
                drop(run);
                slot.gate_changed.notify_waiters();
                result?;
                return Ok(Withdrawal::Applied);
            }
            {
                let mut gate = slot.gate.lock();
                if gate.running {
                    gate.queued.insert(claim_id);
                    info!("Withdrawal of {} queued behind running batch in league {}", claim_id, league_id);
                    return Ok(Withdrawal::Queued);
                }
            }
            // The lock holder is a batch about to set `running`, or another
            // withdrawal; either one signals when it moves on
            changed.await;
        }
    }

    /// Journal a withdrawal; returns false when the claim is no longer pending
    async fn withdraw_pending(
        &self,
        league_id: LeagueId,
        slot: &LeagueSlot,
        claim_id: ClaimId,
        strict: bool,
    ) -> Result<bool> {
        let mut book = slot.book.lock().await;
        let claim = book.claims.get(&claim_id).ok_or(SettlementError::UnknownClaim { claim_id })?;
        if claim.status != ClaimStatus::Pending {
            if strict {
                return Err(SettlementError::ClaimNotPending { claim_id, status: claim.status });
            }
            return Ok(false);
        }

        let at = Utc::now();
        self.journal
            .append(WalOperation::ClaimWithdrawn { league_id, claim_id: claim_id.0, at })
            .await?;

        let outcome = match book.claims.get_mut(&claim_id) {
            Some(claim) => {
                claim.transition(ClaimStatus::Withdrawn, at);
                claim.reason = Some(RejectionReason::WithdrawnByTeam);
                claim.outcome()
            }
            None => return Ok(false),
        };
        drop(book);

        self.metrics.claims_withdrawn.inc();
        info!("{} withdrawn in league {}", claim_id, league_id);
        deliver(self.gateway.as_ref(), Notification::ClaimOutcome(outcome)).await;
        Ok(true)
    }

    /// Settle every pending claim submitted at or before `cutoff`
    ///
    /// An open batch left by an interrupted pass is finished first. When
    /// nothing is pending and a batch with this cutoff was already resolved,
    /// its outcomes are returned without touching any state.
    pub async fn run_batch(&self, league_id: LeagueId, cutoff: DateTime<Utc>) -> Result<BatchReport> {
        let slot = self.slot(league_id)?;
        let run = slot.run_lock.lock().await;
        slot.gate.lock().running = true;
        slot.gate_changed.notify_waiters();

        let result = self.settle(league_id, &slot, cutoff).await;
        let deferred = self.drain_withdrawals(league_id, &slot).await;

        drop(run);
        slot.gate_changed.notify_waiters();

        match result {
            Ok(mut report) => {
                report.deferred_withdrawals = deferred;
                Ok(report)
            }
            Err(e) => {
                self.metrics.batches_failed.inc();
                error!("Settlement for league {} stopped; batch stays open: {}", league_id, e);
                Err(e)
            }
        }
    }

    /// Apply every withdrawal that queued behind the batch, including ones
    /// arriving while draining, then clear `running`
    async fn drain_withdrawals(&self, league_id: LeagueId, slot: &LeagueSlot) -> Vec<ClaimId> {
        let mut deferred = Vec::new();
        loop {
            let queued = {
                let mut gate = slot.gate.lock();
                if gate.queued.is_empty() {
                    gate.running = false;
                    break;
                }
                std::mem::take(&mut gate.queued)
            };
            deferred.extend(self.apply_withdrawals(league_id, slot, queued).await);
        }
        deferred
    }

    /// Claims already decided are reported back as deferred no-ops
    async fn apply_withdrawals(
        &self,
        league_id: LeagueId,
        slot: &LeagueSlot,
        queued: BTreeSet<ClaimId>,
    ) -> Vec<ClaimId> {
        let mut deferred = Vec::new();
        for claim_id in queued {
            match self.withdraw_pending(league_id, slot, claim_id, false).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Deferred withdrawal of {} is a no-op", claim_id);
                    deferred.push(claim_id);
                }
                Err(e) => warn!("Queued withdrawal of {} failed: {}", claim_id, e),
            }
        }
        deferred
    }

    async fn settle(
        &self,
        league_id: LeagueId,
        slot: &LeagueSlot,
        cutoff: DateTime<Utc>,
    ) -> Result<BatchReport> {
        let order = self.order_for(league_id).await;
        let plan = {
            let book = slot.book.lock().await;
            match book.batches.values().find(|b| !b.is_resolved()) {
                Some(batch) => {
                    let open = batch
                        .claim_ids
                        .iter()
                        .filter_map(|id| book.claims.get(id))
                        .filter(|c| c.is_open())
                        .cloned()
                        .collect();
                    Plan::Resume(batch.clone(), open)
                }
                None => {
                    let pending: Vec<WaiverClaim> = book
                        .claims
                        .values()
                        .filter(|c| {
                            c.status == ClaimStatus::Pending
                                && c.batch_id.is_none()
                                && c.submitted_at <= cutoff
                        })
                        .cloned()
                        .collect();
                    if !pending.is_empty() {
                        Plan::Open(pending)
                    } else {
                        match book.batches.values().rev().find(|b| b.cutoff == cutoff) {
                            Some(batch) => Plan::Replay(report_for(&book, batch, order, true)),
                            None => Plan::Nothing,
                        }
                    }
                }
            }
        };

        let (batch, valuations, resumed) = match plan {
            Plan::Replay(report) => {
                info!("Batch {:?} for league {} already resolved; replaying outcomes", report.batch_id, league_id);
                return Ok(report);
            }
            Plan::Nothing => {
                debug!("No pending claims at or before {} in league {}", cutoff, league_id);
                return Ok(BatchReport::empty(league_id, cutoff));
            }
            Plan::Resume(batch, open) => {
                warn!(
                    "Resuming open {} for league {} with {} undecided claims",
                    batch.batch_id,
                    league_id,
                    open.len()
                );
                self.metrics.batches_resumed.inc();
                let valuations = self.valuate(league_id, &open).await;
                (batch, valuations, true)
            }
            Plan::Open(pending) => {
                // Advisory data is resolved before the batch opens
                let valuations = self.valuate(league_id, &pending).await;
                let batch = self.open_batch(league_id, slot, order, cutoff, &pending).await?;
                (batch, valuations, false)
            }
        };

        let (groups, mut dropped_in_batch) = {
            let book = slot.book.lock().await;
            let dropped: BTreeSet<PlayerId> = batch
                .claim_ids
                .iter()
                .filter_map(|id| book.claims.get(id))
                .filter(|c| c.status == ClaimStatus::Accepted)
                .filter_map(|c| c.drop_player_id)
                .collect();
            (player_groups(&book, &batch), dropped)
        };

        for (player_id, claim_ids) in &groups {
            self.evaluate_player(league_id, slot, &batch, order, *player_id, claim_ids, &mut dropped_in_batch)
                .await?;
        }

        let report = {
            let mut book = slot.book.lock().await;
            let resolved_at = Utc::now();
            self.journal
                .append(WalOperation::BatchResolved {
                    league_id,
                    batch_id: batch.batch_id.0,
                    resolved_at,
                })
                .await?;
            let resolved = match book.batches.get_mut(&batch.batch_id) {
                Some(record) => {
                    record.resolved_at = Some(resolved_at);
                    record.clone()
                }
                None => batch.clone(),
            };
            report_for(&book, &resolved, order, false)
        };

        self.metrics.batches_resolved.inc();
        self.metrics.open_batches.dec();
        info!(
            "Resolved {} for league {}: {} claims over {} players, {} accepted, ${} spent",
            batch.batch_id,
            league_id,
            report.stats.claims,
            report.stats.players,
            report.stats.accepted,
            report.stats.faab_spent
        );

        if self.config.checkpoint_after_batch {
            if let Err(e) = self.journal.checkpoint().await {
                warn!("Checkpoint after {} failed: {}", batch.batch_id, e);
            }
        }

        Ok(BatchReport { valuations, resumed, ..report })
    }

    async fn open_batch(
        &self,
        league_id: LeagueId,
        slot: &LeagueSlot,
        order: CandidateOrder,
        cutoff: DateTime<Utc>,
        pending: &[WaiverClaim],
    ) -> Result<SettlementBatch> {
        let mut book = slot.book.lock().await;
        let ranking = match order.waiver_type {
            WaiverType::Reverse if !book.standings.is_empty() => WaiverPriority::from_standings(&book.standings),
            _ => book.priority.clone(),
        };
        let assignments: Vec<(ClaimId, u32)> =
            pending.iter().map(|c| (c.claim_id, ranking.rank_of(c.team_id))).collect();

        let batch_id = BatchId(self.next_batch_id.fetch_add(1, Ordering::SeqCst));
        let opened_at = Utc::now();
        self.journal
            .append(WalOperation::BatchOpened {
                league_id,
                batch_id: batch_id.0,
                cutoff,
                assignments: assignments.iter().map(|(id, p)| (id.0, *p)).collect(),
                opened_at,
            })
            .await?;

        for (claim_id, priority) in &assignments {
            if let Some(claim) = book.claims.get_mut(claim_id) {
                claim.priority_at_submission = Some(*priority);
                claim.batch_id = Some(batch_id);
            }
        }
        let batch = SettlementBatch {
            batch_id,
            league_id,
            cutoff,
            opened_at,
            claim_ids: assignments.iter().map(|(id, _)| *id).collect(),
            resolved_at: None,
        };
        book.batches.insert(batch_id, batch.clone());
        drop(book);

        self.metrics.open_batches.inc();
        info!("Opened {} for league {} with {} claims (cutoff {})", batch_id, league_id, assignments.len(), cutoff);
        Ok(batch)
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_player(
        &self,
        league_id: LeagueId,
        slot: &LeagueSlot,
        batch: &SettlementBatch,
        order: CandidateOrder,
        player_id: PlayerId,
        claim_ids: &[ClaimId],
        dropped_in_batch: &mut BTreeSet<PlayerId>,
    ) -> Result<()> {
        let withdrawals: Vec<ClaimId> = {
            let mut gate = slot.gate.lock();
            claim_ids.iter().copied().filter(|id| gate.queued.remove(id)).collect()
        };
        for claim_id in withdrawals {
            if !self.withdraw_pending(league_id, slot, claim_id, false).await? {
                // Evaluation began in an earlier pass; report as deferred
                slot.gate.lock().queued.insert(claim_id);
            }
        }

        let (mut candidates, mut taken) = {
            let book = slot.book.lock().await;
            let group: Vec<&WaiverClaim> = claim_ids.iter().filter_map(|id| book.claims.get(id)).collect();
            let taken = group.iter().any(|c| c.status == ClaimStatus::Accepted);
            let open: Vec<WaiverClaim> = group.into_iter().filter(|c| c.is_open()).cloned().collect();
            (open, taken)
        };
        sort_candidates(order, &mut candidates, WaiverClaim::candidate_key);
        debug!("Evaluating {} claims on player {} in {}", candidates.len(), player_id, batch.batch_id);

        for claim in candidates {
            self.mark_evaluating(league_id, slot, batch, claim.claim_id).await?;

            let (status, reason, cost) = if taken {
                (ClaimStatus::Rejected, Some(RejectionReason::PlayerUnavailable), None)
            } else if self.drop_went_stale(league_id, &claim, dropped_in_batch).await {
                (ClaimStatus::Invalidated, Some(RejectionReason::DropNotOnRoster), None)
            } else {
                let cost = if order.waiver_type.uses_bids() { claim.bid_amount } else { 0 };
                let request = LedgerRequest {
                    claim_id: claim.claim_id,
                    team_id: claim.team_id,
                    acquire: claim.target_player_id,
                    drop: claim.drop_player_id,
                    cost,
                };
                match self.ledger.try_apply(league_id, request).await? {
                    LedgerDecision::Applied { .. } | LedgerDecision::AlreadyApplied => {
                        (ClaimStatus::Accepted, None, Some(cost))
                    }
                    LedgerDecision::Rejected(reason) => (ClaimStatus::Rejected, Some(reason), None),
                }
            };

            if status == ClaimStatus::Accepted {
                taken = true;
                if let Some(drop) = claim.drop_player_id {
                    dropped_in_batch.insert(drop);
                }
            }
            self.resolve_claim(league_id, slot, batch, order, &claim, status, reason, cost).await?;
        }

        Ok(())
    }

    /// The claim's drop player left the roster through an earlier win in this batch
    async fn drop_went_stale(
        &self,
        league_id: LeagueId,
        claim: &WaiverClaim,
        dropped_in_batch: &BTreeSet<PlayerId>,
    ) -> bool {
        let Some(drop) = claim.drop_player_id else {
            return false;
        };
        if !dropped_in_batch.contains(&drop) {
            return false;
        }
        let roster = self.ledger.roster(league_id, claim.team_id).await.unwrap_or_default();
        !roster.contains(&drop)
    }

    async fn mark_evaluating(
        &self,
        league_id: LeagueId,
        slot: &LeagueSlot,
        batch: &SettlementBatch,
        claim_id: ClaimId,
    ) -> Result<()> {
        let mut book = slot.book.lock().await;
        let Some(claim) = book.claims.get_mut(&claim_id) else {
            return Ok(());
        };
        if claim.status != ClaimStatus::Pending {
            return Ok(());
        }

        let at = Utc::now();
        self.journal
            .append(WalOperation::ClaimEvaluating {
                league_id,
                batch_id: batch.batch_id.0,
                claim_id: claim_id.0,
                at,
            })
            .await?;
        claim.transition(ClaimStatus::Evaluating, at);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_claim(
        &self,
        league_id: LeagueId,
        slot: &LeagueSlot,
        batch: &SettlementBatch,
        order: CandidateOrder,
        claim: &WaiverClaim,
        status: ClaimStatus,
        reason: Option<RejectionReason>,
        cost_charged: Option<u32>,
    ) -> Result<()> {
        let mut book = slot.book.lock().await;
        // Reverse-order leagues only reorder on new standings
        let rotated = match status {
            ClaimStatus::Accepted if order.waiver_type != WaiverType::Reverse => {
                Some(book.priority.rotated(claim.team_id))
            }
            _ => None,
        };

        let at = Utc::now();
        self.journal
            .append(WalOperation::ClaimResolved {
                league_id,
                batch_id: batch.batch_id.0,
                claim_id: claim.claim_id.0,
                status,
                reason,
                cost_charged,
                priority: rotated.as_ref().map(WaiverPriority::to_record),
                at,
            })
            .await?;

        if let Some(rotated) = rotated {
            book.priority = rotated;
        }
        let outcome = match book.claims.get_mut(&claim.claim_id) {
            Some(record) => {
                record.transition(status, at);
                record.reason = reason;
                record.cost_charged = cost_charged;
                record.outcome()
            }
            None => claim.outcome(),
        };
        drop(book);

        match status {
            ClaimStatus::Accepted => {
                self.metrics.claims_accepted.inc();
                self.metrics.faab_spent.add(cost_charged.unwrap_or(0) as u64);
                info!(
                    "{} accepted: team {} acquires player {} for ${}",
                    claim.claim_id,
                    claim.team_id,
                    claim.target_player_id,
                    cost_charged.unwrap_or(0)
                );
            }
            ClaimStatus::Invalidated => self.metrics.claims_invalidated.inc(),
            _ => self.metrics.claims_rejected.inc(),
        }

        deliver(self.gateway.as_ref(), Notification::ClaimOutcome(outcome)).await;
        Ok(())
    }

    async fn valuate(&self, league_id: LeagueId, claims: &[WaiverClaim]) -> Vec<Valuation> {
        let Some(advisory) = self.advisory.as_ref().filter(|_| self.config.attach_valuations) else {
            return Vec::new();
        };

        let available_at_position = self.available_by_position(league_id).await;
        let mut valuations = Vec::with_capacity(claims.len());
        for claim in claims {
            let Some(player) = self.reference.player(claim.target_player_id) else {
                continue;
            };
            let profile = advisory.profile_for(player.player_id, player.position);
            let context = TeamContext {
                team_id: claim.team_id,
                rostered: self.ledger.position_counts(league_id, claim.team_id).await,
                starters_required: self.config.starters_required.clone(),
                available_at_position: available_at_position.clone(),
                remaining_budget: self
                    .ledger
                    .budget(league_id, claim.team_id)
                    .await
                    .map(|b| b.remaining()),
            };
            valuations.push(advisory.assess(&profile, &context).await);
        }
        valuations
    }

    /// Known players no team in the league rosters, counted per position
    async fn available_by_position(&self, league_id: LeagueId) -> BTreeMap<Position, u32> {
        let rostered = self.ledger.rostered_players(league_id).await;
        let mut available = BTreeMap::new();
        for player in self.reference.players() {
            if !rostered.contains(&player.player_id) {
                *available.entry(player.position).or_insert(0) += 1;
            }
        }
        available
    }

    /// Outcomes of a batch that already ran
    pub async fn replay_batch(&self, league_id: LeagueId, batch_id: BatchId) -> Result<Option<BatchReport>> {
        let slot = self.slot(league_id)?;
        let order = self.order_for(league_id).await;
        let book = slot.book.lock().await;
        Ok(book
            .batches
            .get(&batch_id)
            .filter(|b| b.is_resolved())
            .map(|b| report_for(&book, b, order, true)))
    }
}

/// Claim ids per target player, players ordered by their earliest claim
fn player_groups(book: &LeagueBook, batch: &SettlementBatch) -> Vec<(PlayerId, Vec<ClaimId>)> {
    let mut groups: BTreeMap<PlayerId, (DateTime<Utc>, Vec<ClaimId>)> = BTreeMap::new();
    for claim in batch.claim_ids.iter().filter_map(|id| book.claims.get(id)) {
        let entry = groups.entry(claim.target_player_id).or_insert((claim.submitted_at, Vec::new()));
        entry.0 = entry.0.min(claim.submitted_at);
        entry.1.push(claim.claim_id);
    }

    let mut ordered: Vec<(DateTime<Utc>, PlayerId, Vec<ClaimId>)> =
        groups.into_iter().map(|(player, (earliest, ids))| (earliest, player, ids)).collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    ordered.into_iter().map(|(_, player, ids)| (player, ids)).collect()
}

/// Outcomes in evaluation order: player groups in order, candidates sorted
fn report_for(
    book: &LeagueBook,
    batch: &SettlementBatch,
    order: CandidateOrder,
    replayed: bool,
) -> BatchReport {
    let groups = player_groups(book, batch);
    let mut outcomes = Vec::with_capacity(batch.claim_ids.len());
    for (_, claim_ids) in &groups {
        let mut claims: Vec<&WaiverClaim> = claim_ids.iter().filter_map(|id| book.claims.get(id)).collect();
        sort_candidates(order, &mut claims, |c| c.candidate_key());
        outcomes.extend(claims.into_iter().map(WaiverClaim::outcome));
    }

    BatchReport {
        league_id: batch.league_id,
        batch_id: Some(batch.batch_id),
        cutoff: batch.cutoff,
        stats: BatchStats::from_outcomes(&outcomes, groups.len()),
        outcomes,
        valuations: Vec::new(),
        deferred_withdrawals: Vec::new(),
        replayed,
        resumed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadcast_gateway::RecordingGateway;
    use chrono::TimeZone;
    use league_core::{LeagueRegistry, LeagueSeed, LeagueSettings, Player, TeamSeed};
    use persistence::InMemoryPersistence;
    use roster_ledger::LedgerConfig;
    use valuation_engine::{AdvisoryService, ValuationConfig, ValuationEngine};

    const LEAGUE: LeagueId = 4;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 9, minute, 0).unwrap()
    }

    fn seed() -> LeagueSeed {
        LeagueSeed {
            settings: LeagueSettings {
                league_id: LEAGUE,
                season: 2025,
                roster_limit: 4,
                position_limits: BTreeMap::new(),
                faab_budget: 100,
                min_bid: 1,
                waiver_type: Default::default(),
                tiebreaker: Default::default(),
            },
            teams: vec![
                TeamSeed { team_id: 1, roster: vec![11] },
                TeamSeed { team_id: 2, roster: vec![12] },
            ],
            priority: vec![1, 2],
            scoring_preset: None,
            rules: vec![],
        }
    }

    async fn processor() -> (SettlementProcessor, RecordingGateway) {
        let registry = LeagueRegistry::new();
        for player_id in [11, 12, 30, 31] {
            registry.add_player(Player {
                player_id,
                name: format!("Player {player_id}"),
                position: Position::RB,
                nfl_team: "DET".into(),
                eligibility: Default::default(),
            });
        }
        let reference: Arc<dyn ReferenceData> = Arc::new(registry);
        let storage = InMemoryPersistence::with_default_config();
        let journal = Arc::new(Journal::open(Arc::new(storage)).await.unwrap());
        let ledger = Arc::new(RosterLedger::new(LedgerConfig::default(), Arc::clone(&reference), Arc::clone(&journal)));
        ledger.register_league(&seed()).await.unwrap();

        let gateway = RecordingGateway::new();
        let processor = SettlementProcessor::new(
            SettlementConfig::default(),
            reference,
            journal,
            ledger,
            Arc::new(gateway.clone()),
        );
        processor.register_league(LEAGUE, seed().initial_priority());
        (processor, gateway)
    }

    fn submission(team_id: TeamId, player: PlayerId, bid: u32, minute: u32) -> ClaimSubmission {
        ClaimSubmission {
            league_id: LEAGUE,
            team_id,
            target_player_id: player,
            drop_player_id: None,
            bid_amount: bid,
            submitted_at: at(minute),
        }
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let (processor, _) = processor().await;

        let err = processor.submit_claim(ClaimSubmission { league_id: 99, ..submission(1, 30, 5, 0) }).await;
        assert!(matches!(err, Err(SettlementError::UnknownLeague { league_id: 99 })));
        assert!(matches!(
            processor.submit_claim(submission(9, 30, 5, 0)).await,
            Err(SettlementError::UnknownTeam { team_id: 9, .. })
        ));
        assert!(matches!(
            processor.submit_claim(submission(1, 777, 5, 0)).await,
            Err(SettlementError::UnknownPlayer { player_id: 777 })
        ));
        assert!(matches!(
            processor.submit_claim(submission(1, 11, 5, 0)).await,
            Err(SettlementError::AlreadyRostered { .. })
        ));
        assert!(matches!(
            processor.submit_claim(submission(1, 30, 0, 0)).await,
            Err(SettlementError::BidOutOfRange { bid: 0, min: 1, max: 100 })
        ));
        assert!(matches!(
            processor.submit_claim(submission(1, 30, 101, 0)).await,
            Err(SettlementError::BidOutOfRange { bid: 101, .. })
        ));
        let stale_drop = ClaimSubmission { drop_player_id: Some(12), ..submission(1, 30, 5, 0) };
        assert!(matches!(
            processor.submit_claim(stale_drop).await,
            Err(SettlementError::DropNotOnRoster { team_id: 1, player_id: 12 })
        ));

        let claim_id = processor.submit_claim(submission(1, 30, 100, 0)).await.unwrap();
        let claim = processor.claim(LEAGUE, claim_id).await.unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.batch_id, None);
        assert_eq!(processor.metrics().snapshot().claims_submitted, 1);
    }

    #[tokio::test]
    async fn test_withdraw_pending_claim() {
        let (processor, gateway) = processor().await;
        let claim_id = processor.submit_claim(submission(1, 30, 5, 0)).await.unwrap();

        assert!(matches!(
            processor.withdraw_claim(LEAGUE, 2, claim_id).await,
            Err(SettlementError::NotClaimOwner { owner: 1, team_id: 2, .. })
        ));
        assert_eq!(processor.withdraw_claim(LEAGUE, 1, claim_id).await.unwrap(), Withdrawal::Applied);

        let claim = processor.claim(LEAGUE, claim_id).await.unwrap();
        assert_eq!(claim.status, ClaimStatus::Withdrawn);
        assert_eq!(claim.reason, Some(RejectionReason::WithdrawnByTeam));
        assert_eq!(gateway.claim_outcomes()[0].status, ClaimStatus::Withdrawn);

        assert!(matches!(
            processor.withdraw_claim(LEAGUE, 1, claim_id).await,
            Err(SettlementError::ClaimNotPending { status: ClaimStatus::Withdrawn, .. })
        ));

        // Nothing left to settle
        let report = processor.run_batch(LEAGUE, at(30)).await.unwrap();
        assert_eq!(report.batch_id, None);
    }

    #[tokio::test]
    async fn test_queued_withdrawal_applies_before_evaluation() {
        let (processor, _) = processor().await;
        let first = processor.submit_claim(submission(1, 30, 10, 0)).await.unwrap();
        let second = processor.submit_claim(submission(2, 30, 5, 1)).await.unwrap();

        let slot = processor.slot(LEAGUE).unwrap();
        {
            let _run = slot.run_lock.lock().await;
            slot.gate.lock().running = true;
            assert_eq!(processor.withdraw_claim(LEAGUE, 1, first).await.unwrap(), Withdrawal::Queued);
            slot.gate.lock().running = false;
        }

        let report = processor.run_batch(LEAGUE, at(30)).await.unwrap();
        assert_eq!(report.outcome(first).unwrap().status, ClaimStatus::Withdrawn);
        assert_eq!(report.outcome(second).unwrap().status, ClaimStatus::Accepted);
        assert!(report.deferred_withdrawals.is_empty());
        assert_eq!(report.stats.withdrawn, 1);
    }

    #[tokio::test]
    async fn test_withdrawal_after_decision_is_deferred_noop() {
        let (processor, _) = processor().await;
        let claim_id = processor.submit_claim(submission(1, 30, 10, 0)).await.unwrap();
        processor.run_batch(LEAGUE, at(30)).await.unwrap();

        let slot = processor.slot(LEAGUE).unwrap();
        let deferred = processor.apply_withdrawals(LEAGUE, &slot, BTreeSet::from([claim_id])).await;
        assert_eq!(deferred, vec![claim_id]);
        assert_eq!(processor.claim(LEAGUE, claim_id).await.unwrap().status, ClaimStatus::Accepted);
    }

    #[tokio::test]
    async fn test_claims_after_cutoff_wait_for_next_batch() {
        let (processor, _) = processor().await;
        let early = processor.submit_claim(submission(1, 30, 10, 5)).await.unwrap();
        let late = processor.submit_claim(submission(2, 31, 10, 45)).await.unwrap();

        let report = processor.run_batch(LEAGUE, at(30)).await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcome(early).is_some());
        assert_eq!(processor.claim(LEAGUE, late).await.unwrap().status, ClaimStatus::Pending);

        let report = processor.run_batch(LEAGUE, at(50)).await.unwrap();
        assert_eq!(report.outcome(late).unwrap().status, ClaimStatus::Accepted);
        assert_eq!(processor.open_batches().await, vec![]);
    }

    #[tokio::test]
    async fn test_withdrawal_waits_for_lock_release_then_applies() {
        let (processor, _) = processor().await;
        let processor = Arc::new(processor);
        let claim_id = processor.submit_claim(submission(1, 30, 5, 0)).await.unwrap();

        let slot = processor.slot(LEAGUE).unwrap();
        let held = slot.run_lock.lock().await;
        let waiting = {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.withdraw_claim(LEAGUE, 1, claim_id).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        drop(held);
        slot.gate_changed.notify_waiters();
        assert_eq!(waiting.await.unwrap().unwrap(), Withdrawal::Applied);
        assert_eq!(processor.claim(LEAGUE, claim_id).await.unwrap().status, ClaimStatus::Withdrawn);
    }

    #[tokio::test]
    async fn test_valuations_see_unrostered_pool() {
        let (processor, _) = processor().await;
        let processor =
            processor.with_advisory(Arc::new(AdvisoryService::new(ValuationEngine::new(ValuationConfig::default()))));

        // 11 and 12 are rostered; 30 and 31 are the free running backs
        let available = processor.available_by_position(LEAGUE).await;
        assert_eq!(available, BTreeMap::from([(Position::RB, 2)]));

        processor.submit_claim(submission(1, 30, 5, 0)).await.unwrap();
        let report = processor.run_batch(LEAGUE, at(30)).await.unwrap();
        assert_eq!(report.valuations.len(), 1);

        // One of two RB starters rostered (depth 0.875), two of a 100 player
        // pool left (scarcity 0.98)
        let need = report.valuations[0].components.positional_need;
        assert!((need - (0.7 * 0.875 + 0.3 * 0.98)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_standings_must_list_known_teams_once() {
        let (processor, _) = processor().await;

        assert!(matches!(
            processor.record_standings(LEAGUE, vec![]).await,
            Err(SettlementError::InvalidStandings { .. })
        ));
        assert!(matches!(
            processor.record_standings(LEAGUE, vec![1, 9]).await,
            Err(SettlementError::UnknownTeam { team_id: 9, .. })
        ));
        assert!(matches!(
            processor.record_standings(LEAGUE, vec![2, 1, 2]).await,
            Err(SettlementError::InvalidStandings { .. })
        ));
        assert!(processor.standings(LEAGUE).await.is_empty());

        processor.record_standings(LEAGUE, vec![2, 1]).await.unwrap();
        assert_eq!(processor.standings(LEAGUE).await, vec![2, 1]);
    }
}
