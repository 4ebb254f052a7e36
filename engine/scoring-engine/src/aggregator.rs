//! Score Aggregator
//!
//! Turns stat events into per-league weekly point totals. Application is
//! serialized per `(league, player, week, rule version)` row and idempotent
//! by feed sequence id; the new total is journaled before the row changes.

use crate::config::ScoringConfig;
use crate::error::{IngestionError, RuleError};
use crate::metrics::ScoringMetrics;
use crate::rules::{presets, RuleBook, ScoringRule};
use broadcast_gateway::{deliver, BroadcastGateway, Notification};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use league_core::{
    EventKind, LeagueId, Player, PlayerId, ReferenceData, RulePublication, ScoreDelta, SequenceId,
    StatEvent, Week,
};
use persistence::{EngineState, Journal, WalOperation};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Identity of one live score row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub league_id: LeagueId,
    pub player_id: PlayerId,
    pub week: Week,
    pub rule_version: u32,
}

/// Cumulative points for a player in a week under one rule version
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSnapshot {
    pub player_id: PlayerId,
    pub week: Week,
    pub league_id: LeagueId,
    pub rule_version: u32,
    pub total_points: Decimal,
    pub last_applied_sequence_id: Option<SequenceId>,
    pub updated_at: DateTime<Utc>,
    /// Running yardage per kind; threshold bonuses are judged against it
    pub stat_totals: BTreeMap<EventKind, Decimal>,
}

impl ScoreSnapshot {
    fn empty(key: SnapshotKey) -> Self {
        Self {
            player_id: key.player_id,
            week: key.week,
            league_id: key.league_id,
            rule_version: key.rule_version,
            total_points: Decimal::ZERO,
            last_applied_sequence_id: None,
            updated_at: Utc::now(),
            stat_totals: BTreeMap::new(),
        }
    }
}

/// Result of applying one event to one league
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub new_total: Decimal,
}

pub struct ScoreAggregator {
    config: ScoringConfig,
    reference: Arc<dyn ReferenceData>,
    rules: RuleBook,
    journal: Arc<Journal>,
    gateway: Arc<dyn BroadcastGateway>,
    rows: DashMap<SnapshotKey, Arc<Mutex<ScoreSnapshot>>>,
    /// Registered leagues and their halt reason, if halted
    leagues: DashMap<LeagueId, Option<String>>,
    /// Serializes rule publication so versions are assigned in order
    publish_lock: Mutex<()>,
    metrics: Arc<ScoringMetrics>,
}

impl ScoreAggregator {
    pub fn new(
        config: ScoringConfig,
        reference: Arc<dyn ReferenceData>,
        journal: Arc<Journal>,
        gateway: Arc<dyn BroadcastGateway>,
    ) -> Self {
        Self {
            config,
            reference,
            rules: RuleBook::new(),
            journal,
            gateway,
            rows: DashMap::new(),
            leagues: DashMap::new(),
            publish_lock: Mutex::new(()),
            metrics: Arc::new(ScoringMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<ScoringMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Make a league known to the aggregator
    pub fn register_league(&self, league_id: LeagueId) {
        self.leagues.entry(league_id).or_insert(None);
    }

    pub fn league_ids(&self) -> Vec<LeagueId> {
        let mut ids: Vec<LeagueId> = self.leagues.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Rebuild rule versions, halts and score rows from recovered state
    pub fn restore(&self, state: &EngineState) {
        for (league_id, league) in &state.leagues {
            self.leagues.insert(*league_id, league.halted.clone());
            for version in &league.rule_versions {
                self.rules.restore(
                    *league_id,
                    version.version,
                    version.effective_from,
                    &version.rules,
                );
            }
            for record in league.scores.values() {
                let key = SnapshotKey {
                    league_id: *league_id,
                    player_id: record.player_id,
                    week: record.week,
                    rule_version: record.rule_version,
                };
                let snapshot = ScoreSnapshot {
                    player_id: record.player_id,
                    week: record.week,
                    league_id: *league_id,
                    rule_version: record.rule_version,
                    total_points: record.total_points,
                    last_applied_sequence_id: Some(record.last_applied_sequence_id),
                    updated_at: record.updated_at,
                    stat_totals: record.stat_totals.clone(),
                };
                self.rows.insert(key, Arc::new(Mutex::new(snapshot)));
            }
        }
        self.metrics.leagues_halted.set(self.halted_leagues().len() as u64);
        info!("Restored {} score rows across {} leagues", self.rows.len(), self.leagues.len());
    }

    /// Publish a new immutable rule version for a league
    pub async fn publish_rules(
        &self,
        publication: RulePublication,
    ) -> Result<Arc<ScoringRule>, RuleError> {
        let league_id = publication.league_id;
        if !self.leagues.contains_key(&league_id) {
            return Err(RuleError::UnknownLeague { league_id });
        }

        let _guard = self.publish_lock.lock().await;
        let rule = self.rules.prepare(&publication)?;

        self.journal
            .append(WalOperation::RulePublished {
                league_id,
                version: rule.version,
                effective_from: rule.effective_from,
                rules: rule.specs(),
            })
            .await?;

        let rule = self.rules.install(rule);
        self.metrics.rule_versions_published.inc();
        info!(
            "Published scoring rules v{} for league {} effective {}",
            rule.version, league_id, rule.effective_from
        );
        Ok(rule)
    }

    /// Publish a named preset
    pub async fn publish_preset(
        &self,
        league_id: LeagueId,
        preset: &str,
        effective_from: DateTime<Utc>,
    ) -> Result<Arc<ScoringRule>, RuleError> {
        let rules = presets::by_name(preset)?;
        self.publish_rules(RulePublication { league_id, effective_from, rules }).await
    }

    pub fn is_halted(&self, league_id: LeagueId) -> bool {
        self.leagues.get(&league_id).map(|e| e.value().is_some()).unwrap_or(false)
    }

    pub fn halted_leagues(&self) -> Vec<LeagueId> {
        let mut ids: Vec<LeagueId> =
            self.leagues.iter().filter(|e| e.value().is_some()).map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Operator resume after rules have been published
    pub async fn resume_league(&self, league_id: LeagueId) -> Result<(), IngestionError> {
        if !self.leagues.contains_key(&league_id) {
            return Err(IngestionError::UnknownLeague { league_id });
        }
        if !self.is_halted(league_id) {
            return Ok(());
        }
        if self.rules.active_at(league_id, Utc::now()).is_none() {
            return Err(IngestionError::NoActiveRules { league_id, at: Utc::now() });
        }

        self.journal.append(WalOperation::LeagueResumed { league_id }).await?;
        self.leagues.insert(league_id, None);
        self.metrics.leagues_halted.dec();
        info!("League {} resumed", league_id);
        Ok(())
    }

    /// Apply one stat event to one league
    pub async fn apply_event(
        &self,
        league_id: LeagueId,
        event: &StatEvent,
    ) -> Result<ApplyOutcome, IngestionError> {
        self.metrics.events_received.inc();
        let result = self.apply_event_inner(league_id, event).await;

        match &result {
            Ok(outcome) if outcome.applied => self.metrics.events_applied.inc(),
            Ok(_) => {
                self.metrics.events_duplicate.inc();
                if self.config.log_duplicates {
                    debug!(
                        "Duplicate event {} for player {} in league {}",
                        event.sequence_id, event.player_id, league_id
                    );
                }
            }
            Err(e) if e.is_malformed() => {
                self.metrics.events_dropped.inc();
                warn!("Dropping malformed event {}: {}", event.sequence_id, e);
            }
            Err(e @ IngestionError::NoActiveRules { .. }) => {
                error!("League {} halted: {}", league_id, e);
            }
            Err(e) => {
                self.metrics.events_dropped.inc();
                warn!("Event {} not applied to league {}: {}", event.sequence_id, league_id, e);
            }
        }

        result
    }

    /// Fan one event out to every registered league
    pub async fn apply_to_all_leagues(
        &self,
        event: &StatEvent,
    ) -> Vec<(LeagueId, Result<ApplyOutcome, IngestionError>)> {
        let mut results = Vec::new();
        for league_id in self.league_ids() {
            let result = self.apply_event(league_id, event).await;
            results.push((league_id, result));
        }
        results
    }

    async fn apply_event_inner(
        &self,
        league_id: LeagueId,
        event: &StatEvent,
    ) -> Result<ApplyOutcome, IngestionError> {
        match self.leagues.get(&league_id) {
            None => return Err(IngestionError::UnknownLeague { league_id }),
            Some(entry) => {
                if let Some(reason) = entry.value() {
                    return Err(IngestionError::LeagueHalted { league_id, reason: reason.clone() });
                }
            }
        }

        let (player, week) = self.validate(event)?;

        let Some(rule) = self.rules.active_at(league_id, event.occurred_at) else {
            self.halt(league_id, event.occurred_at).await?;
            return Err(IngestionError::NoActiveRules { league_id, at: event.occurred_at });
        };

        let key = SnapshotKey { league_id, player_id: event.player_id, week, rule_version: rule.version };
        let row = Arc::clone(
            &*self.rows.entry(key).or_insert_with(|| Arc::new(Mutex::new(ScoreSnapshot::empty(key)))),
        );

        let mut snapshot = row.lock().await;
        if let Some(last) = snapshot.last_applied_sequence_id {
            if event.sequence_id <= last {
                return Ok(ApplyOutcome { applied: false, new_total: snapshot.total_points });
            }
        }

        let mut delta = rule.point_value(event.event_kind, player.position) * event.magnitude;
        let mut stat_totals = snapshot.stat_totals.clone();
        if event.event_kind.is_yardage() {
            let before = stat_totals.get(&event.event_kind).copied().unwrap_or(Decimal::ZERO);
            let after = before + event.magnitude;
            stat_totals.insert(event.event_kind, after);
            delta += rule.bonus_delta(event.event_kind, before, after);
        }
        let new_total = snapshot.total_points + delta;
        let applied_at = Utc::now();

        self.journal
            .append(WalOperation::ScoreApplied {
                league_id,
                player_id: event.player_id,
                week,
                rule_version: rule.version,
                total_points: new_total,
                delta,
                sequence_id: event.sequence_id,
                applied_at,
                stat_totals: stat_totals.clone(),
            })
            .await?;

        snapshot.total_points = new_total;
        snapshot.stat_totals = stat_totals;
        snapshot.last_applied_sequence_id = Some(event.sequence_id);
        snapshot.updated_at = applied_at;
        drop(snapshot);

        deliver(
            self.gateway.as_ref(),
            Notification::ScoreDelta(ScoreDelta {
                player_id: event.player_id,
                league_id,
                week,
                new_total,
                delta,
                source_sequence_id: event.sequence_id,
            }),
        )
        .await;

        Ok(ApplyOutcome { applied: true, new_total })
    }

    fn validate(&self, event: &StatEvent) -> Result<(Player, Week), IngestionError> {
        let player = self.reference.player(event.player_id).ok_or(IngestionError::UnknownPlayer {
            player_id: event.player_id,
            sequence_id: event.sequence_id,
        })?;
        let game = self.reference.game(event.game_id).ok_or(IngestionError::UnknownGame {
            game_id: event.game_id,
            sequence_id: event.sequence_id,
        })?;

        if event.magnitude.is_sign_negative()
            && !event.magnitude.is_zero()
            && !event.event_kind.allows_negative_magnitude()
        {
            return Err(IngestionError::NegativeMagnitude {
                event_kind: event.event_kind,
                magnitude: event.magnitude,
                sequence_id: event.sequence_id,
            });
        }

        let (lower, upper) = event.event_kind.magnitude_bounds();
        if event.magnitude < lower || event.magnitude > upper {
            return Err(IngestionError::MagnitudeOutOfBounds {
                event_kind: event.event_kind,
                magnitude: event.magnitude,
                sequence_id: event.sequence_id,
            });
        }

        Ok((player, game.week))
    }

    async fn halt(&self, league_id: LeagueId, at: DateTime<Utc>) -> Result<(), IngestionError> {
        let reason = format!("no active scoring rules at {at}");
        self.journal
            .append(WalOperation::LeagueHalted { league_id, reason: reason.clone() })
            .await?;
        let newly_halted = self.leagues.insert(league_id, Some(reason)).flatten().is_none();
        if newly_halted {
            self.metrics.leagues_halted.inc();
        }
        Ok(())
    }

    /// Copy of one score row
    pub async fn snapshot(&self, key: SnapshotKey) -> Option<ScoreSnapshot> {
        let row = self.rows.get(&key).map(|r| Arc::clone(r.value()))?;
        let snapshot = row.lock().await;
        Some(snapshot.clone())
    }

    /// Total under the newest rule version that has a row for the week
    pub async fn week_total(
        &self,
        league_id: LeagueId,
        player_id: PlayerId,
        week: Week,
    ) -> Option<Decimal> {
        let key = self
            .rows
            .iter()
            .map(|e| *e.key())
            .filter(|k| k.league_id == league_id && k.player_id == player_id && k.week == week)
            .max_by_key(|k| k.rule_version)?;
        self.snapshot(key).await.map(|s| s.total_points)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
