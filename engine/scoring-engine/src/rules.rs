//! Versioned scoring rule table
//!
//! A league's rule versions are immutable once installed. A publication
//! creates version `n + 1`; the active version at time `t` is the latest
//! version whose `effective_from <= t`.

use crate::error::RuleError;
use chrono::{DateTime, Utc};
use league_core::{EventKind, LeagueId, Position, RulePublication, RuleSpec};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One immutable rule version
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRule {
    pub league_id: LeagueId,
    pub version: u32,
    pub effective_from: DateTime<Utc>,
    rules: BTreeMap<EventKind, RuleSpec>,
}

impl ScoringRule {
    /// Point value for one unit of `kind` scored by a player at `position`
    pub fn point_value(&self, kind: EventKind, position: Position) -> Decimal {
        match self.rules.get(&kind) {
            Some(spec) => {
                spec.position_overrides.get(&position).copied().unwrap_or(spec.point_value)
            }
            None => Decimal::ZERO,
        }
    }

    /// Threshold bonus change when a player's running `kind` total moves
    /// from `before` to `after`
    pub fn bonus_delta(&self, kind: EventKind, before: Decimal, after: Decimal) -> Decimal {
        match self.rules.get(&kind) {
            Some(spec) => spec.bonus_delta(before, after),
            None => Decimal::ZERO,
        }
    }

    pub fn has_bonuses(&self, kind: EventKind) -> bool {
        self.rules.get(&kind).is_some_and(|spec| !spec.bonuses.is_empty())
    }

    pub fn specs(&self) -> Vec<RuleSpec> {
        self.rules.values().cloned().collect()
    }
}

fn check_bonuses(spec: &RuleSpec) -> Result<(), RuleError> {
    if spec.bonuses.is_empty() {
        return Ok(());
    }
    let invalid = |reason: &str| RuleError::InvalidBonus {
        event_kind: spec.event_kind,
        reason: reason.to_string(),
    };
    if !spec.event_kind.is_yardage() {
        return Err(invalid("bonuses apply to yardage kinds only"));
    }
    let mut thresholds = HashSet::new();
    for bonus in &spec.bonuses {
        if bonus.threshold <= Decimal::ZERO {
            return Err(invalid("threshold must be positive"));
        }
        if !thresholds.insert(bonus.threshold) {
            return Err(invalid("threshold listed more than once"));
        }
    }
    Ok(())
}

/// Rule versions for every league
pub struct RuleBook {
    leagues: RwLock<HashMap<LeagueId, Vec<Arc<ScoringRule>>>>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self { leagues: RwLock::new(HashMap::new()) }
    }

    /// Validate a publication and build the next version without installing it
    pub fn prepare(&self, publication: &RulePublication) -> Result<ScoringRule, RuleError> {
        if publication.rules.is_empty() {
            return Err(RuleError::EmptyRuleSet);
        }

        let mut seen = HashSet::new();
        for spec in &publication.rules {
            if !seen.insert(spec.event_kind) {
                return Err(RuleError::DuplicateEventKind { event_kind: spec.event_kind });
            }
            check_bonuses(spec)?;
        }

        let latest = self.latest(publication.league_id);
        if let Some(latest) = &latest {
            if publication.effective_from < latest.effective_from {
                return Err(RuleError::EffectiveFromRegression {
                    requested: publication.effective_from,
                    latest: latest.effective_from,
                    latest_version: latest.version,
                });
            }
        }

        Ok(ScoringRule {
            league_id: publication.league_id,
            version: latest.map(|l| l.version + 1).unwrap_or(1),
            effective_from: publication.effective_from,
            rules: publication.rules.iter().map(|s| (s.event_kind, s.clone())).collect(),
        })
    }

    /// Install a prepared (or recovered) version
    pub fn install(&self, rule: ScoringRule) -> Arc<ScoringRule> {
        let rule = Arc::new(rule);
        let mut leagues = self.leagues.write();
        let versions = leagues.entry(rule.league_id).or_default();
        versions.push(Arc::clone(&rule));
        versions.sort_by_key(|r| r.version);
        rule
    }

    /// Rebuild a version from its persisted form
    pub fn restore(
        &self,
        league_id: LeagueId,
        version: u32,
        effective_from: DateTime<Utc>,
        specs: &[RuleSpec],
    ) -> Arc<ScoringRule> {
        self.install(ScoringRule {
            league_id,
            version,
            effective_from,
            rules: specs.iter().map(|s| (s.event_kind, s.clone())).collect(),
        })
    }

    pub fn latest(&self, league_id: LeagueId) -> Option<Arc<ScoringRule>> {
        self.leagues.read().get(&league_id).and_then(|v| v.last().cloned())
    }

    /// The single version active at `at`
    pub fn active_at(&self, league_id: LeagueId, at: DateTime<Utc>) -> Option<Arc<ScoringRule>> {
        let leagues = self.leagues.read();
        let versions = leagues.get(&league_id)?;
        // effective_from is non-decreasing in version order
        versions.iter().rev().find(|r| r.effective_from <= at).cloned()
    }

    pub fn version(&self, league_id: LeagueId, version: u32) -> Option<Arc<ScoringRule>> {
        let leagues = self.leagues.read();
        leagues.get(&league_id)?.iter().find(|r| r.version == version).cloned()
    }

    pub fn version_count(&self, league_id: LeagueId) -> usize {
        self.leagues.read().get(&league_id).map(|v| v.len()).unwrap_or(0)
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Named rule sets for common league formats
pub mod presets {
    use super::*;

    fn d(value: &str) -> Decimal {
        value.parse().unwrap_or(Decimal::ZERO)
    }

    fn base(reception: &str) -> Vec<RuleSpec> {
        vec![
            RuleSpec::new(EventKind::PassingYards, d("0.04")),
            RuleSpec::new(EventKind::PassingTd, d("4")),
            RuleSpec::new(EventKind::Interception, d("-2")).with_override(Position::DEF, d("2")),
            RuleSpec::new(EventKind::RushingYards, d("0.1")),
            RuleSpec::new(EventKind::RushingTd, d("6")),
            RuleSpec::new(EventKind::Reception, d(reception)).with_override(Position::QB, d("0")),
            RuleSpec::new(EventKind::ReceivingYards, d("0.1")),
            RuleSpec::new(EventKind::ReceivingTd, d("6")),
            RuleSpec::new(EventKind::FumbleLost, d("-2")),
            RuleSpec::new(EventKind::Turnover, d("-2")),
            RuleSpec::new(EventKind::TwoPointConversion, d("2")),
            RuleSpec::new(EventKind::FieldGoal, d("3")),
            RuleSpec::new(EventKind::ExtraPoint, d("1")),
            RuleSpec::new(EventKind::Sack, d("1")),
            RuleSpec::new(EventKind::DefensiveTd, d("6")),
        ]
    }

    pub fn standard() -> Vec<RuleSpec> {
        base("0")
    }

    pub fn half_ppr() -> Vec<RuleSpec> {
        base("0.5")
    }

    pub fn ppr() -> Vec<RuleSpec> {
        base("1")
    }

    /// PPR with 1.5 points per tight end reception
    pub fn te_premium() -> Vec<RuleSpec> {
        ppr()
            .into_iter()
            .map(|spec| match spec.event_kind {
                EventKind::Reception => spec.with_override(Position::TE, d("1.5")),
                _ => spec,
            })
            .collect()
    }

    /// PPR plus 3 points at 300 passing yards and 6 more at 400; rushing
    /// and receiving pay the same at 100 and 200
    pub fn bonus_heavy() -> Vec<RuleSpec> {
        ppr()
            .into_iter()
            .map(|spec| match spec.event_kind {
                EventKind::PassingYards => spec.with_bonus(d("300"), d("3")).with_bonus(d("400"), d("6")),
                EventKind::RushingYards | EventKind::ReceivingYards => {
                    spec.with_bonus(d("100"), d("3")).with_bonus(d("200"), d("6"))
                }
                _ => spec,
            })
            .collect()
    }

    pub fn by_name(name: &str) -> Result<Vec<RuleSpec>, RuleError> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "standard" => Ok(standard()),
            "half_ppr" => Ok(half_ppr()),
            "ppr" => Ok(ppr()),
            "te_premium" | "dynasty" => Ok(te_premium()),
            "bonus_heavy" => Ok(bonus_heavy()),
            _ => Err(RuleError::UnknownPreset { name: name.to_string() }),
        }
    }
}
