//! Tagged message kinds flowing into and out of the engine
//!
//! Every payload the engine accepts or emits is one variant of
//! [`EngineMessage`]. The serialized form carries a `type` tag so feed
//! adapters and downstream consumers never have to guess the shape.

use crate::types::{ClaimId, GameId, LeagueId, PlayerId, Position, SequenceId, TeamId, Week};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Statistical event kinds produced by the game feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "passingYards")]
    PassingYards,
    #[serde(rename = "passingTD")]
    PassingTd,
    #[serde(rename = "interception")]
    Interception,
    #[serde(rename = "rushingYards")]
    RushingYards,
    #[serde(rename = "rushingTD")]
    RushingTd,
    #[serde(rename = "reception")]
    Reception,
    #[serde(rename = "receivingYards")]
    ReceivingYards,
    #[serde(rename = "receivingTD")]
    ReceivingTd,
    #[serde(rename = "fumbleLost")]
    FumbleLost,
    #[serde(rename = "turnover")]
    Turnover,
    #[serde(rename = "twoPointConversion")]
    TwoPointConversion,
    #[serde(rename = "fieldGoal")]
    FieldGoal,
    #[serde(rename = "extraPoint")]
    ExtraPoint,
    #[serde(rename = "sack")]
    Sack,
    #[serde(rename = "defensiveTD")]
    DefensiveTd,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        EventKind::PassingYards,
        EventKind::PassingTd,
        EventKind::Interception,
        EventKind::RushingYards,
        EventKind::RushingTd,
        EventKind::Reception,
        EventKind::ReceivingYards,
        EventKind::ReceivingTd,
        EventKind::FumbleLost,
        EventKind::Turnover,
        EventKind::TwoPointConversion,
        EventKind::FieldGoal,
        EventKind::ExtraPoint,
        EventKind::Sack,
        EventKind::DefensiveTd,
    ];

    /// Wire name of the kind, as used in rule publications
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PassingYards => "passingYards",
            EventKind::PassingTd => "passingTD",
            EventKind::Interception => "interception",
            EventKind::RushingYards => "rushingYards",
            EventKind::RushingTd => "rushingTD",
            EventKind::Reception => "reception",
            EventKind::ReceivingYards => "receivingYards",
            EventKind::ReceivingTd => "receivingTD",
            EventKind::FumbleLost => "fumbleLost",
            EventKind::Turnover => "turnover",
            EventKind::TwoPointConversion => "twoPointConversion",
            EventKind::FieldGoal => "fieldGoal",
            EventKind::ExtraPoint => "extraPoint",
            EventKind::Sack => "sack",
            EventKind::DefensiveTd => "defensiveTD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == value)
    }

    pub fn is_yardage(&self) -> bool {
        matches!(
            self,
            EventKind::PassingYards | EventKind::RushingYards | EventKind::ReceivingYards
        )
    }

    /// Kinds whose rule value is negative; the feed may send negative
    /// magnitudes for them when a turnover is overturned
    pub fn is_negative_scoring(&self) -> bool {
        matches!(self, EventKind::Interception | EventKind::FumbleLost | EventKind::Turnover)
    }

    pub fn allows_negative_magnitude(&self) -> bool {
        self.is_yardage() || self.is_negative_scoring()
    }

    /// Inclusive sane bounds for a single event's magnitude
    pub fn magnitude_bounds(&self) -> (Decimal, Decimal) {
        let upper = if self.is_yardage() { Decimal::from(110) } else { Decimal::from(10) };
        let lower = if self.is_yardage() {
            Decimal::from(-99)
        } else if self.allows_negative_magnitude() {
            -upper
        } else {
            Decimal::ZERO
        };
        (lower, upper)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single statistical event from the game feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatEvent {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub event_kind: EventKind,
    pub magnitude: Decimal,
    pub sequence_id: SequenceId,
    pub occurred_at: DateTime<Utc>,
}

/// Flat points awarded once a player's weekly yardage reaches `threshold`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YardageBonus {
    pub threshold: Decimal,
    pub points: Decimal,
}

/// One entry of a scoring rule publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub event_kind: EventKind,
    pub point_value: Decimal,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub position_overrides: BTreeMap<Position, Decimal>,
    /// Only meaningful on yardage kinds; bonuses stack
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bonuses: Vec<YardageBonus>,
}

impl RuleSpec {
    pub fn new(event_kind: EventKind, point_value: Decimal) -> Self {
        Self { event_kind, point_value, position_overrides: BTreeMap::new(), bonuses: Vec::new() }
    }

    pub fn with_override(mut self, position: Position, point_value: Decimal) -> Self {
        self.position_overrides.insert(position, point_value);
        self
    }

    pub fn with_bonus(mut self, threshold: Decimal, points: Decimal) -> Self {
        self.bonuses.push(YardageBonus { threshold, points });
        self
    }

    /// Bonus points gained (or lost) when the running total moves from
    /// `before` to `after`
    pub fn bonus_delta(&self, before: Decimal, after: Decimal) -> Decimal {
        self.bonuses
            .iter()
            .map(|bonus| {
                let was = before >= bonus.threshold;
                let is = after >= bonus.threshold;
                match (was, is) {
                    (false, true) => bonus.points,
                    (true, false) => -bonus.points,
                    _ => Decimal::ZERO,
                }
            })
            .sum()
    }
}

/// A new scoring rule version for a league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePublication {
    pub league_id: LeagueId,
    pub effective_from: DateTime<Utc>,
    pub rules: Vec<RuleSpec>,
}

/// Current league standings, best team first; reverse-order leagues
/// derive waiver priority from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsUpdate {
    pub league_id: LeagueId,
    pub standings: Vec<TeamId>,
}

/// A waiver claim as submitted by the API layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSubmission {
    pub league_id: LeagueId,
    pub team_id: TeamId,
    pub target_player_id: PlayerId,
    #[serde(default)]
    pub drop_player_id: Option<PlayerId>,
    pub bid_amount: u32,
    pub submitted_at: DateTime<Utc>,
}

/// Claim lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Evaluating,
    Accepted,
    Rejected,
    Invalidated,
    Withdrawn,
}

impl ClaimStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClaimStatus::Accepted
                | ClaimStatus::Rejected
                | ClaimStatus::Invalidated
                | ClaimStatus::Withdrawn
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Evaluating => "evaluating",
            ClaimStatus::Accepted => "accepted",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Invalidated => "invalidated",
            ClaimStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ClaimStatus::Pending),
            "evaluating" => Some(ClaimStatus::Evaluating),
            "accepted" => Some(ClaimStatus::Accepted),
            "rejected" => Some(ClaimStatus::Rejected),
            "invalidated" => Some(ClaimStatus::Invalidated),
            "withdrawn" => Some(ClaimStatus::Withdrawn),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a claim did not win its player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    PlayerUnavailable,
    RosterFullNoDrop,
    RosterLimitExceeded,
    PositionLimitExceeded,
    DropNotOnRoster,
    InsufficientBudget,
    UnknownTeam,
    WithdrawnByTeam,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::PlayerUnavailable => "player_unavailable",
            RejectionReason::RosterFullNoDrop => "roster_full_no_drop",
            RejectionReason::RosterLimitExceeded => "roster_limit_exceeded",
            RejectionReason::PositionLimitExceeded => "position_limit_exceeded",
            RejectionReason::DropNotOnRoster => "drop_not_on_roster",
            RejectionReason::InsufficientBudget => "insufficient_budget",
            RejectionReason::UnknownTeam => "unknown_team",
            RejectionReason::WithdrawnByTeam => "withdrawn_by_team",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            RejectionReason::PlayerUnavailable,
            RejectionReason::RosterFullNoDrop,
            RejectionReason::RosterLimitExceeded,
            RejectionReason::PositionLimitExceeded,
            RejectionReason::DropNotOnRoster,
            RejectionReason::InsufficientBudget,
            RejectionReason::UnknownTeam,
            RejectionReason::WithdrawnByTeam,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == value)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted after a stat event changes a player's weekly total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDelta {
    pub player_id: PlayerId,
    pub league_id: LeagueId,
    pub week: Week,
    pub new_total: Decimal,
    pub delta: Decimal,
    pub source_sequence_id: SequenceId,
}

/// Emitted once per claim when it reaches a terminal status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub claim_id: ClaimId,
    pub league_id: LeagueId,
    pub team_id: TeamId,
    pub target_player_id: PlayerId,
    pub status: ClaimStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_charged: Option<u32>,
}

/// Every message kind the engine reads or writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineMessage {
    StatEvent(StatEvent),
    ClaimSubmission(ClaimSubmission),
    RulePublication(RulePublication),
    StandingsUpdate(StandingsUpdate),
    ScoreDelta(ScoreDelta),
    ClaimOutcome(ClaimOutcome),
}

impl EngineMessage {
    /// Whether the engine consumes this kind (as opposed to emitting it)
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            EngineMessage::StatEvent(_)
                | EngineMessage::ClaimSubmission(_)
                | EngineMessage::RulePublication(_)
                | EngineMessage::StandingsUpdate(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineMessage::StatEvent(_) => "stat_event",
            EngineMessage::ClaimSubmission(_) => "claim_submission",
            EngineMessage::RulePublication(_) => "rule_publication",
            EngineMessage::StandingsUpdate(_) => "standings_update",
            EngineMessage::ScoreDelta(_) => "score_delta",
            EngineMessage::ClaimOutcome(_) => "claim_outcome",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_names() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_magnitude_bounds() {
        let (lo, hi) = EventKind::Reception.magnitude_bounds();
        assert_eq!(lo, Decimal::ZERO);
        assert_eq!(hi, Decimal::from(10));

        let (lo, _) = EventKind::Turnover.magnitude_bounds();
        assert!(lo < Decimal::ZERO);

        let (lo, hi) = EventKind::RushingYards.magnitude_bounds();
        assert_eq!(lo, Decimal::from(-99));
        assert_eq!(hi, Decimal::from(110));
    }

    #[test]
    fn test_engine_message_tagging() {
        let raw = r#"{
            "type": "stat_event",
            "gameId": 7,
            "playerId": 11,
            "eventKind": "receivingTD",
            "magnitude": 1,
            "sequenceId": 42,
            "occurredAt": "2025-09-14T17:05:00Z"
        }"#;

        let msg: EngineMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.is_inbound());
        assert_eq!(msg.kind(), "stat_event");
        match msg {
            EngineMessage::StatEvent(event) => {
                assert_eq!(event.event_kind, EventKind::ReceivingTd);
                assert_eq!(event.magnitude, Decimal::ONE);
                assert_eq!(event.sequence_id, 42);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_claim_outcome_omits_empty_fields() {
        let outcome = ClaimOutcome {
            claim_id: ClaimId(3),
            league_id: 1,
            team_id: 2,
            target_player_id: 9,
            status: ClaimStatus::Accepted,
            reason: None,
            cost_charged: Some(20),
        };

        let json = serde_json::to_value(EngineMessage::ClaimOutcome(outcome)).unwrap();
        assert_eq!(json["type"], "claim_outcome");
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["costCharged"], 20);
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!ClaimStatus::Pending.is_terminal());
        assert!(!ClaimStatus::Evaluating.is_terminal());
        assert!(ClaimStatus::Accepted.is_terminal());
        assert!(ClaimStatus::Withdrawn.is_terminal());
        assert_eq!(ClaimStatus::parse("invalidated"), Some(ClaimStatus::Invalidated));
        assert_eq!(RejectionReason::parse("roster_full_no_drop"), Some(RejectionReason::RosterFullNoDrop));
    }

    #[test]
    fn test_yardage_bonuses_stack_and_unwind() {
        let spec = RuleSpec::new(EventKind::PassingYards, Decimal::new(4, 2))
            .with_bonus(Decimal::from(300), Decimal::from(3))
            .with_bonus(Decimal::from(400), Decimal::from(6));

        assert_eq!(spec.bonus_delta(Decimal::from(280), Decimal::from(299)), Decimal::ZERO);
        assert_eq!(spec.bonus_delta(Decimal::from(290), Decimal::from(300)), Decimal::from(3));
        assert_eq!(spec.bonus_delta(Decimal::from(290), Decimal::from(410)), Decimal::from(9));
        // A correction back under a threshold takes the bonus away
        assert_eq!(spec.bonus_delta(Decimal::from(405), Decimal::from(395)), Decimal::from(-6));
    }

    #[test]
    fn test_standings_update_tagging() {
        let raw = r#"{"type": "standings_update", "leagueId": 3, "standings": [2, 1, 4]}"#;
        let msg: EngineMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.is_inbound());
        assert_eq!(msg.kind(), "standings_update");
        assert_eq!(
            msg,
            EngineMessage::StandingsUpdate(StandingsUpdate { league_id: 3, standings: vec![2, 1, 4] })
        );
    }
}
