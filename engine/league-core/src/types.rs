use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// League identifier
pub type LeagueId = u32;

/// Fantasy team identifier (unique across leagues)
pub type TeamId = u32;

/// NFL player identifier
pub type PlayerId = u32;

/// NFL game identifier
pub type GameId = u32;

/// Scoring week within a season (1-18)
pub type Week = u8;

/// Feed sequence number used for stat event de-duplication
pub type SequenceId = u64;

/// Waiver claim identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub u64);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim-{}", self.0)
    }
}

/// Settlement batch identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Roster position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    QB,
    RB,
    WR,
    TE,
    K,
    DEF,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::QB => "QB",
            Position::RB => "RB",
            Position::WR => "WR",
            Position::TE => "TE",
            Position::K => "K",
            Position::DEF => "DEF",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "QB" => Some(Position::QB),
            "RB" => Some(Position::RB),
            "WR" => Some(Position::WR),
            "TE" => Some(Position::TE),
            "K" => Some(Position::K),
            "DEF" | "DST" => Some(Position::DEF),
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weekly availability of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    #[default]
    Active,
    Injured,
    Bye,
}

/// An NFL player as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: PlayerId,
    pub name: String,
    pub position: Position,
    /// NFL team abbreviation (e.g. "BAL")
    pub nfl_team: String,
    #[serde(default)]
    pub eligibility: Eligibility,
}

/// An NFL game; supplies the scoring week for stat events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: GameId,
    pub season: u16,
    pub week: Week,
    pub home: String,
    pub away: String,
}

/// How a league decides contested waiver claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaiverType {
    /// Blind bidding: highest bid wins and is charged
    #[default]
    Faab,
    /// Priority order only; the winner moves to the back of the line
    Rolling,
    /// Worst standing first; the order only changes with new standings
    Reverse,
}

impl WaiverType {
    pub fn uses_bids(&self) -> bool {
        matches!(self, WaiverType::Faab)
    }
}

/// Second sort key after the bid (or first, when bids are not used)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tiebreaker {
    /// Waiver priority, then submission time
    #[default]
    Priority,
    /// Submission time, then waiver priority
    BidTime,
}

/// Per-league roster and budget settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSettings {
    pub league_id: LeagueId,
    pub season: u16,
    /// Hard cap on roster size
    pub roster_limit: u32,
    /// Optional per-position caps; absent positions are uncapped
    #[serde(default)]
    pub position_limits: BTreeMap<Position, u32>,
    /// Season FAAB budget granted to every team
    pub faab_budget: u32,
    /// Smallest bid accepted at submission time
    #[serde(default)]
    pub min_bid: u32,
    #[serde(default)]
    pub waiver_type: WaiverType,
    #[serde(default)]
    pub tiebreaker: Tiebreaker,
}

impl LeagueSettings {
    pub fn position_limit(&self, position: Position) -> Option<u32> {
        self.position_limits.get(&position).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_to_faab_with_priority_tiebreak() {
        let raw = r#"{"league_id": 1, "season": 2025, "roster_limit": 15, "faab_budget": 100}"#;
        let settings: LeagueSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.waiver_type, WaiverType::Faab);
        assert_eq!(settings.tiebreaker, Tiebreaker::Priority);
        assert!(settings.waiver_type.uses_bids());

        let raw = r#"{"league_id": 1, "season": 2025, "roster_limit": 15, "faab_budget": 0,
                      "waiver_type": "reverse", "tiebreaker": "bid_time"}"#;
        let settings: LeagueSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.waiver_type, WaiverType::Reverse);
        assert_eq!(settings.tiebreaker, Tiebreaker::BidTime);
        assert!(!settings.waiver_type.uses_bids());
    }
}
