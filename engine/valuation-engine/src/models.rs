use league_core::{Eligibility, PlayerId, Position, TeamId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recent production and usage of a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: PlayerId,
    pub position: Position,
    /// Weekly fantasy points, most recent week first
    #[serde(default)]
    pub recent_points: Vec<f64>,
    /// Offensive snap share in percent
    #[serde(default)]
    pub snap_percentage: Option<f64>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub draft_round: Option<u8>,
    #[serde(default)]
    pub eligibility: Eligibility,
}

impl PlayerProfile {
    /// A profile with nothing known beyond identity
    pub fn bare(player_id: PlayerId, position: Position) -> Self {
        Self {
            player_id,
            position,
            recent_points: Vec::new(),
            snap_percentage: None,
            age: None,
            draft_round: None,
            eligibility: Eligibility::Active,
        }
    }
}

/// The claiming team's situation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamContext {
    pub team_id: TeamId,
    /// Rostered players per position
    #[serde(default)]
    pub rostered: BTreeMap<Position, u32>,
    /// Starters the team needs per position
    #[serde(default)]
    pub starters_required: BTreeMap<Position, u32>,
    /// Unrostered players left at each position
    #[serde(default)]
    pub available_at_position: BTreeMap<Position, u32>,
    #[serde(default)]
    pub remaining_budget: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Stable,
    Falling,
}

impl Trend {
    /// Compare the two most recent weeks against the two before them
    pub fn classify(recent_points: &[f64]) -> Self {
        if recent_points.len() < 3 {
            return Trend::Stable;
        }
        let recent = mean(&recent_points[..2]);
        let previous = mean(&recent_points[2..recent_points.len().min(4)]);
        if recent > previous * 1.2 {
            Trend::Rising
        } else if recent < previous * 0.8 {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Stable => "stable",
            Trend::Falling => "falling",
        }
    }
}

/// Component scores, each within [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationComponents {
    pub trend: f64,
    pub opportunity: f64,
    pub breakout: f64,
    pub positional_need: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationSource {
    Heuristic,
    Provider,
}

/// Advisory value of acquiring a player for a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub player_id: PlayerId,
    pub team_id: TeamId,
    /// Weighted composite within [0, 1]
    pub composite_score: f64,
    pub rationale: Vec<String>,
    /// Within [0, 1]
    pub confidence: f64,
    pub trend: Trend,
    pub components: ValuationComponents,
    pub source: ValuationSource,
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn clip(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}
