use crate::config::ValuationConfig;
use crate::models::*;
use league_core::Eligibility;
use tracing::debug;

/// Breakout indicator weights: age, opportunity, efficiency, talent, situation, history
const BREAKOUT_WEIGHTS: [f64; 6] = [0.2, 0.25, 0.2, 0.1, 0.1, 0.1];
const SITUATION_INDICATOR: f64 = 0.5;
const HISTORY_INDICATOR: f64 = 0.6;
const NEUTRAL: f64 = 0.5;

/// Heuristic valuation; pure and infallible
pub struct ValuationEngine {
    config: ValuationConfig,
}

struct Component {
    value: f64,
    missing: bool,
}

impl Component {
    fn known(value: f64) -> Self {
        Self { value: clip(value), missing: false }
    }

    fn neutral() -> Self {
        Self { value: NEUTRAL, missing: true }
    }
}

impl ValuationEngine {
    pub fn new(config: ValuationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    /// Score a player for a team
    pub fn score(&self, profile: &PlayerProfile, context: &TeamContext) -> Valuation {
        let trend = Trend::classify(&profile.recent_points);
        let mut rationale = Vec::new();

        let production = self.trend_component(profile, trend);
        if production.missing {
            rationale.push("No recent production; trend treated as neutral".to_string());
        } else {
            rationale.push(format!(
                "Averaging {:.1} points over {} weeks, trend {}",
                mean(&profile.recent_points),
                profile.recent_points.len(),
                trend.as_str()
            ));
        }

        let opportunity = self.opportunity_component(profile);
        match (opportunity.missing, profile.snap_percentage) {
            (true, _) => rationale.push("Snap share unknown; opportunity treated as neutral".to_string()),
            (false, Some(snaps)) => rationale.push(format!("Playing {snaps:.0}% of snaps")),
            (false, None) => {}
        }
        if profile.eligibility == Eligibility::Injured {
            rationale.push("Currently injured; opportunity discounted".to_string());
        }

        let breakout = self.breakout_component(profile, trend);
        if breakout.missing {
            rationale.push("No age or draft data; breakout signal treated as neutral".to_string());
        } else if breakout.value >= 0.7 {
            rationale.push("Profile fits a breakout candidate".to_string());
        }

        let need = self.positional_need_component(profile, context);
        if need.missing {
            rationale.push(format!(
                "No {} roster requirement for team {}; need treated as neutral",
                profile.position, context.team_id
            ));
        } else if need.value >= 0.75 {
            rationale.push(format!("Team {} is thin at {}", context.team_id, profile.position));
        }

        let components = ValuationComponents {
            trend: production.value,
            opportunity: opportunity.value,
            breakout: breakout.value,
            positional_need: need.value,
        };

        let weights = self.config.effective_weights();
        let composite = clip(
            (weights.trend * components.trend
                + weights.opportunity * components.opportunity
                + weights.breakout * components.breakout
                + weights.positional_need * components.positional_need)
                / weights.total(),
        );

        let missing = [&production, &opportunity, &breakout, &need]
            .iter()
            .filter(|c| c.missing)
            .count();
        let confidence = self.confidence(profile, trend, missing);

        debug!(
            "Valuation for player {} / team {}: {:.3} (confidence {:.2}, {} inputs missing)",
            profile.player_id, context.team_id, composite, confidence, missing
        );

        Valuation {
            player_id: profile.player_id,
            team_id: context.team_id,
            composite_score: composite,
            rationale,
            confidence,
            trend,
            components,
            source: ValuationSource::Heuristic,
        }
    }

    fn trend_component(&self, profile: &PlayerProfile, trend: Trend) -> Component {
        if profile.recent_points.is_empty() {
            return Component::neutral();
        }
        let level = mean(&profile.recent_points) / self.config.production_ceiling;
        let multiplier = match trend {
            Trend::Rising => 1.15,
            Trend::Stable => 1.0,
            Trend::Falling => 0.85,
        };
        Component::known(level * multiplier)
    }

    fn opportunity_component(&self, profile: &PlayerProfile) -> Component {
        let Some(snaps) = profile.snap_percentage else {
            return Component::neutral();
        };
        let share = snaps / 100.0;
        match profile.eligibility {
            Eligibility::Injured => Component::known(share * 0.5),
            _ => Component::known(share),
        }
    }

    fn breakout_component(&self, profile: &PlayerProfile, trend: Trend) -> Component {
        if profile.age.is_none() && profile.draft_round.is_none() {
            return Component::neutral();
        }

        let age = match profile.age {
            Some(age) if age <= 25 => 1.0,
            Some(_) => 0.5,
            None => NEUTRAL,
        };
        let opportunity_increase = match profile.snap_percentage {
            Some(snaps) if snaps > 70.0 => 0.8,
            Some(_) => 0.4,
            None => NEUTRAL,
        };
        let efficiency = if trend == Trend::Rising { 0.9 } else { 0.3 };
        let talent = match profile.draft_round {
            Some(round) if round <= 3 => 0.8,
            Some(_) => 0.3,
            None => NEUTRAL,
        };

        let indicators =
            [age, opportunity_increase, efficiency, talent, SITUATION_INDICATOR, HISTORY_INDICATOR];
        let weighted: f64 = indicators.iter().zip(BREAKOUT_WEIGHTS).map(|(i, w)| i * w).sum();
        Component::known(weighted / BREAKOUT_WEIGHTS.iter().sum::<f64>())
    }

    fn positional_need_component(&self, profile: &PlayerProfile, context: &TeamContext) -> Component {
        let Some(&required) = context.starters_required.get(&profile.position) else {
            return Component::neutral();
        };
        let rostered = context.rostered.get(&profile.position).copied().unwrap_or(0);

        let depth = if required == 0 {
            0.0
        } else if rostered < required {
            0.75 + 0.25 * (required - rostered) as f64 / required as f64
        } else {
            // One backup is still worth something; more is not
            let surplus = (rostered - required) as f64;
            (0.5 - 0.2 * surplus).max(0.0)
        };

        match context.available_at_position.get(&profile.position) {
            Some(&available) => {
                let scarcity = 1.0 - available as f64 / self.config.scarcity_pool_size as f64;
                Component::known(0.7 * depth + 0.3 * clip(scarcity))
            }
            None => Component::known(depth),
        }
    }

    fn confidence(&self, profile: &PlayerProfile, trend: Trend, missing: usize) -> f64 {
        let consistency = consistency(&profile.recent_points);
        let recency = (profile.recent_points.len() as f64 / 5.0).min(1.0);
        let trend_boost = match trend {
            Trend::Rising => 0.1,
            Trend::Stable => 0.0,
            Trend::Falling => -0.1,
        };
        let base = 0.5 * consistency + 0.3 * recency + 0.2 * (0.5 + trend_boost);
        clip(base - self.config.missing_input_penalty * missing as f64)
    }
}

impl Default for ValuationEngine {
    fn default() -> Self {
        Self::new(ValuationConfig::default())
    }
}

/// 1 minus the coefficient of variation, within [0, 1]
fn consistency(points: &[f64]) -> f64 {
    if points.len() < 2 {
        return NEUTRAL;
    }
    let avg = mean(points);
    let variance = points.iter().map(|p| (p - avg).powi(2)).sum::<f64>() / points.len() as f64;
    let denominator = if avg == 0.0 { 1.0 } else { avg.abs() };
    1.0 - (variance.sqrt() / denominator).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_core::Position;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn full_profile() -> PlayerProfile {
        PlayerProfile {
            player_id: 42,
            position: Position::WR,
            recent_points: vec![18.0, 16.0, 9.0, 8.0, 7.0],
            snap_percentage: Some(82.0),
            age: Some(23),
            draft_round: Some(2),
            eligibility: Eligibility::Active,
        }
    }

    fn needy_team() -> TeamContext {
        TeamContext {
            team_id: 7,
            rostered: BTreeMap::from([(Position::WR, 1)]),
            starters_required: BTreeMap::from([(Position::WR, 3)]),
            available_at_position: BTreeMap::from([(Position::WR, 20)]),
            remaining_budget: Some(60),
        }
    }

    #[test]
    fn test_full_inputs_score_high() {
        let engine = ValuationEngine::default();
        let valuation = engine.score(&full_profile(), &needy_team());

        assert_eq!(valuation.trend, Trend::Rising);
        assert_eq!(valuation.source, ValuationSource::Heuristic);
        assert!(valuation.composite_score > 0.7, "{}", valuation.composite_score);
        assert!(valuation.components.positional_need > 0.8);
        assert!(valuation.rationale.iter().any(|r| r.contains("thin at WR")));
    }

    #[test]
    fn test_missing_inputs_degrade_to_neutral() {
        let engine = ValuationEngine::default();
        let full = engine.score(&full_profile(), &needy_team());
        let bare = engine.score(&PlayerProfile::bare(42, Position::WR), &TeamContext::default());

        assert_eq!(bare.components.trend, 0.5);
        assert_eq!(bare.components.opportunity, 0.5);
        assert_eq!(bare.components.breakout, 0.5);
        assert_eq!(bare.components.positional_need, 0.5);
        assert!((bare.composite_score - 0.5).abs() < 1e-9);
        assert!(bare.confidence < full.confidence);
        assert_eq!(bare.rationale.len(), 4);
    }

    #[test]
    fn test_injury_discounts_opportunity() {
        let engine = ValuationEngine::default();
        let mut injured = full_profile();
        injured.eligibility = Eligibility::Injured;

        let healthy = engine.score(&full_profile(), &needy_team());
        let hurt = engine.score(&injured, &needy_team());
        assert!(hurt.components.opportunity < healthy.components.opportunity);
        assert!(hurt.rationale.iter().any(|r| r.contains("injured")));
    }

    #[test]
    fn test_deep_position_lowers_need() {
        let engine = ValuationEngine::default();
        let mut deep = needy_team();
        deep.rostered.insert(Position::WR, 6);
        let valuation = engine.score(&full_profile(), &deep);
        assert!(valuation.components.positional_need < 0.3);
    }

    #[test]
    fn test_weights_steer_composite() {
        let mut config = ValuationConfig::default();
        config.weights.trend = 0.0;
        config.weights.opportunity = 0.0;
        config.weights.breakout = 0.0;
        config.weights.positional_need = 1.0;

        let valuation = ValuationEngine::new(config).score(&full_profile(), &needy_team());
        assert!((valuation.composite_score - valuation.components.positional_need).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_scores_stay_in_unit_interval(
            points in proptest::collection::vec(-5.0f64..60.0, 0..8),
            snaps in proptest::option::of(0.0f64..100.0),
            age in proptest::option::of(20u8..40),
            rostered in 0u32..8,
            required in 0u32..4,
        ) {
            let profile = PlayerProfile {
                player_id: 1,
                position: Position::RB,
                recent_points: points,
                snap_percentage: snaps,
                age,
                draft_round: None,
                eligibility: Eligibility::Active,
            };
            let context = TeamContext {
                team_id: 1,
                rostered: BTreeMap::from([(Position::RB, rostered)]),
                starters_required: BTreeMap::from([(Position::RB, required)]),
                ..TeamContext::default()
            };
            let valuation = ValuationEngine::default().score(&profile, &context);
            prop_assert!((0.0..=1.0).contains(&valuation.composite_score));
            prop_assert!((0.0..=1.0).contains(&valuation.confidence));
        }
    }
}
