use serde::{Deserialize, Serialize};

/// Configuration for the valuation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Weights of the four components in the composite score
    pub weights: ComponentWeights,

    /// Average weekly points that count as full production
    pub production_ceiling: f64,

    /// Confidence removed for each component computed from missing inputs
    pub missing_input_penalty: f64,

    /// Waiver-wire pool size at which a position stops being scarce
    pub scarcity_pool_size: u32,

    /// Per-call budget for an external provider
    pub provider_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentWeights {
    pub trend: f64,
    pub opportunity: f64,
    pub breakout: f64,
    pub positional_need: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self { trend: 0.35, opportunity: 0.25, breakout: 0.15, positional_need: 0.25 }
    }
}

impl ComponentWeights {
    pub fn total(&self) -> f64 {
        self.trend + self.opportunity + self.breakout + self.positional_need
    }

    fn is_valid(&self) -> bool {
        let all = [self.trend, self.opportunity, self.breakout, self.positional_need];
        all.iter().all(|w| w.is_finite() && *w >= 0.0) && self.total() > 0.0
    }
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            weights: ComponentWeights::default(),
            production_ceiling: 20.0,
            missing_input_penalty: 0.1,
            scarcity_pool_size: 100,
            provider_timeout_ms: 250,
        }
    }
}

impl ValuationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.weights.is_valid() {
            return Err("valuation weights must be non-negative with a positive sum".to_string());
        }
        if !(self.production_ceiling > 0.0) {
            return Err("production_ceiling must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.missing_input_penalty) {
            return Err("missing_input_penalty must be within [0, 1]".to_string());
        }
        if self.scarcity_pool_size == 0 {
            return Err("scarcity_pool_size must be positive".to_string());
        }
        Ok(())
    }

    /// Weights to use; falls back to equal weighting when misconfigured
    pub fn effective_weights(&self) -> ComponentWeights {
        if self.weights.is_valid() {
            self.weights
        } else {
            ComponentWeights { trend: 1.0, opportunity: 1.0, breakout: 1.0, positional_need: 1.0 }
        }
    }
}
