use serde::{Deserialize, Serialize};

/// Configuration for rule handling and stat ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Preset installed for seeded leagues that name neither a preset nor rules
    pub default_preset: String,

    /// Log duplicate (already applied) events at debug level
    pub log_duplicates: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { default_preset: "half_ppr".to_string(), log_duplicates: true }
    }
}
