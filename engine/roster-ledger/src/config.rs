use serde::{Deserialize, Serialize};

/// Configuration for the roster ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Apply per-position caps from league settings
    pub enforce_position_limits: bool,

    /// Log every rejected request at info level
    pub log_rejections: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { enforce_position_limits: true, log_rejections: true }
    }
}
