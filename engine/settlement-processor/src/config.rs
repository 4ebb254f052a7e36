use league_core::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for the settlement processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Attach advisory valuations to batch reports
    pub attach_valuations: bool,

    /// Starters per position, used to judge a team's positional need
    pub starters_required: BTreeMap<Position, u32>,

    /// Snapshot the journal after every resolved batch
    pub checkpoint_after_batch: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        let starters_required = BTreeMap::from([
            (Position::QB, 1),
            (Position::RB, 2),
            (Position::WR, 2),
            (Position::TE, 1),
            (Position::K, 1),
            (Position::DEF, 1),
        ]);
        Self { attach_valuations: true, starters_required, checkpoint_after_batch: false }
    }
}
