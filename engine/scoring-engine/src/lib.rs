//! Scoring Engine - rule table and score aggregation
//!
//! - [`RuleBook`]: immutable, versioned scoring rules per league
//! - [`ScoreAggregator`]: idempotent application of stat events to weekly
//!   score rows, journaled before they change and broadcast after

pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rules;

pub use aggregator::{ApplyOutcome, ScoreAggregator, ScoreSnapshot, SnapshotKey};
pub use config::ScoringConfig;
pub use error::{IngestionError, RuleError};
pub use metrics::{ScoringMetrics, ScoringMetricsSnapshot};
pub use rules::{presets, RuleBook, ScoringRule};
