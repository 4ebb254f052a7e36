//! Valuation Engine
//!
//! Advisory player valuations for waiver settlement. A valuation never
//! decides a claim; it is attached to batch reports for managers and
//! operators to read.

pub mod advisory;
pub mod calculator;
pub mod config;
pub mod error;
pub mod models;

pub use advisory::{AdvisoryMetrics, AdvisoryService, ProfileSource, StaticProfiles, ValuationProvider};
pub use calculator::ValuationEngine;
pub use config::{ComponentWeights, ValuationConfig};
pub use error::AdvisoryError;
pub use models::*;
