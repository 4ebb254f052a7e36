//! Roster/Budget Ledger
//!
//! Holds every team's roster and FAAB budget. [`RosterLedger::try_apply`]
//! validates an acquisition and applies it atomically per league: the
//! checks, the journal write and the in-memory mutation happen under the
//! league's lock, and nothing changes if the write fails.

pub mod budget;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;

pub use budget::TeamBudget;
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{LedgerDecision, LedgerRequest, RosterLedger};
pub use metrics::{LedgerMetrics, LedgerMetricsSnapshot};
