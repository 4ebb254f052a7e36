//! Settlement Processor
//!
//! Queues waiver claims per league and settles them in batches against the
//! roster ledger. Within a batch, claims on the same player are ordered by
//! bid (highest first, FAAB leagues only), then the league's tiebreaker
//! over waiver priority and submission time. The first ledger success
//! wins. FAAB and rolling leagues move the winner to the back of the
//! waiver order; reverse-order leagues rank teams by recorded standings,
//! worst first.
//!
//! Batches for one league never overlap. A batch interrupted by a crash or
//! a storage failure stays open and is finished by the next
//! [`SettlementProcessor::run_batch`] call; running a cutoff that was
//! already settled returns the recorded outcomes unchanged.

pub mod claims;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ordering;
pub mod priority;
pub mod processor;
pub mod report;

pub use claims::{SettlementBatch, WaiverClaim};
pub use config::SettlementConfig;
pub use error::{Result, SettlementError};
pub use metrics::{SettlementMetrics, SettlementMetricsSnapshot};
pub use ordering::{sort_candidates, CandidateKey, CandidateOrder};
pub use priority::WaiverPriority;
pub use processor::{SettlementProcessor, Withdrawal};
pub use report::{BatchReport, BatchStats};
