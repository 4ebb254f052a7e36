//! League Core - shared reference data and message types
//!
//! Identifiers, players, games, league settings and the tagged
//! [`EngineMessage`] enum used by every engine crate. The
//! [`LeagueRegistry`] is the read-only reference data source the scoring
//! and settlement engines consult.

pub mod error;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod types;

pub use error::{RegistryError, Result};
pub use messages::{
    ClaimOutcome, ClaimStatus, ClaimSubmission, EngineMessage, EventKind, RejectionReason,
    RulePublication, RuleSpec, ScoreDelta, StandingsUpdate, StatEvent, YardageBonus,
};
pub use metrics::{AtomicCounter, AtomicGauge};
pub use registry::{LeagueRegistry, LeagueSeed, ReferenceData, SeedData, TeamSeed};
pub use types::{
    BatchId, ClaimId, Eligibility, Game, GameId, LeagueId, LeagueSettings, Player, PlayerId,
    Position, SequenceId, TeamId, Tiebreaker, WaiverType, Week,
};
