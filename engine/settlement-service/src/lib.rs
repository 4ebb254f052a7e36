//! Waiver settlement service library
//!
//! Configuration, logging, engine wiring and recovery, JSON-lines ingestion,
//! the settlement scheduler and graceful shutdown for the
//! `waiver-settlement` binary.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod ingest;
pub mod logging;
pub mod scheduler;
pub mod service;
pub mod signals;
pub mod telemetry;

pub use config::ServiceConfig;
pub use ingest::{ingest_file, ingest_reader, IngestSummary};
pub use logging::initialize_logging;
pub use service::{build_gateway, EngineServices, Handled};
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
