//! Service configuration management
//!
//! Defaults, then an optional TOML file, then `WAIVER__`-prefixed
//! environment variables (`WAIVER__LOGGING__LEVEL=debug`,
//! `WAIVER__SETTLEMENT__CHECKPOINT_AFTER_BATCH=true`).

use anyhow::{Context, Result};
use persistence::PersistenceConfig;
use roster_ledger::LedgerConfig;
use scoring_engine::ScoringConfig;
use serde::{Deserialize, Serialize};
use settlement_processor::SettlementConfig;
use std::path::{Path, PathBuf};
use valuation_engine::ValuationConfig;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Where notifications go in `run` mode
    pub gateway: GatewaySettings,

    /// Persistence configuration
    pub persistence: PersistenceConfig,

    pub scoring: ScoringConfig,
    pub ledger: LedgerConfig,
    pub valuation: ValuationConfig,
    pub settlement: SettlementConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Players, games and leagues
    pub seed_file: PathBuf,

    /// Optional advisory profiles (recent points, snap share, age)
    pub profiles_file: Option<PathBuf>,

    /// Seconds between scheduled settlement passes; 0 disables the scheduler
    pub settlement_interval_secs: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,

    /// Directory for daily-rotated log files (if None, logs to stdout only)
    pub directory: Option<PathBuf>,

    /// File name prefix inside `directory`
    pub file_prefix: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,

    /// Prometheus scrape port
    pub port: u16,

    /// How often engine counters are copied into the exporter
    pub interval_ms: u64,
}

/// Notification fan-out in `run` mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// `logging` or `channel`
    pub kind: String,

    /// Buffered notifications per channel subscriber
    pub channel_capacity: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            seed_file: PathBuf::from("./data/seed.json"),
            profiles_file: None,
            settlement_interval_secs: 3600,
            shutdown_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
            file_prefix: "waiver-settlement.log".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, port: 9090, interval_ms: 1000 }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self { kind: "logging".to_string(), channel_capacity: 1024 }
    }
}

/// Load configuration from an optional file and the environment
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: ServiceConfig = builder
        .add_source(config::Environment::with_prefix("WAIVER").separator("__"))
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    match config.gateway.kind.as_str() {
        "logging" | "channel" => {}
        _ => return Err(anyhow::anyhow!("Invalid gateway kind: {}", config.gateway.kind)),
    }

    // Validate metrics port
    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    config.persistence.validate().map_err(|e| anyhow::anyhow!("Invalid persistence config: {}", e))?;
    config
        .valuation
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid valuation config: {}", e))?;

    Ok(())
}

/// Effective configuration rendered as TOML
pub fn render_config(config: &ServiceConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        validate_config(&config).unwrap();
        assert_eq!(config.logging.format, "pretty");
        assert!(config.settlement.attach_valuations);
    }

    #[test]
    fn test_file_overrides_nested_sections() {
        let file = write_toml(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [service]
            settlement_interval_secs = 0

            [persistence]
            data_dir = "/var/lib/waiver"

            [persistence.snapshot]
            compress = false

            [settlement]
            checkpoint_after_batch = true
            "#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.service.settlement_interval_secs, 0);
        assert_eq!(config.persistence.data_dir, PathBuf::from("/var/lib/waiver"));
        assert!(!config.persistence.snapshot.compress);
        assert!(config.settlement.checkpoint_after_batch);
        // Untouched sections keep their defaults
        assert_eq!(config.metrics.port, 9090);
        assert!(config.ledger.enforce_position_limits);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_toml("[logging]\nformat = \"xml\"\n");
        assert!(load_config(Some(file.path())).is_err());

        let mut config = ServiceConfig::default();
        config.gateway.kind = "carrier-pigeon".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_environment_overrides_engine_sections() {
        std::env::set_var("WAIVER__SCORING__DEFAULT_PRESET", "ppr");
        std::env::set_var("WAIVER__LEDGER__LOG_REJECTIONS", "false");
        let config = load_config(None);
        std::env::remove_var("WAIVER__SCORING__DEFAULT_PRESET");
        std::env::remove_var("WAIVER__LEDGER__LOG_REJECTIONS");

        let config = config.unwrap();
        assert_eq!(config.scoring.default_preset, "ppr");
        assert!(!config.ledger.log_rejections);
        assert!(config.ledger.enforce_position_limits);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/waiver.toml"))).is_err());
    }

    #[test]
    fn test_render_round_trips_through_toml() {
        let rendered = render_config(&ServiceConfig::default()).unwrap();
        let parsed: ServiceConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.service.seed_file, PathBuf::from("./data/seed.json"));
        assert_eq!(parsed.settlement, SettlementConfig::default());
    }
}
