//! Waiver settlement service
//!
//! `run` recovers every engine, resumes interrupted batches, then settles
//! on a schedule until Ctrl+C or SIGTERM. The other subcommands are one-shot
//! operator tools that print notifications as JSON lines.

use anyhow::{Context, Result};
use broadcast_gateway::JsonLinesGateway;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use settlement_service::{
    build_gateway, config, graceful_shutdown, ingest_file, initialize_logging, load_configuration,
    scheduler, setup_signal_handlers, telemetry, EngineServices,
};

#[derive(Parser)]
#[command(name = "waiver-settlement", version, about = "Fantasy scoring and waiver settlement engine")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recover, then settle on a schedule until shutdown
    Run,
    /// Apply a JSON-lines file of stat events, claims and rule publications
    Ingest { file: PathBuf },
    /// Settle one league now (or up to --cutoff)
    Settle {
        league: u32,
        #[arg(long)]
        cutoff: Option<DateTime<Utc>>,
    },
    /// Write a snapshot and compact the WAL
    Snapshot,
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_configuration(cli.config.as_deref())?;

    // Initialize logging before anything else writes
    let _log_guard = initialize_logging(&config.logging)?;
    info!("Starting waiver settlement service v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run => run(config).await,
        Command::Ingest { file } => {
            let services = open_one_shot(config).await?;
            let summary = ingest_file(&services, &file).await?;
            println!("{}", serde_json::to_string(&serde_json::json!({
                "lines": summary.lines,
                "malformed": summary.malformed,
                "statEvents": summary.scored,
                "claims": summary.claims,
                "ruleSets": summary.rules,
                "standings": summary.standings,
                "refused": summary.refused,
            }))?);
            services.shutdown().await
        }
        Command::Settle { league, cutoff } => {
            let services = open_one_shot(config).await?;
            let report = services.settle(league, cutoff.unwrap_or_else(Utc::now)).await?;
            println!("{}", serde_json::to_string(&report)?);
            services.shutdown().await
        }
        Command::Snapshot => {
            let services = open_one_shot(config).await?;
            services.checkpoint().await?;
            services.shutdown().await
        }
        Command::ShowConfig => {
            print!("{}", config::render_config(&config)?);
            Ok(())
        }
    }
}

/// Notifications go to stdout as JSON lines
async fn open_one_shot(config: settlement_service::ServiceConfig) -> Result<EngineServices> {
    let gateway = Arc::new(JsonLinesGateway::new(std::io::stdout()));
    let services = EngineServices::open(config, gateway).await?;
    services.resume_open_batches().await;
    Ok(services)
}

async fn run(config: settlement_service::ServiceConfig) -> Result<()> {
    if config.metrics.enabled {
        telemetry::install_exporter(&config.metrics)?;
    }

    let gateway = build_gateway(&config);
    let services = Arc::new(
        EngineServices::open(config, gateway)
            .await
            .context("Failed to initialize engines")?,
    );
    info!("Engines recovered; {} leagues registered", services.processor.league_ids().len());

    let resumed = services.resume_open_batches().await;
    if !resumed.is_empty() {
        info!("Resumed {} interrupted batches", resumed.len());
    }

    // Setup signal handlers for graceful shutdown
    let mut shutdown = setup_signal_handlers()?;
    info!("Signal handlers configured");

    let mut tasks = Vec::new();
    let settlement_every = services.config.service.settlement_interval_secs;
    if settlement_every > 0 {
        tasks.push((
            "Settlement scheduler",
            tokio::spawn(scheduler::run_settlement_loop(
                Arc::clone(&services),
                Duration::from_secs(settlement_every),
                shutdown.clone(),
            )),
        ));
    }
    tasks.push((
        "Checkpoint loop",
        tokio::spawn(scheduler::run_checkpoint_loop(
            Arc::clone(&services),
            Duration::from_secs(services.config.persistence.snapshot.interval_secs),
            shutdown.clone(),
        )),
    ));
    if services.config.metrics.enabled {
        tasks.push((
            "Metrics publisher",
            tokio::spawn(telemetry::run_metrics_loop(
                Arc::clone(&services),
                Duration::from_millis(services.config.metrics.interval_ms.max(100)),
                shutdown.clone(),
            )),
        ));
    }

    // Wait for shutdown signal
    info!("Waiver settlement service is running. Press Ctrl+C to shutdown gracefully.");
    if shutdown.changed().await.is_err() {
        error!("Signal handlers dropped; shutting down");
    }

    graceful_shutdown(services, tasks).await?;
    info!("Waiver settlement service shutdown complete");
    Ok(())
}
