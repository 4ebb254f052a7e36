//! Periodic settlement and checkpoint loops

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::service::EngineServices;

/// Settle every league at `now` on each tick until shutdown
pub async fn run_settlement_loop(
    services: Arc<EngineServices>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately; recovery already settled
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cutoff = Utc::now();
                for (league_id, result) in services.settle_all(cutoff).await {
                    match result {
                        Ok(report) if report.batch_id.is_some() => info!(
                            "League {}: {} claims settled, {} accepted",
                            league_id, report.stats.claims, report.stats.accepted
                        ),
                        Ok(_) => {}
                        Err(e) => error!("{:#}", e),
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Settlement scheduler stopped");
}

/// Snapshot the journal on a fixed interval until shutdown
pub async fn run_checkpoint_loop(
    services: Arc<EngineServices>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = services.checkpoint().await {
                    error!("{:#}", e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
