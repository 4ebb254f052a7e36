//! Signal handling for graceful shutdown

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::service::EngineServices;

/// Flips to `true` on Ctrl+C or SIGTERM
pub fn setup_signal_handlers() -> Result<watch::Receiver<bool>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Handle Ctrl+C (SIGINT)
    {
        let shutdown_tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C signal: {}", e);
                return;
            }

            info!("Ctrl+C signal received");
            let _ = shutdown_tx.send(true);
        });
    }

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};

        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&flag))?;

        tokio::spawn(async move {
            // Poll for signal
            loop {
                if flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.send(true);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });
    }

    Ok(shutdown_rx)
}

/// Wait for background tasks, then close the journal with a final snapshot
pub async fn graceful_shutdown(services: Arc<EngineServices>, tasks: Vec<(&str, JoinHandle<()>)>) -> Result<()> {
    info!("Starting graceful shutdown...");

    let shutdown_timeout = Duration::from_secs(services.config.service.shutdown_timeout_secs);
    for (name, handle) in tasks {
        match timeout(shutdown_timeout, handle).await {
            Ok(Ok(())) => info!("{} stopped gracefully", name),
            Ok(Err(e)) => error!("{} task failed: {}", name, e),
            Err(_) => warn!("{} did not stop within timeout, forcing shutdown", name),
        }
    }

    services.shutdown().await?;
    info!("Graceful shutdown complete");
    Ok(())
}
