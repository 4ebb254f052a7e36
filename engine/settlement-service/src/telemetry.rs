//! Prometheus export of the engines' in-process counters

use anyhow::{Context, Result};
use metrics::{absolute_counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::MetricsConfig;
use crate::service::EngineServices;

/// Install the scrape endpoint on `0.0.0.0:port`
pub fn install_exporter(config: &MetricsConfig) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!("Prometheus metrics on port {}", config.port);
    Ok(())
}

/// Copy every engine counter into the metrics registry
pub fn publish(services: &EngineServices) {
    let scoring = services.aggregator.metrics().snapshot();
    absolute_counter!("scoring_events_received_total", scoring.events_received);
    absolute_counter!("scoring_events_applied_total", scoring.events_applied);
    absolute_counter!("scoring_events_duplicate_total", scoring.events_duplicate);
    absolute_counter!("scoring_events_dropped_total", scoring.events_dropped);
    absolute_counter!("scoring_rule_versions_total", scoring.rule_versions_published);
    gauge!("scoring_leagues_halted", scoring.leagues_halted as f64);

    let ledger = services.ledger.metrics().snapshot();
    absolute_counter!("ledger_applied_total", ledger.applied);
    absolute_counter!("ledger_rejected_total", ledger.rejected);
    absolute_counter!("ledger_requests_total", ledger.requests);
    absolute_counter!("ledger_already_applied_total", ledger.already_applied);

    let settlement = services.processor.metrics().snapshot();
    absolute_counter!("settlement_claims_submitted_total", settlement.claims_submitted);
    absolute_counter!("settlement_claims_withdrawn_total", settlement.claims_withdrawn);
    absolute_counter!("settlement_claims_accepted_total", settlement.claims_accepted);
    absolute_counter!("settlement_claims_rejected_total", settlement.claims_rejected);
    absolute_counter!("settlement_claims_invalidated_total", settlement.claims_invalidated);
    absolute_counter!("settlement_batches_resolved_total", settlement.batches_resolved);
    absolute_counter!("settlement_batches_resumed_total", settlement.batches_resumed);
    absolute_counter!("settlement_batches_failed_total", settlement.batches_failed);
    absolute_counter!("settlement_faab_spent_total", settlement.faab_spent);
    gauge!("settlement_open_batches", settlement.open_batches as f64);

    let advisory = services.advisory.metrics();
    absolute_counter!("advisory_assessments_total", advisory.assessments.get());
    absolute_counter!("advisory_provider_failures_total", advisory.provider_failures.get());
    absolute_counter!("advisory_provider_timeouts_total", advisory.provider_timeouts.get());
}

pub async fn run_metrics_loop(services: Arc<EngineServices>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => publish(&services),
            _ = shutdown.changed() => break,
        }
    }
}
