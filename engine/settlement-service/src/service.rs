//! Service state management and component initialization

use anyhow::{Context, Result};
use broadcast_gateway::{BroadcastGateway, ChannelGateway, LoggingGateway};
use chrono::{DateTime, Utc};
use league_core::{
    ClaimId, ClaimSubmission, EngineMessage, LeagueId, LeagueRegistry, LeagueSeed, ReferenceData,
    RulePublication,
};
use persistence::{create_local_persistence_with_config, Journal, PersistenceBackend};
use roster_ledger::RosterLedger;
use scoring_engine::ScoreAggregator;
use settlement_processor::{BatchReport, SettlementProcessor};
use std::sync::Arc;
use tracing::{error, info, warn};
use valuation_engine::{AdvisoryService, StaticProfiles, ValuationEngine};

use crate::config::ServiceConfig;

/// What one inbound message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Stat event applied to this many leagues (duplicates excluded)
    Scored { leagues: usize },
    ClaimQueued(ClaimId),
    RulesPublished { league_id: LeagueId, version: u32 },
    StandingsRecorded { league_id: LeagueId },
    /// Refused or dropped; the reason is already logged
    Refused,
    /// Outbound message kind; nothing to do
    Ignored,
}

/// Every engine wired together over one journal
pub struct EngineServices {
    pub config: ServiceConfig,
    pub registry: Arc<LeagueRegistry>,
    pub journal: Arc<Journal>,
    pub aggregator: Arc<ScoreAggregator>,
    pub ledger: Arc<RosterLedger>,
    pub processor: Arc<SettlementProcessor>,
    pub advisory: Arc<AdvisoryService>,
}

impl EngineServices {
    /// Open local storage and reference data as configured
    pub async fn open(config: ServiceConfig, gateway: Arc<dyn BroadcastGateway>) -> Result<Self> {
        info!("Loading reference data from {:?}", config.service.seed_file);
        let registry = LeagueRegistry::load_from_file(&config.service.seed_file)
            .await
            .with_context(|| format!("Failed to load seed file {:?}", config.service.seed_file))?;

        info!("Initializing persistence backend in {:?}", config.persistence.data_dir);
        let backend = create_local_persistence_with_config(config.persistence.clone())
            .context("Failed to create persistence backend")?;

        Self::open_with(config, Arc::new(registry), Arc::new(backend), gateway).await
    }

    /// Recover every engine from the journal, then register leagues the
    /// journal has not seen yet
    pub async fn open_with(
        config: ServiceConfig,
        registry: Arc<LeagueRegistry>,
        backend: Arc<dyn PersistenceBackend>,
        gateway: Arc<dyn BroadcastGateway>,
    ) -> Result<Self> {
        let journal = Arc::new(Journal::open(backend).await.context("Failed to recover journal")?);
        let state = journal.state().await;
        let reference: Arc<dyn ReferenceData> = registry.clone();

        let aggregator = Arc::new(ScoreAggregator::new(
            config.scoring.clone(),
            Arc::clone(&reference),
            Arc::clone(&journal),
            Arc::clone(&gateway),
        ));
        aggregator.restore(&state);

        let ledger = Arc::new(RosterLedger::new(
            config.ledger.clone(),
            Arc::clone(&reference),
            Arc::clone(&journal),
        ));
        ledger.restore(&state);

        let mut advisory = AdvisoryService::new(ValuationEngine::new(config.valuation.clone()));
        if let Some(path) = &config.service.profiles_file {
            let profiles = StaticProfiles::load_from_file(path)
                .await
                .with_context(|| format!("Failed to load advisory profiles {:?}", path))?;
            info!("Loaded {} advisory profiles", profiles.len());
            advisory = advisory.with_profiles(Arc::new(profiles));
        }
        let advisory = Arc::new(advisory);

        let processor = SettlementProcessor::new(
            config.settlement.clone(),
            reference,
            Arc::clone(&journal),
            Arc::clone(&ledger),
            gateway,
        )
        .with_advisory(Arc::clone(&advisory));
        processor.restore(&state);

        let services = Self {
            config,
            registry,
            journal,
            aggregator,
            ledger,
            processor: Arc::new(processor),
            advisory,
        };

        for league_id in services.registry.league_ids() {
            if let Some(seed) = services.registry.league(league_id) {
                services.seed_league(&seed).await?;
            }
        }

        Ok(services)
    }

    async fn seed_league(&self, seed: &LeagueSeed) -> Result<()> {
        let league_id = seed.league_id();
        self.ledger
            .register_league(seed)
            .await
            .with_context(|| format!("Failed to register league {}", league_id))?;
        self.aggregator.register_league(league_id);
        self.processor.register_league(league_id, seed.initial_priority());
        if self.aggregator.rules().version_count(league_id) > 0 {
            return Ok(());
        }

        // Seeded rules cover the whole season
        let effective_from = DateTime::<Utc>::default();
        let rule = if seed.rules.is_empty() {
            let preset = seed.scoring_preset.as_deref().unwrap_or(&self.config.scoring.default_preset);
            self.aggregator.publish_preset(league_id, preset, effective_from).await
        } else {
            let publication = RulePublication { league_id, effective_from, rules: seed.rules.clone() };
            self.aggregator.publish_rules(publication).await
        }
        .with_context(|| format!("Failed to publish scoring rules for league {}", league_id))?;

        info!(
            "Registered league {} with {} teams, scoring rules v{}",
            league_id,
            seed.teams.len(),
            rule.version
        );
        Ok(())
    }

    /// Finish batches an earlier process left open
    pub async fn resume_open_batches(&self) -> Vec<BatchReport> {
        let mut reports = Vec::new();
        for (league_id, batch_id) in self.processor.open_batches().await {
            let Some(batch) = self.processor.batch(league_id, batch_id).await else {
                continue;
            };
            warn!("Resuming {} for league {} left open by a previous run", batch_id, league_id);
            match self.processor.run_batch(league_id, batch.cutoff).await {
                Ok(report) => reports.push(report),
                Err(e) => error!("Failed to resume {} for league {}: {}", batch_id, league_id, e),
            }
        }
        reports
    }

    /// Route one inbound message to its engine
    pub async fn handle(&self, message: EngineMessage) -> Result<Handled> {
        match message {
            EngineMessage::StatEvent(event) => {
                let results = self.aggregator.apply_to_all_leagues(&event).await;
                let leagues = results
                    .iter()
                    .filter(|(_, result)| matches!(result, Ok(outcome) if outcome.applied))
                    .count();
                if results.iter().any(|(_, result)| result.is_err()) && leagues == 0 {
                    return Ok(Handled::Refused);
                }
                Ok(Handled::Scored { leagues })
            }
            EngineMessage::ClaimSubmission(submission) => self.submit(submission).await,
            EngineMessage::RulePublication(publication) => {
                let league_id = publication.league_id;
                match self.aggregator.publish_rules(publication).await {
                    Ok(rule) => Ok(Handled::RulesPublished { league_id, version: rule.version }),
                    Err(e) => {
                        warn!("Rule publication for league {} refused: {}", league_id, e);
                        Ok(Handled::Refused)
                    }
                }
            }
            EngineMessage::StandingsUpdate(update) => {
                let league_id = update.league_id;
                match self.processor.record_standings(league_id, update.standings).await {
                    Ok(()) => Ok(Handled::StandingsRecorded { league_id }),
                    Err(e) if e.is_validation() => {
                        warn!("Standings for league {} refused: {}", league_id, e);
                        Ok(Handled::Refused)
                    }
                    Err(e) => Err(e).context("Standings could not be recorded"),
                }
            }
            EngineMessage::ScoreDelta(_) | EngineMessage::ClaimOutcome(_) => Ok(Handled::Ignored),
        }
    }

    async fn submit(&self, submission: ClaimSubmission) -> Result<Handled> {
        match self.processor.submit_claim(submission).await {
            Ok(claim_id) => Ok(Handled::ClaimQueued(claim_id)),
            Err(e) if e.is_validation() => {
                warn!("Claim refused: {}", e);
                Ok(Handled::Refused)
            }
            Err(e) => Err(e).context("Claim could not be recorded"),
        }
    }

    /// Settle one league up to `cutoff`
    pub async fn settle(&self, league_id: LeagueId, cutoff: DateTime<Utc>) -> Result<BatchReport> {
        self.processor
            .run_batch(league_id, cutoff)
            .await
            .with_context(|| format!("Settlement failed for league {}", league_id))
    }

    /// Settle every league; leagues run concurrently and independently
    pub async fn settle_all(&self, cutoff: DateTime<Utc>) -> Vec<(LeagueId, Result<BatchReport>)> {
        let mut tasks = Vec::new();
        for league_id in self.processor.league_ids() {
            let processor = Arc::clone(&self.processor);
            tasks.push((
                league_id,
                tokio::spawn(async move { processor.run_batch(league_id, cutoff).await }),
            ));
        }

        let mut results = Vec::new();
        for (league_id, task) in tasks {
            let result = match task.await {
                Ok(result) => result.with_context(|| format!("Settlement failed for league {}", league_id)),
                Err(e) => Err(anyhow::anyhow!("Settlement task for league {} panicked: {}", league_id, e)),
            };
            results.push((league_id, result));
        }
        results
    }

    pub async fn checkpoint(&self) -> Result<()> {
        let snapshot_id = self.journal.checkpoint().await.context("Checkpoint failed")?;
        info!("Checkpoint {} written", snapshot_id);
        Ok(())
    }

    /// Final snapshot (when configured) and backend shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.journal.close().await.context("Failed to close journal")
    }
}

/// Notification sink for `run` mode
pub fn build_gateway(config: &ServiceConfig) -> Arc<dyn BroadcastGateway> {
    match config.gateway.kind.as_str() {
        "channel" => Arc::new(ChannelGateway::new(config.gateway.channel_capacity)),
        _ => Arc::new(LoggingGateway),
    }
}
