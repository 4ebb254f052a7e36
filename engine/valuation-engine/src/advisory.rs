//! Advisory valuation service
//!
//! Wraps an optional external [`ValuationProvider`] with a timeout. Any
//! provider failure degrades to the local heuristic so callers always get
//! a valuation.

use crate::calculator::ValuationEngine;
use crate::error::AdvisoryError;
use crate::models::{clip, PlayerProfile, TeamContext, Valuation, ValuationSource};
use league_core::{AtomicCounter, PlayerId, Position};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// External valuation source (model-backed or remote)
#[async_trait::async_trait]
pub trait ValuationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn valuate(
        &self,
        profile: &PlayerProfile,
        context: &TeamContext,
    ) -> Result<Valuation, AdvisoryError>;
}

/// Where player profiles come from
pub trait ProfileSource: Send + Sync {
    fn profile(&self, player_id: PlayerId) -> Option<PlayerProfile>;
}

/// Profiles held in memory, optionally loaded from a JSON array
#[derive(Default)]
pub struct StaticProfiles {
    profiles: RwLock<BTreeMap<PlayerId, PlayerProfile>>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AdvisoryError> {
        let content = tokio::fs::read_to_string(&path).await?;
        let profiles: Vec<PlayerProfile> = serde_json::from_str(&content)?;
        info!("Loaded {} player profiles from {:?}", profiles.len(), path.as_ref());

        let source = Self::new();
        for profile in profiles {
            source.insert(profile);
        }
        Ok(source)
    }

    pub fn insert(&self, profile: PlayerProfile) {
        self.profiles.write().insert(profile.player_id, profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl ProfileSource for StaticProfiles {
    fn profile(&self, player_id: PlayerId) -> Option<PlayerProfile> {
        self.profiles.read().get(&player_id).cloned()
    }
}

#[derive(Debug, Default)]
pub struct AdvisoryMetrics {
    pub assessments: AtomicCounter,
    pub provider_successes: AtomicCounter,
    pub provider_failures: AtomicCounter,
    pub provider_timeouts: AtomicCounter,
}

pub struct AdvisoryService {
    engine: ValuationEngine,
    provider: Option<Arc<dyn ValuationProvider>>,
    profiles: Option<Arc<dyn ProfileSource>>,
    timeout: Duration,
    metrics: AdvisoryMetrics,
}

impl AdvisoryService {
    /// Heuristic-only service
    pub fn new(engine: ValuationEngine) -> Self {
        let timeout = Duration::from_millis(engine.config().provider_timeout_ms);
        Self { engine, provider: None, profiles: None, timeout, metrics: AdvisoryMetrics::default() }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ValuationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileSource>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn metrics(&self) -> &AdvisoryMetrics {
        &self.metrics
    }

    /// Known profile for the player, or a bare one
    pub fn profile_for(&self, player_id: PlayerId, position: Position) -> PlayerProfile {
        self.profiles
            .as_ref()
            .and_then(|p| p.profile(player_id))
            .unwrap_or_else(|| PlayerProfile::bare(player_id, position))
    }

    /// Valuation from the provider when it answers in time, else the heuristic
    pub async fn assess(&self, profile: &PlayerProfile, context: &TeamContext) -> Valuation {
        self.metrics.assessments.inc();

        let Some(provider) = &self.provider else {
            return self.engine.score(profile, context);
        };

        let outcome = match tokio::time::timeout(self.timeout, provider.valuate(profile, context)).await
        {
            Ok(result) => result,
            Err(_) => {
                self.metrics.provider_timeouts.inc();
                Err(AdvisoryError::Timeout { millis: self.timeout.as_millis() as u64 })
            }
        };

        match outcome.and_then(sanitize) {
            Ok(mut valuation) => {
                self.metrics.provider_successes.inc();
                valuation.source = ValuationSource::Provider;
                valuation
            }
            Err(e) => {
                self.metrics.provider_failures.inc();
                warn!(
                    "Valuation provider {} failed for player {}: {}; using heuristic",
                    provider.name(),
                    profile.player_id,
                    e
                );
                let mut valuation = self.engine.score(profile, context);
                valuation.rationale.push(format!("Advisory provider unavailable ({e})"));
                valuation
            }
        }
    }
}

fn sanitize(mut valuation: Valuation) -> Result<Valuation, AdvisoryError> {
    if !valuation.composite_score.is_finite() || !valuation.confidence.is_finite() {
        return Err(AdvisoryError::InvalidResponse("non-finite score".to_string()));
    }
    valuation.composite_score = clip(valuation.composite_score);
    valuation.confidence = clip(valuation.confidence);
    Ok(valuation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Trend, ValuationComponents};

    struct FixedProvider {
        score: f64,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ValuationProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn valuate(
            &self,
            profile: &PlayerProfile,
            context: &TeamContext,
        ) -> Result<Valuation, AdvisoryError> {
            tokio::time::sleep(self.delay).await;
            Ok(Valuation {
                player_id: profile.player_id,
                team_id: context.team_id,
                composite_score: self.score,
                rationale: vec!["model says so".to_string()],
                confidence: 0.9,
                trend: Trend::Stable,
                components: ValuationComponents {
                    trend: 0.5,
                    opportunity: 0.5,
                    breakout: 0.5,
                    positional_need: 0.5,
                },
                source: ValuationSource::Heuristic,
            })
        }
    }

    struct BrokenProvider;

    #[async_trait::async_trait]
    impl ValuationProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn valuate(&self, _: &PlayerProfile, _: &TeamContext) -> Result<Valuation, AdvisoryError> {
            Err(AdvisoryError::Unavailable("connection refused".to_string()))
        }
    }

    fn profile() -> PlayerProfile {
        PlayerProfile::bare(9, Position::TE)
    }

    #[tokio::test]
    async fn test_provider_answer_is_clipped() {
        let service = AdvisoryService::new(ValuationEngine::default())
            .with_provider(Arc::new(FixedProvider { score: 1.4, delay: Duration::ZERO }));

        let valuation = service.assess(&profile(), &TeamContext::default()).await;
        assert_eq!(valuation.source, ValuationSource::Provider);
        assert_eq!(valuation.composite_score, 1.0);
        assert_eq!(service.metrics().provider_successes.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_falls_back() {
        let service = AdvisoryService::new(ValuationEngine::default())
            .with_provider(Arc::new(FixedProvider { score: 0.9, delay: Duration::from_secs(5) }));

        let valuation = service.assess(&profile(), &TeamContext::default()).await;
        assert_eq!(valuation.source, ValuationSource::Heuristic);
        assert!(valuation.rationale.last().unwrap().contains("timed out"));
        assert_eq!(service.metrics().provider_timeouts.get(), 1);
        assert_eq!(service.metrics().provider_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_failing_provider_falls_back() {
        let service =
            AdvisoryService::new(ValuationEngine::default()).with_provider(Arc::new(BrokenProvider));
        let valuation = service.assess(&profile(), &TeamContext::default()).await;
        assert_eq!(valuation.source, ValuationSource::Heuristic);
        assert!((valuation.composite_score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_profiles_fall_back_to_bare() {
        let profiles = StaticProfiles::new();
        let mut known = PlayerProfile::bare(3, Position::RB);
        known.recent_points = vec![12.0, 10.0];
        profiles.insert(known.clone());

        let service = AdvisoryService::new(ValuationEngine::default()).with_profiles(Arc::new(profiles));
        assert_eq!(service.profile_for(3, Position::RB), known);
        assert_eq!(service.profile_for(4, Position::K), PlayerProfile::bare(4, Position::K));
    }
}
