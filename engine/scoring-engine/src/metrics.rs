use league_core::{AtomicCounter, AtomicGauge};

/// Counters for the score aggregator
#[derive(Debug, Default)]
pub struct ScoringMetrics {
    pub events_received: AtomicCounter,
    pub events_applied: AtomicCounter,
    pub events_duplicate: AtomicCounter,
    pub events_dropped: AtomicCounter,
    pub rule_versions_published: AtomicCounter,
    pub leagues_halted: AtomicGauge,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ScoringMetricsSnapshot {
        ScoringMetricsSnapshot {
            events_received: self.events_received.get(),
            events_applied: self.events_applied.get(),
            events_duplicate: self.events_duplicate.get(),
            events_dropped: self.events_dropped.get(),
            rule_versions_published: self.rule_versions_published.get(),
            leagues_halted: self.leagues_halted.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringMetricsSnapshot {
    pub events_received: u64,
    pub events_applied: u64,
    pub events_duplicate: u64,
    pub events_dropped: u64,
    pub rule_versions_published: u64,
    pub leagues_halted: u64,
}
