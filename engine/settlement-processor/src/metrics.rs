use league_core::{AtomicCounter, AtomicGauge};

/// Counters for claim intake and batch settlement
#[derive(Debug, Default)]
pub struct SettlementMetrics {
    pub claims_submitted: AtomicCounter,
    pub claims_withdrawn: AtomicCounter,
    pub claims_accepted: AtomicCounter,
    pub claims_rejected: AtomicCounter,
    pub claims_invalidated: AtomicCounter,
    pub batches_resolved: AtomicCounter,
    pub batches_resumed: AtomicCounter,
    pub batches_failed: AtomicCounter,
    pub faab_spent: AtomicCounter,
    pub open_batches: AtomicGauge,
}

impl SettlementMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SettlementMetricsSnapshot {
        SettlementMetricsSnapshot {
            claims_submitted: self.claims_submitted.get(),
            claims_withdrawn: self.claims_withdrawn.get(),
            claims_accepted: self.claims_accepted.get(),
            claims_rejected: self.claims_rejected.get(),
            claims_invalidated: self.claims_invalidated.get(),
            batches_resolved: self.batches_resolved.get(),
            batches_resumed: self.batches_resumed.get(),
            batches_failed: self.batches_failed.get(),
            faab_spent: self.faab_spent.get(),
            open_batches: self.open_batches.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementMetricsSnapshot {
    pub claims_submitted: u64,
    pub claims_withdrawn: u64,
    pub claims_accepted: u64,
    pub claims_rejected: u64,
    pub claims_invalidated: u64,
    pub batches_resolved: u64,
    pub batches_resumed: u64,
    pub batches_failed: u64,
    pub faab_spent: u64,
    pub open_batches: u64,
}
