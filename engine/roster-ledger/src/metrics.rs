use league_core::AtomicCounter;

/// Counters for ledger requests
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    pub requests: AtomicCounter,
    pub applied: AtomicCounter,
    pub already_applied: AtomicCounter,
    pub rejected: AtomicCounter,
    pub faab_spent: AtomicCounter,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LedgerMetricsSnapshot {
        LedgerMetricsSnapshot {
            requests: self.requests.get(),
            applied: self.applied.get(),
            already_applied: self.already_applied.get(),
            rejected: self.rejected.get(),
            faab_spent: self.faab_spent.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerMetricsSnapshot {
    pub requests: u64,
    pub applied: u64,
    pub already_applied: u64,
    pub rejected: u64,
    pub faab_spent: u64,
}
