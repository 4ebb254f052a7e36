use league_core::TeamId;
use serde::{Deserialize, Serialize};

/// A team's season FAAB budget; `remaining` never exceeds `total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBudget {
    pub team_id: TeamId,
    pub season: u16,
    pub total: u32,
    remaining: u32,
}

impl TeamBudget {
    pub fn new(team_id: TeamId, season: u16, total: u32) -> Self {
        Self { team_id, season, total, remaining: total }
    }

    /// Rebuild from persisted values, clamping anything out of range
    pub fn restore(team_id: TeamId, season: u16, total: u32, remaining: u32) -> Self {
        Self { team_id, season, total, remaining: remaining.min(total) }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn spent(&self) -> u32 {
        self.total - self.remaining
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        cost <= self.remaining
    }

    /// Deduct `cost`; returns false and leaves the budget untouched if short
    pub fn charge(&mut self, cost: u32) -> bool {
        match self.remaining.checked_sub(cost) {
            Some(remaining) => {
                self.remaining = remaining;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_never_overdraws() {
        let mut budget = TeamBudget::new(1, 2025, 100);
        assert!(budget.charge(60));
        assert!(!budget.charge(41));
        assert_eq!(budget.remaining(), 40);
        assert!(budget.charge(40));
        assert_eq!(budget.remaining(), 0);
        assert_eq!(budget.spent(), 100);
    }

    #[test]
    fn test_restore_clamps() {
        let budget = TeamBudget::restore(1, 2025, 100, 250);
        assert_eq!(budget.remaining(), 100);
    }
}
