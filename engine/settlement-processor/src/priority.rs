//! Waiver priority order

use league_core::TeamId;
use persistence::PriorityRecord;
use serde::{Deserialize, Serialize};

/// Ordered team list for a league; index 0 has first priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiverPriority {
    order: Vec<TeamId>,
    version: u64,
}

impl WaiverPriority {
    pub fn new(order: Vec<TeamId>) -> Self {
        Self { order, version: 0 }
    }

    /// Worst team first; `standings` lists the best team first
    pub fn from_standings(standings: &[TeamId]) -> Self {
        Self { order: standings.iter().rev().copied().collect(), version: 0 }
    }

    pub fn order(&self) -> &[TeamId] {
        &self.order
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 1-based rank; teams missing from the order rank after everyone
    pub fn rank_of(&self, team_id: TeamId) -> u32 {
        match self.order.iter().position(|t| *t == team_id) {
            Some(index) => index as u32 + 1,
            None => self.order.len() as u32 + 1,
        }
    }

    /// Order after `winner` wins a claim: the winner moves to the back and
    /// everyone else keeps their relative order
    pub fn rotated(&self, winner: TeamId) -> WaiverPriority {
        let mut order: Vec<TeamId> = self.order.iter().copied().filter(|t| *t != winner).collect();
        order.push(winner);
        WaiverPriority { order, version: self.version + 1 }
    }

    pub fn to_record(&self) -> PriorityRecord {
        PriorityRecord { order: self.order.clone(), version: self.version }
    }
}

impl From<&PriorityRecord> for WaiverPriority {
    fn from(record: &PriorityRecord) -> Self {
        Self { order: record.order.clone(), version: record.version }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rotation_moves_winner_to_back() {
        let priority = WaiverPriority::new(vec![1, 2, 3, 4]);
        let rotated = priority.rotated(2);
        assert_eq!(rotated.order(), &[1, 3, 4, 2]);
        assert_eq!(rotated.version(), 1);
        // Pure: the original is untouched
        assert_eq!(priority.order(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_standings_rank_worst_team_first() {
        let priority = WaiverPriority::from_standings(&[7, 3, 9]);
        assert_eq!(priority.order(), &[9, 3, 7]);
        assert_eq!(priority.rank_of(9), 1);
        assert_eq!(priority.rank_of(7), 3);
    }

    #[test]
    fn test_rank_of() {
        let priority = WaiverPriority::new(vec![5, 6]);
        assert_eq!(priority.rank_of(5), 1);
        assert_eq!(priority.rank_of(6), 2);
        assert_eq!(priority.rank_of(9), 3);
    }

    proptest! {
        #[test]
        fn prop_rotation_keeps_loser_order(
            order in Just((1u32..=8).collect::<Vec<_>>()).prop_shuffle(),
            pick in 0usize..8,
        ) {
            let winner = order[pick];
            let rotated = WaiverPriority::new(order.clone()).rotated(winner);

            prop_assert_eq!(rotated.order().len(), order.len());
            prop_assert_eq!(*rotated.order().last().unwrap(), winner);
            let losers: Vec<TeamId> = order.iter().copied().filter(|t| *t != winner).collect();
            prop_assert_eq!(&rotated.order()[..order.len() - 1], losers.as_slice());
        }
    }
}
