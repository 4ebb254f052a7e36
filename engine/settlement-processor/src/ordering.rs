//! Candidate ordering within one player's claims

use chrono::{DateTime, Utc};
use league_core::{ClaimId, LeagueSettings, Tiebreaker, WaiverType};
use std::cmp::Ordering;

/// The fields that decide who gets a contested player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateKey {
    pub claim_id: ClaimId,
    pub bid_amount: u32,
    pub priority: u32,
    pub submitted_at: DateTime<Utc>,
}

/// How one league ranks claims on the same player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateOrder {
    pub waiver_type: WaiverType,
    pub tiebreaker: Tiebreaker,
}

impl CandidateOrder {
    pub fn for_league(settings: &LeagueSettings) -> Self {
        Self { waiver_type: settings.waiver_type, tiebreaker: settings.tiebreaker }
    }

    /// Higher bid first in FAAB leagues, then the league's tiebreaker
    /// (priority before submission time, or the reverse), then lower claim id
    pub fn compare(&self, a: &CandidateKey, b: &CandidateKey) -> Ordering {
        let by_bid = if self.waiver_type.uses_bids() {
            b.bid_amount.cmp(&a.bid_amount)
        } else {
            Ordering::Equal
        };
        let by_priority = a.priority.cmp(&b.priority);
        let by_time = a.submitted_at.cmp(&b.submitted_at);
        let tiebreak = match self.tiebreaker {
            Tiebreaker::Priority => by_priority.then(by_time),
            Tiebreaker::BidTime => by_time.then(by_priority),
        };
        by_bid.then(tiebreak).then(a.claim_id.cmp(&b.claim_id))
    }
}

/// Put `items` in evaluation order
pub fn sort_candidates<T>(order: CandidateOrder, items: &mut [T], key: impl Fn(&T) -> CandidateKey) {
    items.sort_by(|a, b| order.compare(&key(a), &key(b)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn key(id: u64, bid: u32, priority: u32, minute: u32) -> CandidateKey {
        CandidateKey {
            claim_id: ClaimId(id),
            bid_amount: bid,
            priority,
            submitted_at: Utc.with_ymd_and_hms(2025, 10, 1, 12, minute, 0).unwrap(),
        }
    }

    fn ids(order: CandidateOrder, mut candidates: Vec<CandidateKey>) -> Vec<u64> {
        sort_candidates(order, &mut candidates, |k| *k);
        candidates.iter().map(|c| c.claim_id.0).collect()
    }

    #[test]
    fn test_bid_beats_priority() {
        let candidates = vec![key(1, 10, 1, 0), key(2, 11, 5, 30)];
        assert_eq!(ids(CandidateOrder::default(), candidates), vec![2, 1]);
    }

    #[test]
    fn test_equal_bids_fall_back_to_priority_then_time() {
        let candidates = vec![key(1, 20, 2, 0), key(2, 20, 1, 59), key(3, 20, 2, 0), key(4, 20, 2, 1)];
        assert_eq!(ids(CandidateOrder::default(), candidates), vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_bid_time_tiebreaker_prefers_earlier_claim() {
        let order = CandidateOrder { waiver_type: WaiverType::Faab, tiebreaker: Tiebreaker::BidTime };
        let candidates = vec![key(1, 20, 1, 30), key(2, 20, 3, 5), key(3, 25, 2, 59)];
        assert_eq!(ids(order, candidates), vec![3, 2, 1]);
    }

    #[test]
    fn test_priority_leagues_ignore_bids() {
        for waiver_type in [WaiverType::Rolling, WaiverType::Reverse] {
            let order = CandidateOrder { waiver_type, tiebreaker: Tiebreaker::Priority };
            let candidates = vec![key(1, 90, 3, 0), key(2, 0, 1, 10), key(3, 40, 2, 5)];
            assert_eq!(ids(order, candidates), vec![2, 3, 1]);
        }
    }

    proptest! {
        #[test]
        fn prop_order_is_independent_of_arrival(
            raw in proptest::collection::vec((0u32..5, 1u32..4, 0u32..3), 1..12)
        ) {
            let keys: Vec<CandidateKey> = raw
                .iter()
                .enumerate()
                .map(|(i, (bid, priority, minute))| key(i as u64, *bid, *priority, *minute))
                .collect();

            let order = CandidateOrder::default();
            let mut forward = keys.clone();
            let mut backward: Vec<CandidateKey> = keys.into_iter().rev().collect();
            sort_candidates(order, &mut forward, |k| *k);
            sort_candidates(order, &mut backward, |k| *k);
            prop_assert_eq!(&forward, &backward);

            for pair in forward.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.bid_amount >= b.bid_amount);
                if a.bid_amount == b.bid_amount {
                    prop_assert!(a.priority <= b.priority);
                    if a.priority == b.priority {
                        prop_assert!(a.submitted_at <= b.submitted_at);
                    }
                }
            }
        }
    }
}
