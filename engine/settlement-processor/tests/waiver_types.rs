mod common;

use common::{at, seed_with, Harness, LEAGUE};
use league_core::{ClaimStatus, ClaimSubmission, RejectionReason, Tiebreaker, WaiverType};
use settlement_processor::SettlementError;

#[tokio::test]
async fn test_rolling_waivers_award_by_priority_for_free() {
    let h = Harness::with_seed(seed_with(WaiverType::Rolling, Tiebreaker::Priority)).await;
    let first = h.claim(30, 30, None, 0, at(8, 0)).await;
    let second = h.claim(10, 30, None, 0, at(8, 30)).await;

    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();

    let winner = report.outcome(second).unwrap();
    assert_eq!(winner.status, ClaimStatus::Accepted);
    assert_eq!(winner.cost_charged, Some(0));
    assert_eq!(report.outcome(first).unwrap().reason, Some(RejectionReason::PlayerUnavailable));
    assert_eq!(h.remaining(10).await, 100);
    assert_eq!(h.processor.priority(LEAGUE).await.unwrap().order(), &[20, 30, 10]);
}

#[tokio::test]
async fn test_rolling_waivers_refuse_bids() {
    let h = Harness::with_seed(seed_with(WaiverType::Rolling, Tiebreaker::Priority)).await;
    let result = h
        .processor
        .submit_claim(ClaimSubmission {
            league_id: LEAGUE,
            team_id: 10,
            target_player_id: 30,
            drop_player_id: None,
            bid_amount: 5,
            submitted_at: at(8, 0),
        })
        .await;
    assert!(matches!(result, Err(SettlementError::BidOutOfRange { bid: 5, max: 0, .. })));
    assert!(h.processor.claims(LEAGUE).await.is_empty());
}

#[tokio::test]
async fn test_reverse_waivers_favor_worst_standing_without_rotating() {
    let h = Harness::with_seed(seed_with(WaiverType::Reverse, Tiebreaker::Priority)).await;
    // Team 10 leads the league, team 20 is last
    h.processor.record_standings(LEAGUE, vec![10, 30, 20]).await.unwrap();

    let leader = h.claim(10, 30, None, 0, at(8, 0)).await;
    let last = h.claim(20, 30, None, 0, at(8, 10)).await;
    let middle = h.claim(30, 31, None, 0, at(8, 20)).await;

    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    assert_eq!(report.outcome(last).unwrap().status, ClaimStatus::Accepted);
    assert_eq!(report.outcome(leader).unwrap().status, ClaimStatus::Rejected);
    assert_eq!(report.outcome(middle).unwrap().status, ClaimStatus::Accepted);

    let priority = h.processor.priority(LEAGUE).await.unwrap();
    assert_eq!(priority.order(), &[10, 20, 30]);
    assert_eq!(priority.version(), 0);
}

#[tokio::test]
async fn test_reverse_waivers_without_standings_use_priority_order() {
    let h = Harness::with_seed(seed_with(WaiverType::Reverse, Tiebreaker::Priority)).await;
    let third = h.claim(30, 30, None, 0, at(8, 0)).await;
    let first = h.claim(10, 30, None, 0, at(8, 10)).await;

    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    assert_eq!(report.outcome(first).unwrap().status, ClaimStatus::Accepted);
    assert_eq!(report.outcome(third).unwrap().status, ClaimStatus::Rejected);
}

#[tokio::test]
async fn test_bid_time_tiebreaker_rewards_earlier_equal_bid() {
    let h = Harness::with_seed(seed_with(WaiverType::Faab, Tiebreaker::BidTime)).await;
    let better_priority = h.claim(10, 30, None, 20, at(8, 30)).await;
    let earlier = h.claim(30, 30, None, 20, at(8, 0)).await;
    let outbid = h.claim(20, 30, None, 19, at(7, 0)).await;

    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    assert_eq!(report.outcome(earlier).unwrap().status, ClaimStatus::Accepted);
    assert_eq!(report.outcome(better_priority).unwrap().status, ClaimStatus::Rejected);
    assert_eq!(report.outcome(outbid).unwrap().status, ClaimStatus::Rejected);

    let ordered: Vec<_> = report.outcomes.iter().map(|o| o.claim_id).collect();
    assert_eq!(ordered, vec![earlier, better_priority, outbid]);
    assert_eq!(h.remaining(30).await, 80);
}

#[tokio::test]
async fn test_standings_survive_restart() {
    let h = Harness::with_seed(seed_with(WaiverType::Reverse, Tiebreaker::Priority)).await;
    h.processor.record_standings(LEAGUE, vec![20, 10, 30]).await.unwrap();

    let h = h.restart().await;
    assert_eq!(h.processor.standings(LEAGUE).await, vec![20, 10, 30]);

    let winner = h.claim(30, 31, None, 0, at(8, 0)).await;
    let loser = h.claim(20, 31, None, 0, at(7, 0)).await;
    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    assert_eq!(report.outcome(winner).unwrap().status, ClaimStatus::Accepted);
    assert_eq!(report.outcome(loser).unwrap().status, ClaimStatus::Rejected);
}
