mod common;

use common::{at, Harness, LEAGUE};
use league_core::{ClaimOutcome, TeamId};
use settlement_processor::SettlementError;

/// Writes the contested batch below makes from open to resolve
const BATCH_WRITES: u32 = 12;

async fn submit_contested(h: &Harness) {
    h.claim(10, 30, None, 15, at(8, 0)).await;
    h.claim(20, 30, None, 15, at(8, 1)).await;
    h.claim(20, 31, None, 5, at(8, 2)).await;
    h.claim(30, 31, Some(5), 20, at(8, 3)).await;
}

#[derive(Debug, PartialEq)]
struct Settled {
    outcomes: Vec<ClaimOutcome>,
    priority: Vec<TeamId>,
    budgets: Vec<u32>,
    rosters: Vec<Vec<u32>>,
}

async fn settled(h: &Harness, outcomes: Vec<ClaimOutcome>) -> Settled {
    let mut budgets = Vec::new();
    let mut rosters = Vec::new();
    for team in [10, 20, 30] {
        budgets.push(h.remaining(team).await);
        rosters.push(h.roster(team).await);
    }
    Settled {
        outcomes,
        priority: h.processor.priority(LEAGUE).await.unwrap().order().to_vec(),
        budgets,
        rosters,
    }
}

async fn uninterrupted() -> Settled {
    let h = Harness::new().await;
    submit_contested(&h).await;
    let before = h.storage.wal_len().await;
    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    assert_eq!(h.storage.wal_len().await - before, BATCH_WRITES as usize);
    settled(&h, report.outcomes).await
}

#[tokio::test]
async fn test_restart_at_every_write_matches_uninterrupted_run() {
    let expected = uninterrupted().await;

    for writes in 0..=BATCH_WRITES {
        let h = Harness::new().await;
        submit_contested(&h).await;

        h.storage.faults().fail_after(writes);
        let first = h.processor.run_batch(LEAGUE, at(9, 0)).await;
        if writes < BATCH_WRITES {
            assert!(
                matches!(first, Err(SettlementError::Persistence(_)) | Err(SettlementError::Ledger(_))),
                "expected a storage failure after {writes} writes"
            );
        } else {
            assert!(first.is_ok());
        }

        let h = h.restart().await;
        let open = h.processor.open_batches().await;
        assert_eq!(open.len(), usize::from(writes > 0 && writes < BATCH_WRITES), "after {writes} writes");

        let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
        assert_eq!(report.resumed, !open.is_empty());
        assert_eq!(settled(&h, report.outcomes).await, expected, "after {writes} writes");
        assert!(h.processor.open_batches().await.is_empty());
    }
}

#[tokio::test]
async fn test_retry_in_process_after_storage_heals() {
    let expected = uninterrupted().await;

    let h = Harness::new().await;
    submit_contested(&h).await;
    h.storage.faults().fail_after(3);
    assert!(h.processor.run_batch(LEAGUE, at(9, 0)).await.is_err());
    assert_eq!(h.processor.metrics().snapshot().batches_failed, 1);
    assert_eq!(h.processor.metrics().snapshot().open_batches, 1);

    h.storage.faults().heal();
    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    assert!(report.resumed);
    assert_eq!(settled(&h, report.outcomes).await, expected);
    assert_eq!(h.processor.metrics().snapshot().open_batches, 0);
}

#[tokio::test]
async fn test_checkpointed_state_restores_settled_league() {
    let h = Harness::new().await;
    submit_contested(&h).await;
    let report = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    h.journal.checkpoint().await.unwrap();
    let expected = settled(&h, report.outcomes.clone()).await;

    let h = h.restart().await;
    assert!(h.journal.recovery().snapshot_id.is_some());
    let replay = h.processor.run_batch(LEAGUE, at(9, 0)).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(settled(&h, replay.outcomes).await, expected);
}
