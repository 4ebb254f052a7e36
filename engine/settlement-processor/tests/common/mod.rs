#![allow(dead_code)]

use broadcast_gateway::{BroadcastGateway, RecordingGateway};
use chrono::{DateTime, TimeZone, Utc};
use league_core::{
    ClaimId, ClaimSubmission, LeagueId, LeagueRegistry, LeagueSeed, LeagueSettings, Player,
    PlayerId, Position, ReferenceData, TeamId, TeamSeed, Tiebreaker, WaiverType,
};
use persistence::{InMemoryPersistence, Journal};
use roster_ledger::{LedgerConfig, RosterLedger};
use settlement_processor::{SettlementConfig, SettlementProcessor};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const LEAGUE: LeagueId = 1;

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 17, hour, minute, 0).unwrap()
}

pub fn registry() -> Arc<LeagueRegistry> {
    let registry = LeagueRegistry::new();
    for (player_id, position) in [
        (1, Position::QB),
        (2, Position::RB),
        (3, Position::WR),
        (4, Position::TE),
        (5, Position::RB),
        (6, Position::WR),
        (30, Position::RB),
        (31, Position::WR),
        (32, Position::TE),
    ] {
        registry.add_player(Player {
            player_id,
            name: format!("Player {player_id}"),
            position,
            nfl_team: "BUF".into(),
            eligibility: Default::default(),
        });
    }
    Arc::new(registry)
}

/// Three teams with two players each, roster limit 3 and $100 apiece
pub fn seed() -> LeagueSeed {
    LeagueSeed {
        settings: LeagueSettings {
            league_id: LEAGUE,
            season: 2025,
            roster_limit: 3,
            position_limits: BTreeMap::new(),
            faab_budget: 100,
            min_bid: 0,
            waiver_type: WaiverType::Faab,
            tiebreaker: Tiebreaker::Priority,
        },
        teams: vec![
            TeamSeed { team_id: 10, roster: vec![1, 2] },
            TeamSeed { team_id: 20, roster: vec![3, 4] },
            TeamSeed { team_id: 30, roster: vec![5, 6] },
        ],
        priority: vec![10, 20, 30],
        scoring_preset: None,
        rules: vec![],
    }
}

pub fn seed_with(waiver_type: WaiverType, tiebreaker: Tiebreaker) -> LeagueSeed {
    let mut seed = seed();
    seed.settings.waiver_type = waiver_type;
    seed.settings.tiebreaker = tiebreaker;
    seed
}

pub struct Harness {
    pub storage: InMemoryPersistence,
    pub journal: Arc<Journal>,
    pub ledger: Arc<RosterLedger>,
    pub processor: Arc<SettlementProcessor>,
    pub gateway: RecordingGateway,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_seed(seed()).await
    }

    pub async fn with_seed(seed: LeagueSeed) -> Self {
        let harness = Self::open(InMemoryPersistence::with_default_config()).await;
        harness.ledger.register_league(&seed).await.unwrap();
        harness.processor.register_league(LEAGUE, seed.initial_priority());
        harness
    }

    /// Fresh engines over existing storage, as after a process restart
    pub async fn open(storage: InMemoryPersistence) -> Self {
        let gateway = RecordingGateway::new();
        Self::open_with(storage, gateway.clone(), Arc::new(gateway)).await
    }

    /// Like [`Harness::open`], publishing through `sink` instead of the recorder
    pub async fn open_with(
        storage: InMemoryPersistence,
        gateway: RecordingGateway,
        sink: Arc<dyn BroadcastGateway>,
    ) -> Self {
        let reference: Arc<dyn ReferenceData> = registry();
        let journal = Arc::new(Journal::open(Arc::new(storage.clone())).await.unwrap());
        let state = journal.state().await;

        let ledger = Arc::new(RosterLedger::new(
            LedgerConfig::default(),
            Arc::clone(&reference),
            Arc::clone(&journal),
        ));
        ledger.restore(&state);

        let processor = SettlementProcessor::new(
            SettlementConfig::default(),
            reference,
            Arc::clone(&journal),
            Arc::clone(&ledger),
            sink,
        );
        processor.restore(&state);
        let processor = Arc::new(processor);

        Self { storage, journal, ledger, processor, gateway }
    }

    pub async fn restart(self) -> Self {
        self.storage.faults().heal();
        Self::open(self.storage.clone()).await
    }

    pub async fn claim(
        &self,
        team_id: TeamId,
        player: PlayerId,
        drop: Option<PlayerId>,
        bid: u32,
        submitted_at: DateTime<Utc>,
    ) -> ClaimId {
        self.processor
            .submit_claim(ClaimSubmission {
                league_id: LEAGUE,
                team_id,
                target_player_id: player,
                drop_player_id: drop,
                bid_amount: bid,
                submitted_at,
            })
            .await
            .unwrap()
    }

    pub async fn remaining(&self, team_id: TeamId) -> u32 {
        self.ledger.budget(LEAGUE, team_id).await.unwrap().remaining()
    }

    pub async fn roster(&self, team_id: TeamId) -> Vec<PlayerId> {
        let mut roster = self.ledger.roster(LEAGUE, team_id).await.unwrap();
        roster.sort_unstable();
        roster
    }
}
