use crate::error::{RegistryError, Result};
use crate::messages::RuleSpec;
use crate::types::{Eligibility, Game, GameId, LeagueId, LeagueSettings, Player, PlayerId, TeamId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Read-only view of players and games consulted by the engines
pub trait ReferenceData: Send + Sync {
    fn player(&self, player_id: PlayerId) -> Option<Player>;
    fn game(&self, game_id: GameId) -> Option<Game>;
    /// Every known player, in id order
    fn players(&self) -> Vec<Player>;
}

/// Initial roster of one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSeed {
    pub team_id: TeamId,
    #[serde(default)]
    pub roster: Vec<PlayerId>,
}

/// One league as described by the seed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSeed {
    pub settings: LeagueSettings,
    pub teams: Vec<TeamSeed>,
    /// Initial waiver order; defaults to team order
    #[serde(default)]
    pub priority: Vec<TeamId>,
    /// Named scoring preset (standard, half_ppr, ppr, te_premium)
    #[serde(default)]
    pub scoring_preset: Option<String>,
    /// Explicit rules; take precedence over the preset when non-empty
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl LeagueSeed {
    pub fn league_id(&self) -> LeagueId {
        self.settings.league_id
    }

    /// Waiver order to start from; falls back to seed team order
    pub fn initial_priority(&self) -> Vec<TeamId> {
        if self.priority.is_empty() {
            self.teams.iter().map(|t| t.team_id).collect()
        } else {
            self.priority.clone()
        }
    }
}

/// Top level of the seed file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub leagues: Vec<LeagueSeed>,
}

/// In-process reference data: players, games and league definitions
///
/// Only player eligibility changes after load; everything else is fixed
/// for the life of the process.
pub struct LeagueRegistry {
    players: RwLock<BTreeMap<PlayerId, Player>>,
    games: RwLock<BTreeMap<GameId, Game>>,
    leagues: RwLock<BTreeMap<LeagueId, LeagueSeed>>,
    team_leagues: RwLock<BTreeMap<TeamId, LeagueId>>,
}

impl LeagueRegistry {
    pub fn new() -> Self {
        Self {
            players: RwLock::new(BTreeMap::new()),
            games: RwLock::new(BTreeMap::new()),
            leagues: RwLock::new(BTreeMap::new()),
            team_leagues: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load a JSON seed file
    pub async fn load_from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        info!("Loading reference data from: {:?}", file_path.as_ref());

        let json_content = tokio::fs::read_to_string(&file_path).await?;
        let seed: SeedData = serde_json::from_str(&json_content)?;

        let registry = Self::from_seed(seed)?;
        info!(
            "Loaded {} players, {} games, {} leagues",
            registry.players.read().len(),
            registry.games.read().len(),
            registry.leagues.read().len()
        );
        Ok(registry)
    }

    pub fn from_seed(seed: SeedData) -> Result<Self> {
        let registry = Self::new();
        for player in seed.players {
            registry.add_player(player);
        }
        for game in seed.games {
            registry.add_game(game);
        }
        for league in seed.leagues {
            registry.add_league(league)?;
        }
        Ok(registry)
    }

    pub fn add_player(&self, player: Player) {
        self.players.write().insert(player.player_id, player);
    }

    pub fn add_game(&self, game: Game) {
        self.games.write().insert(game.game_id, game);
    }

    /// Register a league, validating its settings and initial rosters
    pub fn add_league(&self, league: LeagueSeed) -> Result<()> {
        let league_id = league.league_id();
        if self.leagues.read().contains_key(&league_id) {
            return Err(RegistryError::DuplicateLeague { league_id });
        }
        if league.settings.roster_limit == 0 {
            return Err(RegistryError::InvalidSettings {
                league_id,
                message: "roster_limit must be positive".to_string(),
            });
        }
        if league.settings.min_bid > league.settings.faab_budget {
            return Err(RegistryError::InvalidSettings {
                league_id,
                message: "min_bid exceeds faab_budget".to_string(),
            });
        }

        let players = self.players.read();
        let team_leagues = self.team_leagues.read();
        let mut rostered = HashSet::new();
        for team in &league.teams {
            if team_leagues.contains_key(&team.team_id) {
                return Err(RegistryError::DuplicateTeam { team_id: team.team_id });
            }
            if team.roster.len() as u32 > league.settings.roster_limit {
                return Err(RegistryError::InvalidSettings {
                    league_id,
                    message: format!("team {} starts over the roster limit", team.team_id),
                });
            }
            for player_id in &team.roster {
                if !players.contains_key(player_id) {
                    return Err(RegistryError::UnknownRosterPlayer {
                        team_id: team.team_id,
                        player_id: *player_id,
                    });
                }
                if !rostered.insert(*player_id) {
                    return Err(RegistryError::PlayerRosteredTwice {
                        league_id,
                        player_id: *player_id,
                    });
                }
            }
        }
        drop(players);
        drop(team_leagues);

        let mut team_leagues = self.team_leagues.write();
        for team in &league.teams {
            team_leagues.insert(team.team_id, league_id);
        }
        debug!("Registered league {} with {} teams", league_id, league.teams.len());
        self.leagues.write().insert(league_id, league);
        Ok(())
    }

    pub fn set_eligibility(&self, player_id: PlayerId, eligibility: Eligibility) -> bool {
        match self.players.write().get_mut(&player_id) {
            Some(player) => {
                player.eligibility = eligibility;
                true
            }
            None => false,
        }
    }

    pub fn league(&self, league_id: LeagueId) -> Option<LeagueSeed> {
        self.leagues.read().get(&league_id).cloned()
    }

    pub fn league_settings(&self, league_id: LeagueId) -> Option<LeagueSettings> {
        self.leagues.read().get(&league_id).map(|l| l.settings.clone())
    }

    /// League ids in ascending order
    pub fn league_ids(&self) -> Vec<LeagueId> {
        self.leagues.read().keys().copied().collect()
    }

    pub fn league_of_team(&self, team_id: TeamId) -> Option<LeagueId> {
        self.team_leagues.read().get(&team_id).copied()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().len()
    }
}

impl Default for LeagueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceData for LeagueRegistry {
    fn player(&self, player_id: PlayerId) -> Option<Player> {
        self.players.read().get(&player_id).cloned()
    }

    fn game(&self, game_id: GameId) -> Option<Game> {
        self.games.read().get(&game_id).cloned()
    }

    fn players(&self) -> Vec<Player> {
        self.players.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use std::io::Write;

    fn player(id: PlayerId, position: Position) -> Player {
        Player {
            player_id: id,
            name: format!("Player {id}"),
            position,
            nfl_team: "KC".to_string(),
            eligibility: Eligibility::Active,
        }
    }

    fn settings(league_id: LeagueId) -> LeagueSettings {
        LeagueSettings {
            league_id,
            season: 2025,
            roster_limit: 2,
            position_limits: BTreeMap::new(),
            faab_budget: 100,
            min_bid: 0,
            waiver_type: Default::default(),
            tiebreaker: Default::default(),
        }
    }

    #[test]
    fn test_add_league_indexes_teams() {
        let registry = LeagueRegistry::new();
        registry.add_player(player(1, Position::RB));
        registry
            .add_league(LeagueSeed {
                settings: settings(10),
                teams: vec![TeamSeed { team_id: 100, roster: vec![1] }, TeamSeed { team_id: 101, roster: vec![] }],
                priority: vec![],
                scoring_preset: None,
                rules: vec![],
            })
            .unwrap();

        assert_eq!(registry.league_of_team(101), Some(10));
        assert_eq!(registry.league(10).unwrap().initial_priority(), vec![100, 101]);
        assert_eq!(registry.league_ids(), vec![10]);
    }

    #[test]
    fn test_rejects_double_rostered_player() {
        let registry = LeagueRegistry::new();
        registry.add_player(player(1, Position::RB));
        let err = registry
            .add_league(LeagueSeed {
                settings: settings(10),
                teams: vec![TeamSeed { team_id: 100, roster: vec![1] }, TeamSeed { team_id: 101, roster: vec![1] }],
                priority: vec![],
                scoring_preset: None,
                rules: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::PlayerRosteredTwice { player_id: 1, .. }));
    }

    #[test]
    fn test_eligibility_update() {
        let registry = LeagueRegistry::new();
        registry.add_player(player(5, Position::WR));
        assert!(registry.set_eligibility(5, Eligibility::Injured));
        assert!(!registry.set_eligibility(6, Eligibility::Bye));
        assert_eq!(registry.player(5).unwrap().eligibility, Eligibility::Injured);
    }

    #[test]
    fn test_players_listed_in_id_order() {
        let registry = LeagueRegistry::new();
        registry.add_player(player(9, Position::TE));
        registry.add_player(player(3, Position::QB));
        let ids: Vec<PlayerId> = registry.players().iter().map(|p| p.player_id).collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let seed = r#"{
            "players": [
                {"player_id": 1, "name": "A", "position": "WR", "nfl_team": "MIA"},
                {"player_id": 2, "name": "B", "position": "QB", "nfl_team": "BUF", "eligibility": "bye"}
            ],
            "games": [{"game_id": 7, "season": 2025, "week": 2, "home": "MIA", "away": "BUF"}],
            "leagues": [{
                "settings": {"league_id": 1, "season": 2025, "roster_limit": 15, "faab_budget": 100,
                             "position_limits": {"QB": 3}},
                "teams": [{"team_id": 11, "roster": [2]}, {"team_id": 12}],
                "priority": [12, 11],
                "scoring_preset": "ppr"
            }]
        }"#;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(seed.as_bytes()).unwrap();

        let registry = LeagueRegistry::load_from_file(file.path()).await.unwrap();
        assert_eq!(registry.player_count(), 2);
        assert_eq!(registry.game(7).unwrap().week, 2);
        assert_eq!(registry.player(2).unwrap().eligibility, Eligibility::Bye);

        let league = registry.league(1).unwrap();
        assert_eq!(league.initial_priority(), vec![12, 11]);
        assert_eq!(league.settings.position_limit(Position::QB), Some(3));
        assert_eq!(league.scoring_preset.as_deref(), Some("ppr"));
    }
}
