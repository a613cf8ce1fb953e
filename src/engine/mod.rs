use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::constants::{TIME_LIMIT_SECS, TOTAL_KEYS};
use crate::error::Rejection;
use crate::maze::{generate_level, reachability, SPAWN_CELL};
use crate::rng::Rng;
use crate::types::{GameStatus, GridPos, Key, Obstacle, PlayerView, Role, Snapshot};

mod movement;
mod rules;

pub use self::rules::ClockTick;

const RESEED_SALT: u32 = 0x9e37_79b9;

/// Authoritative store for one session. Every mutation of players, keys and
/// the clock goes through the methods on this type; callers serialize access.
#[derive(Clone, Debug)]
pub struct GameEngine {
    players: BTreeMap<String, PlayerView>,
    keys: Vec<Key>,
    obstacles: Vec<Obstacle>,
    escape_point: GridPos,
    status: GameStatus,
    rng: Rng,
    seed: u32,
    epoch: u64,
}

impl GameEngine {
    pub fn new(seed: u32) -> Self {
        let mut engine = Self {
            players: BTreeMap::new(),
            keys: Vec::new(),
            obstacles: Vec::new(),
            escape_point: SPAWN_CELL,
            status: GameStatus::default(),
            rng: Rng::new(seed ^ RESEED_SALT),
            seed,
            epoch: 0,
        };
        engine.load_level(seed);
        engine
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn status(&self) -> &GameStatus {
        &self.status
    }

    pub fn player(&self, name: &str) -> Option<&PlayerView> {
        self.players.get(name)
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn escape_point(&self) -> GridPos {
        self.escape_point
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            players: self.players.clone(),
            game_state: self.status.clone(),
            keys: self.keys.clone(),
            obstacles: self.obstacles.clone(),
            escape_point: self.escape_point,
        }
    }

    pub fn register(&mut self, name: &str, role: Role, avatar: &str) -> Result<(), Rejection> {
        if self.players.contains_key(name) {
            return Err(Rejection::NameTaken);
        }
        self.players
            .insert(name.to_string(), PlayerView::spawn(role, avatar.to_string()));

        if !self.status.started {
            self.status.started = true;
            self.status.time_remaining = TIME_LIMIT_SECS;
            info!(epoch = self.epoch, "session started");
        }
        info!(player = name, ?role, "player registered");
        Ok(())
    }

    /// Drops every player and swaps in a freshly generated level in one step.
    pub fn reset(&mut self) {
        let seed = self.rng.next_u32();
        self.players.clear();
        self.load_level(seed);
        self.epoch += 1;
        info!(epoch = self.epoch, seed, "session reset");
    }

    fn load_level(&mut self, seed: u32) {
        let level = generate_level(seed, TOTAL_KEYS);
        let report = reachability(&level);
        if !report.is_fully_reachable() {
            warn!(
                seed,
                escape_reachable = report.escape_reachable,
                unreachable_keys = ?report.unreachable_keys,
                "level has content sealed off from spawn"
            );
        }

        self.seed = seed;
        self.escape_point = level.escape_point;
        self.obstacles = level.obstacles;
        self.status = GameStatus {
            total_keys: level.keys.len() as u32,
            ..GameStatus::default()
        };
        self.keys = level.keys;
    }
}
