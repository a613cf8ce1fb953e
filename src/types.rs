use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::{TIME_LIMIT_SECS, TOTAL_KEYS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Survivor,
    Hunter,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "survivor" => Some(Self::Survivor),
            "hunter" => Some(Self::Hunter),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Survivors,
    Hunter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Waiting,
    Running,
    Over(Winner),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn chebyshev(self, other: GridPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn to_position(self) -> Position {
        Position {
            x: self.x as f64,
            y: self.y as f64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn distance_to_cell(self, cell: GridPos) -> f64 {
        self.distance(cell.to_position())
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    Wall,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Obstacle {
    pub position: GridPos,
    #[serde(rename = "type")]
    pub kind: ObstacleKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Key {
    pub id: u32,
    pub position: GridPos,
    pub found: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerView {
    pub role: Role,
    pub position: Position,
    pub rotation: f64,
    pub avatar: String,
    pub caught: bool,
    pub escaped: bool,
    pub keys_collected: u32,
}

impl PlayerView {
    pub fn spawn(role: Role, avatar: String) -> Self {
        Self {
            role,
            position: Position::ORIGIN,
            rotation: 0.0,
            avatar,
            caught: false,
            escaped: false,
            keys_collected: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.caught || self.escaped
    }

    pub fn is_active_survivor(&self) -> bool {
        self.role == Role::Survivor && !self.is_terminal()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameStatus {
    pub keys_found: u32,
    pub total_keys: u32,
    pub time_remaining: u32,
    #[serde(rename = "game_started")]
    pub started: bool,
    #[serde(rename = "game_over")]
    pub over: bool,
    pub winner: Option<Winner>,
}

impl Default for GameStatus {
    fn default() -> Self {
        Self {
            keys_found: 0,
            total_keys: TOTAL_KEYS,
            time_remaining: TIME_LIMIT_SECS,
            started: false,
            over: false,
            winner: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub players: BTreeMap<String, PlayerView>,
    pub game_state: GameStatus,
    pub keys: Vec<Key>,
    pub obstacles: Vec<Obstacle>,
    pub escape_point: GridPos,
}
