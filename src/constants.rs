pub const ARENA_HALF_WIDTH: i32 = 7;
pub const ARENA_BOUND: i32 = 8;
pub const MOVE_LIMIT: f64 = ARENA_BOUND as f64;

pub const TOTAL_KEYS: u32 = 3;
pub const TIME_LIMIT_SECS: u32 = 300;

pub const OBSTACLE_COLLISION_RADIUS: f64 = 0.5;
pub const KEY_PICKUP_RADIUS: f64 = 0.5;
pub const CATCH_RADIUS: f64 = 0.5;
pub const AUTO_ESCAPE_RADIUS: f64 = 0.5;
pub const ESCAPE_RADIUS: f64 = 1.0;

/// Chebyshev radius around the escape point kept free of walls and keys.
pub const ESCAPE_CLEARANCE: i32 = 1;
/// Chebyshev radius around the origin spawn cell.
pub const SPAWN_CLEARANCE: i32 = 1;

pub const SCATTER_TRIALS: usize = 50;
pub const SCATTER_PROBABILITY: f64 = 0.3;
pub const KEY_SAMPLE_ATTEMPTS: usize = 512;

pub const TICK_INTERVAL_MS: u64 = 1_000;
pub const BROADCAST_INTERVAL_MS: u64 = 100;
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;
