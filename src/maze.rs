use std::collections::{HashSet, VecDeque};

use crate::constants::{
    ARENA_BOUND, ARENA_HALF_WIDTH, ESCAPE_CLEARANCE, KEY_SAMPLE_ATTEMPTS, SCATTER_PROBABILITY,
    SCATTER_TRIALS, SPAWN_CLEARANCE,
};
use crate::rng::Rng;
use crate::types::{GridPos, Key, Obstacle, ObstacleKind};

pub const SPAWN_CELL: GridPos = GridPos::new(0, 0);

const ROOMS: [((i32, i32), (i32, i32)); 2] = [((-3, -3), (-1, -1)), ((2, 2), (4, 4))];

const VERTICAL_CORRIDOR_XS: [i32; 4] = [-5, -3, 2, 5];
const HORIZONTAL_CORRIDOR_YS: [i32; 2] = [-4, 4];
const CORRIDOR_SPAN: i32 = 6;
const VERTICAL_GAP: i32 = 1;
const HORIZONTAL_GAP: i32 = 2;

const L_CORNERS: [[(i32, i32); 5]; 4] = [
    [(-6, -5), (-6, -4), (-6, -3), (-5, -3), (-4, -3)],
    [(4, 4), (5, 4), (6, 4), (6, 5), (6, 6)],
    [(-6, 5), (-6, 6), (-5, 6), (-4, 6), (-3, 6)],
    [(6, -6), (6, -5), (5, -5), (4, -5), (3, -5)],
];

const DEAD_ENDS: [[(i32, i32); 4]; 4] = [
    [(-1, -6), (0, -6), (1, -6), (0, -5)],
    [(-1, 6), (0, 6), (1, 6), (0, 5)],
    [(-7, -1), (-7, 0), (-7, 1), (-6, 0)],
    [(7, -1), (7, 0), (7, 1), (6, 0)],
];

// dead-end interiors, room interiors, danger corners, corridor midpoints, L-corner interiors
const STRATEGIC_KEY_CELLS: [(i32, i32); 18] = [
    (-1, -5),
    (1, 5),
    (-6, -1),
    (6, 1),
    (-1, -1),
    (2, 2),
    (-6, -6),
    (6, 6),
    (-6, 6),
    (6, -6),
    (0, -3),
    (0, 3),
    (-4, 0),
    (4, 0),
    (-5, -4),
    (5, 5),
    (-5, 5),
    (5, -4),
];

#[derive(Clone, Debug)]
pub struct GeneratedLevel {
    pub escape_point: GridPos,
    pub obstacles: Vec<Obstacle>,
    pub keys: Vec<Key>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelReport {
    pub escape_reachable: bool,
    pub unreachable_keys: Vec<u32>,
}

impl LevelReport {
    pub fn is_fully_reachable(&self) -> bool {
        self.escape_reachable && self.unreachable_keys.is_empty()
    }
}

pub fn generate_level(seed: u32, key_count: u32) -> GeneratedLevel {
    let mut rng = Rng::new(seed);
    let escape_point = generate_escape_point(&mut rng);
    let obstacles = generate_obstacles(&mut rng, escape_point);
    let keys = generate_keys(&mut rng, key_count, &obstacles, escape_point);
    GeneratedLevel {
        escape_point,
        obstacles,
        keys,
    }
}

/// Non-corner cells on the ring `|x| == 7 || |y| == 7`.
pub fn escape_point_candidates() -> Vec<GridPos> {
    let h = ARENA_HALF_WIDTH;
    let mut out = Vec::with_capacity(4 * (2 * h - 1) as usize);
    for t in (-h + 1)..h {
        out.push(GridPos::new(t, h));
        out.push(GridPos::new(t, -h));
        out.push(GridPos::new(h, t));
        out.push(GridPos::new(-h, t));
    }
    out
}

pub fn generate_escape_point(rng: &mut Rng) -> GridPos {
    let candidates = escape_point_candidates();
    candidates[rng.pick_index(candidates.len())]
}

pub fn generate_obstacles(rng: &mut Rng, escape_point: GridPos) -> Vec<Obstacle> {
    let mut placer = ObstaclePlacer::new(escape_point);

    for x in -ARENA_BOUND..=ARENA_BOUND {
        for y in -ARENA_BOUND..=ARENA_BOUND {
            if x.abs() == ARENA_BOUND || y.abs() == ARENA_BOUND {
                placer.place_boundary(GridPos::new(x, y));
            }
        }
    }

    for ((x0, y0), (x1, y1)) in ROOMS {
        for x in x0..=x1 {
            for y in y0..=y1 {
                if x == x0 || x == x1 || y == y0 || y == y1 {
                    placer.place_interior(GridPos::new(x, y));
                }
            }
        }
    }

    for x in VERTICAL_CORRIDOR_XS {
        for y in -CORRIDOR_SPAN..=CORRIDOR_SPAN {
            if y.abs() > VERTICAL_GAP {
                placer.place_interior(GridPos::new(x, y));
            }
        }
    }
    for y in HORIZONTAL_CORRIDOR_YS {
        for x in -CORRIDOR_SPAN..=CORRIDOR_SPAN {
            if x.abs() > HORIZONTAL_GAP {
                placer.place_interior(GridPos::new(x, y));
            }
        }
    }

    for pattern in L_CORNERS {
        for (x, y) in pattern {
            placer.place_interior(GridPos::new(x, y));
        }
    }
    for pattern in DEAD_ENDS {
        for (x, y) in pattern {
            placer.place_interior(GridPos::new(x, y));
        }
    }

    let h = ARENA_HALF_WIDTH;
    for _ in 0..SCATTER_TRIALS {
        let cell = GridPos::new(rng.int(-h, h), rng.int(-h, h));
        if rng.bool(SCATTER_PROBABILITY) {
            placer.place_interior(cell);
        }
    }

    placer.obstacles
}

pub fn generate_keys(
    rng: &mut Rng,
    count: u32,
    obstacles: &[Obstacle],
    escape_point: GridPos,
) -> Vec<Key> {
    let blocked: HashSet<GridPos> = obstacles.iter().map(|obstacle| obstacle.position).collect();
    let mut pool = strategic_key_candidates(&blocked, escape_point);
    let mut keys: Vec<Key> = Vec::with_capacity(count as usize);

    for id in 0..count {
        let position = if pool.is_empty() {
            sample_free_key_cell(rng, &blocked, &keys, escape_point)
        } else {
            Some(pool.remove(rng.pick_index(pool.len())))
        };
        let Some(position) = position else {
            break;
        };
        keys.push(Key {
            id,
            position,
            found: false,
        });
    }
    keys
}

/// Flood fill over 4-connected open cells from the spawn. Diagnostic only:
/// a sealed-off key or exit is reported, never repaired.
pub fn reachability(level: &GeneratedLevel) -> LevelReport {
    let reachable = reachable_cells(&level.obstacles);
    LevelReport {
        escape_reachable: reachable.contains(&level.escape_point),
        unreachable_keys: level
            .keys
            .iter()
            .filter(|key| !reachable.contains(&key.position))
            .map(|key| key.id)
            .collect(),
    }
}

pub fn reachable_cells(obstacles: &[Obstacle]) -> HashSet<GridPos> {
    let blocked: HashSet<GridPos> = obstacles.iter().map(|obstacle| obstacle.position).collect();
    let mut out = HashSet::new();
    if blocked.contains(&SPAWN_CELL) {
        return out;
    }

    let h = ARENA_HALF_WIDTH;
    let mut queue = VecDeque::new();
    out.insert(SPAWN_CELL);
    queue.push_back(SPAWN_CELL);

    while let Some(cell) = queue.pop_front() {
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let next = GridPos::new(cell.x + dx, cell.y + dy);
            if next.x.abs() > h || next.y.abs() > h {
                continue;
            }
            if blocked.contains(&next) {
                continue;
            }
            if out.insert(next) {
                queue.push_back(next);
            }
        }
    }

    out
}

pub fn is_spawn_zone(cell: GridPos) -> bool {
    cell.chebyshev(SPAWN_CELL) <= SPAWN_CLEARANCE
}

pub fn is_near_escape(cell: GridPos, escape_point: GridPos) -> bool {
    cell.chebyshev(escape_point) <= ESCAPE_CLEARANCE
}

pub(crate) fn strategic_key_candidates(
    blocked: &HashSet<GridPos>,
    escape_point: GridPos,
) -> Vec<GridPos> {
    STRATEGIC_KEY_CELLS
        .iter()
        .map(|&(x, y)| GridPos::new(x, y))
        .filter(|cell| {
            !blocked.contains(cell) && *cell != escape_point && !is_near_escape(*cell, escape_point)
        })
        .collect()
}

fn sample_free_key_cell(
    rng: &mut Rng,
    blocked: &HashSet<GridPos>,
    keys: &[Key],
    escape_point: GridPos,
) -> Option<GridPos> {
    let admissible = |cell: GridPos| {
        !blocked.contains(&cell)
            && cell != escape_point
            && !is_near_escape(cell, escape_point)
            && !is_spawn_zone(cell)
            && !keys.iter().any(|key| key.position == cell)
    };

    let h = ARENA_HALF_WIDTH;
    for _ in 0..KEY_SAMPLE_ATTEMPTS {
        let cell = GridPos::new(rng.int(-h, h), rng.int(-h, h));
        if admissible(cell) {
            return Some(cell);
        }
    }

    (-h..=h)
        .flat_map(|y| (-h..=h).map(move |x| GridPos::new(x, y)))
        .find(|cell| admissible(*cell))
}

struct ObstaclePlacer {
    escape_point: GridPos,
    occupied: HashSet<GridPos>,
    obstacles: Vec<Obstacle>,
}

impl ObstaclePlacer {
    fn new(escape_point: GridPos) -> Self {
        Self {
            escape_point,
            occupied: HashSet::new(),
            obstacles: Vec::new(),
        }
    }

    fn place_boundary(&mut self, cell: GridPos) {
        if self.occupied.insert(cell) {
            self.obstacles.push(Obstacle {
                position: cell,
                kind: ObstacleKind::Wall,
            });
        }
    }

    fn place_interior(&mut self, cell: GridPos) {
        if is_near_escape(cell, self.escape_point) || is_spawn_zone(cell) {
            return;
        }
        self.place_boundary(cell);
    }
}
