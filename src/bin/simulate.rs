use clap::Parser;
use maze_escape_server::constants::{TIME_LIMIT_SECS, TOTAL_KEYS};
use maze_escape_server::engine::GameEngine;
use maze_escape_server::maze::{generate_level, reachability};
use maze_escape_server::rng::Rng;
use maze_escape_server::types::{Position, Role, Winner};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::f64::consts::TAU;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MOVES_PER_TICK: usize = 4;
const STEP: f64 = 0.5;
const RANDOM_HEADINGS: usize = 6;
const HUNTER_HEAD_START: usize = 8;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play bot sessions against the engine and report outcomes")]
struct Cli {
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long, default_value_t = 8)]
    runs: usize,
    #[arg(long, default_value_t = 2)]
    survivors: usize,
    #[arg(long, default_value_t = 1)]
    hunters: usize,
    #[arg(long, default_value_t = TIME_LIMIT_SECS)]
    max_ticks: u32,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug)]
struct Scenario {
    run: usize,
    seed: u32,
    survivors: usize,
    hunters: usize,
    max_ticks: u32,
}

#[derive(Clone, Debug)]
struct Bot {
    name: String,
    role: Role,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct ScenarioResultLine {
    run: usize,
    seed: u32,
    survivors: usize,
    hunters: usize,
    outcome: String,
    winner: Option<Winner>,
    ticks: u32,
    keys_found: u32,
    survivors_caught: usize,
    survivors_escaped: usize,
    fully_reachable: bool,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u32,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    base_seed: u32,
    run_count: usize,
    anomaly_count: usize,
    average_ticks: u32,
    outcome_counts: BTreeMap<String, usize>,
    runs: Vec<ScenarioResultLine>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let base_seed = cli.seed.unwrap_or_else(rand::random);
    info!(base_seed, runs = cli.runs, "simulation started");

    let mut has_anomaly = false;
    let mut results = Vec::new();
    let mut total_anomalies = 0usize;

    for scenario in resolve_scenarios(&cli, base_seed) {
        let scenario_run = run_scenario(&scenario);
        for anomaly in &scenario_run.anomaly_records {
            warn!(
                run = scenario.run,
                seed = scenario.seed,
                tick = anomaly.tick,
                message = %anomaly.message,
                "anomaly detected"
            );
        }
        has_anomaly |= !scenario_run.result.anomalies.is_empty();
        total_anomalies += scenario_run.anomaly_records.len();

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(err) => error!(run = scenario.run, %err, "failed to encode result line"),
        }
        results.push(scenario_run.result);
    }

    let summary = build_run_summary(base_seed, results, total_anomalies);
    info!(
        run_count = summary.run_count,
        anomaly_count = summary.anomaly_count,
        average_ticks = summary.average_ticks,
        outcomes = ?summary.outcome_counts,
        "simulation finished"
    );

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(path = %path.display(), %err, "summary write failed");
            std::process::exit(2);
        }
    }

    if has_anomaly {
        std::process::exit(1);
    }
}

fn resolve_scenarios(cli: &Cli, base_seed: u32) -> Vec<Scenario> {
    (0..cli.runs)
        .map(|run| Scenario {
            run,
            seed: base_seed.wrapping_add(run as u32),
            survivors: cli.survivors,
            hunters: cli.hunters,
            max_ticks: cli.max_ticks,
        })
        .collect()
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let fully_reachable =
        reachability(&generate_level(scenario.seed, TOTAL_KEYS)).is_fully_reachable();
    let mut engine = GameEngine::new(scenario.seed);
    let mut rng = Rng::new(scenario.seed.rotate_left(16) ^ 0x5bd1_e995);

    let bots: Vec<Bot> = (0..scenario.survivors)
        .map(|idx| Bot {
            name: format!("survivor_{}", idx + 1),
            role: Role::Survivor,
        })
        .chain((0..scenario.hunters).map(|idx| Bot {
            name: format!("hunter_{}", idx + 1),
            role: Role::Hunter,
        }))
        .collect();

    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();

    // Everyone spawns at the origin, so hunters wander off before any
    // survivor joins.
    let (hunters, survivors): (Vec<&Bot>, Vec<&Bot>) =
        bots.iter().partition(|bot| bot.role == Role::Hunter);
    for (wave, head_start) in [(&hunters, HUNTER_HEAD_START), (&survivors, 0)] {
        for bot in wave.iter() {
            if let Err(rejection) = engine.register(&bot.name, bot.role, "") {
                push_anomaly(
                    &mut anomalies,
                    &mut anomaly_records,
                    &mut anomaly_seen,
                    0,
                    format!("bot {} failed to register: {rejection}", bot.name),
                );
            }
        }
        for _ in 0..head_start {
            for bot in wave.iter() {
                step_bot(&mut engine, bot, &bots, &mut rng);
            }
        }
    }

    let mut ticks = 0u32;
    let mut first_winner: Option<Winner> = None;
    while !engine.status().over && ticks < scenario.max_ticks {
        'moves: for _ in 0..MOVES_PER_TICK {
            for bot in &bots {
                step_bot(&mut engine, bot, &bots, &mut rng);
                if engine.status().over {
                    break 'moves;
                }
            }
        }
        engine.tick_clock();
        ticks += 1;

        let mut found = collect_engine_anomalies(&engine);
        match (first_winner, engine.status().winner) {
            (None, winner) => first_winner = winner,
            (Some(before), Some(now)) if before != now => {
                found.push(format!("winner changed from {before:?} to {now:?}"));
            }
            (Some(_), None) => found.push("winner was cleared".to_string()),
            _ => {}
        }
        for message in found {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                ticks,
                message,
            );
        }
    }

    let status = engine.status();
    let survivors: Vec<_> = bots
        .iter()
        .filter(|bot| bot.role == Role::Survivor)
        .filter_map(|bot| engine.player(&bot.name))
        .collect();
    let survivors_escaped = survivors.iter().filter(|player| player.escaped).count();
    let survivors_caught = survivors.iter().filter(|player| player.caught).count();
    let outcome = if !status.over {
        "unfinished"
    } else if survivors_escaped > 0 {
        "escape"
    } else if status.time_remaining == 0 {
        "timeout"
    } else {
        "capture"
    };

    ScenarioRunResult {
        result: ScenarioResultLine {
            run: scenario.run,
            seed: scenario.seed,
            survivors: scenario.survivors,
            hunters: scenario.hunters,
            outcome: outcome.to_string(),
            winner: status.winner,
            ticks,
            keys_found: status.keys_found,
            survivors_caught,
            survivors_escaped,
            fully_reachable,
            anomalies,
        },
        anomaly_records,
    }
}

/// Survivors head for the nearest unfound key, then the exit; hunters chase
/// the nearest active survivor. A blocked heading falls back to random ones.
fn step_bot(engine: &mut GameEngine, bot: &Bot, bots: &[Bot], rng: &mut Rng) {
    let Some(player) = engine.player(&bot.name) else {
        return;
    };
    if player.is_terminal() {
        return;
    }
    let from = player.position;
    let holds_every_key = player.keys_collected >= engine.status().total_keys;

    let target = match bot.role {
        Role::Survivor => {
            if holds_every_key && engine.escape(&bot.name, None).is_ok() {
                return;
            }
            survivor_target(engine, from)
        }
        Role::Hunter => hunter_target(engine, bots, from),
    };

    let heading = target.map(|to| (to.y - from.y).atan2(to.x - from.x));
    let candidates = heading
        .into_iter()
        .chain((0..RANDOM_HEADINGS).map(|_| rng.next_f64() * TAU));
    for angle in candidates {
        let next = Position::new(from.x + STEP * angle.cos(), from.y + STEP * angle.sin());
        if engine.move_player(&bot.name, next, angle).is_ok() {
            return;
        }
    }
}

fn survivor_target(engine: &GameEngine, from: Position) -> Option<Position> {
    engine
        .keys()
        .iter()
        .filter(|key| !key.found)
        .map(|key| key.position.to_position())
        .min_by(|a, b| from.distance(*a).total_cmp(&from.distance(*b)))
        .or_else(|| Some(engine.escape_point().to_position()))
}

fn hunter_target(engine: &GameEngine, bots: &[Bot], from: Position) -> Option<Position> {
    bots.iter()
        .filter(|bot| bot.role == Role::Survivor)
        .filter_map(|bot| engine.player(&bot.name))
        .filter(|player| player.is_active_survivor())
        .map(|player| player.position)
        .min_by(|a, b| from.distance(*a).total_cmp(&from.distance(*b)))
}

fn collect_engine_anomalies(engine: &GameEngine) -> Vec<String> {
    let mut anomalies = Vec::new();
    let status = engine.status();

    let found = engine.keys().iter().filter(|key| key.found).count() as u32;
    if found != status.keys_found {
        anomalies.push(format!(
            "keys_found {} disagrees with {found} found keys",
            status.keys_found
        ));
    }
    if status.over != status.winner.is_some() {
        anomalies.push(format!(
            "over={} but winner={:?}",
            status.over, status.winner
        ));
    }
    if status.time_remaining > TIME_LIMIT_SECS {
        anomalies.push(format!("time_remaining {} above limit", status.time_remaining));
    }

    let walls: HashSet<_> = engine
        .obstacles()
        .iter()
        .map(|obstacle| obstacle.position)
        .collect();
    if walls.contains(&engine.escape_point()) {
        anomalies.push("escape point is walled".to_string());
    }
    for key in engine.keys() {
        if walls.contains(&key.position) {
            anomalies.push(format!("key {} sits on a wall", key.id));
        }
    }
    anomalies
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u32,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn build_run_summary(
    base_seed: u32,
    runs: Vec<ScenarioResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    let mut outcome_counts = BTreeMap::new();
    for run in &runs {
        *outcome_counts.entry(run.outcome.clone()).or_insert(0) += 1;
    }
    let total_ticks: u64 = runs.iter().map(|run| u64::from(run.ticks)).sum();
    let average_ticks = if runs.is_empty() {
        0
    } else {
        (total_ticks / runs.len() as u64) as u32
    };

    RunSummary {
        base_seed,
        run_count: runs.len(),
        anomaly_count,
        average_ticks,
        outcome_counts,
        runs,
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)
}
