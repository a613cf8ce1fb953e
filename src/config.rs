use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{BROADCAST_INTERVAL_MS, SUBSCRIBER_QUEUE_CAPACITY, TICK_INTERVAL_MS};
use crate::error::ConfigError;
use crate::session::SessionConfig;

const DEFAULT_PORT: u16 = 8080;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_var(&lookup, "PORT", "port number")?.unwrap_or(DEFAULT_PORT);
        let seed = parse_var::<u32, _>(&lookup, "GAME_SEED", "u32 seed")?;
        let broadcast_ms = positive(
            "BROADCAST_INTERVAL_MS",
            parse_var(&lookup, "BROADCAST_INTERVAL_MS", "millisecond count")?
                .unwrap_or(BROADCAST_INTERVAL_MS),
        )?;
        let tick_ms = positive(
            "TICK_INTERVAL_MS",
            parse_var(&lookup, "TICK_INTERVAL_MS", "millisecond count")?
                .unwrap_or(TICK_INTERVAL_MS),
        )?;
        let subscriber_queue = parse_var::<usize, _>(&lookup, "SUBSCRIBER_QUEUE", "queue size")?
            .unwrap_or(SUBSCRIBER_QUEUE_CAPACITY);
        if subscriber_queue == 0 {
            return Err(ConfigError::Zero {
                name: "SUBSCRIBER_QUEUE",
            });
        }

        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .filter(|path| path.join("index.html").is_file());

        Ok(Self {
            port,
            static_dir,
            session: SessionConfig {
                seed,
                tick_interval: Duration::from_millis(tick_ms),
                broadcast_interval: Duration::from_millis(broadcast_ms),
                subscriber_queue,
            },
        })
    }
}

fn parse_var<T, F>(
    lookup: &F,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw.clone(),
        })
}

fn positive(name: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { name });
    }
    Ok(value)
}
