use thiserror::Error;

/// Why an intent was refused. The engine state is untouched whenever one of
/// these is returned.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Rejection {
    #[error("name already taken")]
    NameTaken,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("player is caught or has escaped")]
    PlayerInactive,
    #[error("only survivors can do that")]
    NotSurvivor,
    #[error("position ({x}, {y}) is outside the arena")]
    OutOfBounds { x: f64, y: f64 },
    #[error("position ({x}, {y}) collides with a wall")]
    Collision { x: f64, y: f64 },
    #[error("unknown key {0}")]
    UnknownKey(u32),
    #[error("key {0} was already found")]
    KeyAlreadyFound(u32),
    #[error("holding {have} of {need} keys")]
    MissingKeys { have: u32, need: u32 },
    #[error("escape point is {distance:.2} away")]
    TooFarFromExit { distance: f64 },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{task} task of epoch {epoch} panicked: {message}")]
    SchedulerFault {
        task: &'static str,
        epoch: u64,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}
