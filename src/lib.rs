pub mod broadcast;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod maze;
pub mod protocol;
pub mod rng;
pub mod session;
pub mod types;
