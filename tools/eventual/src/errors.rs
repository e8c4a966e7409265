//! Errors surfaced by configuration, logging and the host adapter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventualError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("could not spawn execution unit: {0}")]
    Spawn(String),
    #[error("test {name} failed:\n{log}")]
    TestFailed { name: String, log: String },
}
