//! Error type shared by the recorder, the sqlite store and config loading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Violation not found: {0}")]
    ViolationNotFound(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TallyError>;
