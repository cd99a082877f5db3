use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TallyError};

const APP_NAME: &str = "tally";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: default_db_path(),
            busy_timeout_ms: 5_000,
            foreign_keys: true,
        }
    }
}

impl Config {
    /// Load ~/.config/tally/config.toml (or platform equivalent), falling back to defaults
    pub fn load() -> Result<Self> {
        match config_file_path() {
            Some(path) => Self::load_or_default(&path),
            None => Ok(Config::default()),
        }
    }

    /// Read the file when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        if config.database_path.as_os_str().is_empty() {
            return Err(TallyError::Config("database_path must not be empty".to_string()));
        }
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// ~/.local/share/tally/tally.db or platform equivalent, relative file if no home is known
fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("tally.db"))
        .unwrap_or_else(|| PathBuf::from("tally.db"))
}
