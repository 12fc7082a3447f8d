//! Runtime configuration.
//!
//! Layering: `Default` < JSON file < `REPUTATION_*` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use reputation_kernel::error::ParamsError;
use reputation_kernel::ReputationParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid {var} value: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid engine parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("log level must not be empty")]
    EmptyLogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    pub params: ReputationParams,
    /// Directory for exported reputation tables.
    pub snapshot_dir: PathBuf,
    /// Action journal location. No journal is kept when unset.
    pub journal_path: Option<PathBuf>,
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            params: ReputationParams::default(),
            snapshot_dir: PathBuf::from("snapshots"),
            journal_path: None,
            log: LogConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overridden by the environment, then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `REPUTATION_*` variables that are set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| env::var(name).ok())
    }

    fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let p = &mut self.params;
        parse_var(&lookup, "REPUTATION_BEST_N", &mut p.best_n)?;
        parse_var(&lookup, "REPUTATION_USER_MAX_N", &mut p.user_max_n)?;
        parse_var(
            &lookup,
            "REPUTATION_ROUND_DURATION_SECONDS",
            &mut p.round_duration_seconds,
        )?;
        parse_var(&lookup, "REPUTATION_SAMPLE_WINDOW_SIZE", &mut p.sample_window_size)?;
        parse_var(&lookup, "REPUTATION_DECAY_FACTOR", &mut p.decay_factor)?;
        parse_var(&lookup, "REPUTATION_INITIAL_REPUTATION", &mut p.initial_reputation)?;

        if let Some(dir) = lookup("REPUTATION_SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("REPUTATION_JOURNAL_PATH") {
            self.journal_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(level) = lookup("REPUTATION_LOG_LEVEL") {
            self.log.level = level;
        }
        parse_var(&lookup, "REPUTATION_LOG_JSON", &mut self.log.json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        if self.log.level.trim().is_empty() {
            return Err(ConfigError::EmptyLogLevel);
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value })?;
    }
    Ok(())
}
