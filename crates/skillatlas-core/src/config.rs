//! Engine configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::retrieval::{RetrievalPolicy, DEFAULT_DECAY_FACTOR, DEFAULT_PASS_MARK};
use crate::selector::DEFAULT_SESSION_SIZE;
use crate::theta::DEFAULT_LEARNING_RATE;

/// Retrieval-practice rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Correct answers needed to pass.
    #[serde(default = "default_pass_mark")]
    pub pass_mark: u32,
    /// Score multiplier on a pass.
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pass_mark: default_pass_mark(),
            decay_factor: default_decay_factor(),
        }
    }
}

impl RetrievalConfig {
    pub fn policy(&self) -> RetrievalPolicy {
        RetrievalPolicy {
            pass_mark: self.pass_mark,
            decay_factor: self.decay_factor,
        }
    }
}

/// Top-level skillatlas configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step size of the theta gradient update.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Questions per practice session.
    #[serde(default = "default_session_size")]
    pub session_size: usize,
    /// Retrieval-practice rules.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Compare-and-swap attempts before a write gives up.
    #[serde(default = "default_conflict_retries")]
    pub max_conflict_retries: u32,
    /// Initial backoff between conflicting writes in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}
fn default_session_size() -> usize {
    DEFAULT_SESSION_SIZE
}
fn default_pass_mark() -> u32 {
    DEFAULT_PASS_MARK
}
fn default_decay_factor() -> f64 {
    DEFAULT_DECAY_FACTOR
}
fn default_conflict_retries() -> u32 {
    5
}
fn default_retry_delay() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            session_size: default_session_size(),
            retrieval: RetrievalConfig::default(),
            max_conflict_retries: default_conflict_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl EngineConfig {
    /// Reject values that would make the estimators misbehave.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 || self.learning_rate > 5.0 {
            return Err(EngineError::InvalidConfig {
                field: "learning_rate",
                reason: format!("must be in (0, 5], got {}", self.learning_rate),
            });
        }
        if self.session_size == 0 {
            return Err(EngineError::InvalidConfig {
                field: "session_size",
                reason: "must be at least 1".into(),
            });
        }
        let decay = self.retrieval.decay_factor;
        if !decay.is_finite() || decay <= 0.0 || decay > 1.0 {
            return Err(EngineError::InvalidConfig {
                field: "retrieval.decay_factor",
                reason: format!("must be in (0, 1], got {decay}"),
            });
        }
        if self.retrieval.pass_mark == 0 {
            return Err(EngineError::InvalidConfig {
                field: "retrieval.pass_mark",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_conflict_retries == 0 {
            return Err(EngineError::InvalidConfig {
                field: "max_conflict_retries",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order without a path:
/// 1. `skillatlas.toml` in the current directory
/// 2. `~/.config/skillatlas/config.toml`
///
/// Environment variable overrides: `SKILLATLAS_LEARNING_RATE`,
/// `SKILLATLAS_SESSION_SIZE`.
pub fn load_config_from(path: Option<&Path>) -> Result<EngineConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("skillatlas.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<EngineConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;

    Ok(config)
}

fn apply_env_overrides(config: &mut EngineConfig) -> Result<()> {
    if let Ok(value) = std::env::var("SKILLATLAS_LEARNING_RATE") {
        config.learning_rate = value
            .trim()
            .parse()
            .with_context(|| format!("SKILLATLAS_LEARNING_RATE is not a number: {value}"))?;
    }
    if let Ok(value) = std::env::var("SKILLATLAS_SESSION_SIZE") {
        config.session_size = value
            .trim()
            .parse()
            .with_context(|| format!("SKILLATLAS_SESSION_SIZE is not an integer: {value}"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("skillatlas"))
}
