use serde::{Deserialize, Serialize};

use lifestream_core::{Algorithm, Rule};

use crate::driver::Pacing;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub pacing: PacingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Check every field that has a domain constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pacing.pacing()?;
        if self.pacing.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "pacing.subscriber_buffer",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.engine.max_cache_nodes == Some(0) {
            return Err(ConfigError::Invalid {
                field: "engine.max_cache_nodes",
                reason: "must be >= 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub algorithm: Algorithm,
    pub rule: Rule,
    /// Node count above which the HashLife store collects. Unbounded if unset.
    pub max_cache_nodes: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HashLife,
            rule: Rule::conway(),
            max_cache_nodes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub generations_per_tick: u64,
    pub ticks_per_second: f64,
    pub subscriber_buffer: usize,
}

impl PacingConfig {
    pub fn pacing(&self) -> Result<Pacing, ConfigError> {
        let pacing = Pacing::new(self.generations_per_tick, self.ticks_per_second)?;
        Ok(pacing)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            generations_per_tick: 1,
            ticks_per_second: 10.0,
            subscriber_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
        }
    }
}
