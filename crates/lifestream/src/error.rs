use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use lifestream_core::{CoreError, InvalidArgument, Transience};

/// Loading, validating or persisting configuration failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn transience(&self) -> Transience {
        match self {
            ConfigError::Read { .. } | ConfigError::Write { .. } => Transience::Retryable,
            ConfigError::Parse { .. } | ConfigError::Render(_) | ConfigError::Invalid { .. } => {
                Transience::Permanent
            }
        }
    }
}

impl From<InvalidArgument> for ConfigError {
    fn from(err: InvalidArgument) -> Self {
        let field = match &err {
            InvalidArgument::GenerationsPerTick { .. } => "pacing.generations_per_tick",
            InvalidArgument::TicksPerSecond { .. } => "pacing.ticks_per_second",
            InvalidArgument::Rule { .. } => "engine.rule",
            InvalidArgument::Algorithm { .. } => "engine.algorithm",
            _ => "config",
        };
        ConfigError::Invalid {
            field,
            reason: err.to_string(),
        }
    }
}

/// The pacing driver could not be started or reached.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum DriverError {
    #[error("failed to spawn thread `{name}`: {reason}")]
    Spawn { name: &'static str, reason: String },
    #[error("driver has shut down")]
    Disconnected,
    #[error("tick was cancelled")]
    Cancelled,
    #[error("no snapshot within {waited:?}")]
    Timeout { waited: Duration },
}

impl DriverError {
    pub fn transience(&self) -> Transience {
        match self {
            DriverError::Spawn { .. } | DriverError::Timeout { .. } => Transience::Retryable,
            DriverError::Cancelled => Transience::Retryable,
            DriverError::Disconnected => Transience::Permanent,
        }
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the capability errors; match on the inner enum for
/// details.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(e) => e.transience(),
            Error::Config(e) => e.transience(),
            Error::Driver(e) => e.transience(),
        }
    }
}

impl From<InvalidArgument> for Error {
    fn from(err: InvalidArgument) -> Self {
        Error::Core(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
