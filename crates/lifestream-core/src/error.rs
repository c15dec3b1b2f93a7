//! Core capability errors (argument validation, evolution failures).
//!
//! These are bounded and stable: they describe refusals and faults of the
//! evolution engine, not library implementation details.

use thiserror::Error;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs.
    Permanent,
    /// Retry may help.
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Caller supplied a value the engine refuses to work with.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvalidArgument {
    #[error("step count {steps} is negative")]
    NegativeSteps { steps: i64 },
    #[error("generations per tick must be >= 1, got {value}")]
    GenerationsPerTick { value: u64 },
    #[error("ticks per second must be finite and > 0, got {value}")]
    TicksPerSecond { value: f64 },
    #[error("rule `{raw}` is invalid: {reason}")]
    Rule { raw: String, reason: String },
    #[error("algorithm `{raw}` is unknown, expected `naive` or `hash_life`")]
    Algorithm { raw: String },
    #[error("pattern line {line} column {column}: unexpected `{found}`")]
    Pattern {
        line: usize,
        column: usize,
        found: char,
    },
}

/// An evolver hit a fault it cannot recover from.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ComputationFailure {
    #[error("cell coordinate overflow near ({x}, {y})")]
    CoordinateOverflow { x: i64, y: i64 },
    #[error("universe needs quadtree level {level}, above the supported maximum")]
    UniverseTooLarge { level: u32 },
    #[error("evolver panicked: {reason}")]
    EvolverPanicked { reason: String },
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error(transparent)]
    Computation(#[from] ComputationFailure),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        match self {
            CoreError::InvalidArgument(_) => Transience::Permanent,
            CoreError::Computation(_) => Transience::Unknown,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, CoreError::InvalidArgument(_))
    }
}
