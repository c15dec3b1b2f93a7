//! Evolver that follows an externally owned algorithm choice.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::cell::CellState;
use crate::error::{CoreError, InvalidArgument};
use crate::hashlife::HashLifeEvolver;

use super::{Evolver, NaiveEvolver};

/// Which concrete evolver to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Naive,
    #[default]
    HashLife,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Naive => "naive",
            Algorithm::HashLife => "hash_life",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Algorithm::Naive => 0,
            Algorithm::HashLife => 1,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Algorithm::Naive,
            _ => Algorithm::HashLife,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = InvalidArgument;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(Algorithm::Naive),
            "hash_life" | "hashlife" => Ok(Algorithm::HashLife),
            _ => Err(InvalidArgument::Algorithm {
                raw: raw.to_string(),
            }),
        }
    }
}

/// Source of the current algorithm selection.
///
/// Read on every `advance` call; the value may change at any time.
pub trait AlgorithmSource: Send + Sync {
    fn current(&self) -> Algorithm;
}

/// Lock-free, cloneable algorithm selection that preference storage writes to.
#[derive(Clone, Debug)]
pub struct AlgorithmSwitch {
    value: Arc<AtomicU8>,
}

impl AlgorithmSwitch {
    pub fn new(initial: Algorithm) -> Self {
        Self {
            value: Arc::new(AtomicU8::new(initial.to_u8())),
        }
    }

    pub fn set(&self, algorithm: Algorithm) {
        self.value.store(algorithm.to_u8(), Ordering::Release);
    }
}

impl Default for AlgorithmSwitch {
    fn default() -> Self {
        Self::new(Algorithm::default())
    }
}

impl AlgorithmSource for AlgorithmSwitch {
    fn current(&self) -> Algorithm {
        Algorithm::from_u8(self.value.load(Ordering::Acquire))
    }
}

/// Delegates every call to the evolver the source currently selects.
pub struct ConfigurableEvolver<S = AlgorithmSwitch> {
    source: S,
    naive: NaiveEvolver,
    hash_life: HashLifeEvolver,
}

impl<S: AlgorithmSource> ConfigurableEvolver<S> {
    pub fn new(source: S, naive: NaiveEvolver, hash_life: HashLifeEvolver) -> Self {
        Self {
            source,
            naive,
            hash_life,
        }
    }

    /// Conway's rule, with HashLife on the process-wide node store.
    pub fn conway(source: S) -> Self {
        Self::new(source, NaiveEvolver::new(), HashLifeEvolver::new())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn selected(&self) -> &dyn Evolver {
        match self.source.current() {
            Algorithm::Naive => &self.naive,
            Algorithm::HashLife => &self.hash_life,
        }
    }
}

impl<S: AlgorithmSource> Evolver for ConfigurableEvolver<S> {
    fn advance(&self, state: &CellState, steps: i64) -> Result<CellState, CoreError> {
        let evolver = self.selected();
        tracing::trace!(algorithm = evolver.name(), steps, "delegating advance");
        evolver.advance(state, steps)
    }

    fn name(&self) -> &'static str {
        "configurable"
    }
}
