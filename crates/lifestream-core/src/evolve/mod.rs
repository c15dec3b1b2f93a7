//! The `Evolver` capability and its implementations.
//!
//! - `NaiveEvolver`: brute force over the explicit alive-cell set.
//! - `HashLifeEvolver`: memoized quadtree evolution (see `crate::hashlife`).
//! - `ConfigurableEvolver`: delegates to whichever algorithm an external
//!   signal currently selects.
//!
//! Every implementation must return equal states for equal inputs.

mod configurable;
mod naive;

pub use configurable::{Algorithm, AlgorithmSource, AlgorithmSwitch, ConfigurableEvolver};
pub use naive::NaiveEvolver;

use crate::cell::CellState;
use crate::error::{CoreError, InvalidArgument};

/// Advance a `CellState` by a number of generations.
pub trait Evolver: Send + Sync {
    /// Return `state` advanced by `steps` generations. Zero returns the input.
    fn advance(&self, state: &CellState, steps: i64) -> Result<CellState, CoreError>;

    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Lazy sequence of states, each `steps` generations after the previous.
    ///
    /// The first item is the seed advanced once; iteration ends after the
    /// first error.
    fn generations(&self, seed: CellState, steps: i64) -> Generations<'_, Self>
    where
        Self: Sized,
    {
        Generations {
            evolver: self,
            current: seed,
            steps,
            failed: false,
        }
    }
}

impl<E: Evolver + ?Sized> Evolver for std::sync::Arc<E> {
    fn advance(&self, state: &CellState, steps: i64) -> Result<CellState, CoreError> {
        (**self).advance(state, steps)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<E: Evolver + ?Sized> Evolver for Box<E> {
    fn advance(&self, state: &CellState, steps: i64) -> Result<CellState, CoreError> {
        (**self).advance(state, steps)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Iterator returned by [`Evolver::generations`].
pub struct Generations<'a, E: Evolver> {
    evolver: &'a E,
    current: CellState,
    steps: i64,
    failed: bool,
}

impl<E: Evolver> Iterator for Generations<'_, E> {
    type Item = Result<CellState, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.evolver.advance(&self.current, self.steps) {
            Ok(next) => {
                self.current = next.clone();
                Some(Ok(next))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Reject negative step counts at the call boundary.
pub(crate) fn checked_steps(steps: i64) -> Result<u64, InvalidArgument> {
    if steps < 0 {
        return Err(InvalidArgument::NegativeSteps { steps });
    }
    Ok(steps.unsigned_abs())
}
