//! HashLife: canonical quadtree nodes with memoized evolution.
//!
//! A `CellState` is embedded into a root node of a [`NodeStore`], padded with
//! empty space until the live region is central, and advanced with one
//! power-of-two jump per set bit of the step count. Results are decoded back
//! into an explicit cell set; callers never see nodes unless they ask for the
//! store.

mod node;
mod store;
mod universe;

pub use node::{LEAF_LEVEL, Node, NodeId, NodeRef};
pub use store::{NodeStore, StoreStats};

use std::sync::Arc;

use crate::cell::CellState;
use crate::error::CoreError;
use crate::evolve::{Evolver, checked_steps};
use crate::rule::Rule;

use universe::Universe;

/// Memoized quadtree evolver.
///
/// Clones share one store, so work done by any clone speeds up the others.
#[derive(Clone, Debug)]
pub struct HashLifeEvolver {
    store: Arc<NodeStore>,
}

impl HashLifeEvolver {
    /// Conway's rule on the process-wide store.
    pub fn new() -> Self {
        Self::with_store(NodeStore::global())
    }

    /// A private unbounded store unless `rule` is Conway's, which shares the
    /// process-wide one.
    pub fn with_rule(rule: Rule) -> Self {
        if rule.is_conway() {
            Self::new()
        } else {
            Self::with_store(Arc::new(NodeStore::new(rule)))
        }
    }

    pub fn with_store(store: Arc<NodeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn rule(&self) -> Rule {
        self.store.rule()
    }
}

impl Default for HashLifeEvolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Evolver for HashLifeEvolver {
    fn advance(&self, state: &CellState, steps: i64) -> Result<CellState, CoreError> {
        let steps = checked_steps(steps)?;
        if steps == 0 || state.is_empty() {
            return Ok(state.clone());
        }

        let mut universe = Universe::encode(&self.store, state);
        universe.advance(&self.store, steps)?;
        let next = universe.decode()?;

        // The root is still held here, so collection keeps everything the
        // next call from this universe would reuse.
        let evicted = self.store.maybe_collect();
        tracing::trace!(
            steps,
            population = next.population(),
            level = universe.root().level(),
            evicted,
            "hash_life advance"
        );
        Ok(next)
    }

    fn name(&self) -> &'static str {
        "hash_life"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ComputationFailure, InvalidArgument};

    fn glider() -> CellState {
        CellState::from_pattern(".O.\n..O\nOOO").unwrap()
    }

    #[test]
    fn glider_moves_one_cell_every_four_generations() {
        let evolver = HashLifeEvolver::with_store(Arc::new(NodeStore::new(Rule::conway())));
        let next = evolver.advance(&glider(), 4).unwrap();
        assert_eq!(next, glider().translated(1, 1).unwrap());
        let far = evolver.advance(&glider(), 4 * 1024).unwrap();
        assert_eq!(far, glider().translated(1024, 1024).unwrap());
    }

    #[test]
    fn zero_steps_and_empty_are_identity() {
        let evolver = HashLifeEvolver::new();
        assert_eq!(evolver.advance(&glider(), 0).unwrap(), glider());
        let empty = evolver.advance(&CellState::empty(), 99).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn negative_steps_are_rejected() {
        let err = HashLifeEvolver::new().advance(&glider(), -1).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidArgument(InvalidArgument::NegativeSteps { steps: -1 })
        );
    }

    #[test]
    fn overflow_past_the_coordinate_edge_is_reported() {
        let evolver = HashLifeEvolver::new();
        let edge = glider().translated(i64::MAX - 2, 0).unwrap();
        let err = evolver.advance(&edge, 16).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Computation(ComputationFailure::CoordinateOverflow { .. })
        ));
    }

    #[test]
    fn custom_rule_gets_its_own_store() {
        let highlife: Rule = "B36/S23".parse().unwrap();
        let evolver = HashLifeEvolver::with_rule(highlife);
        assert_eq!(evolver.rule(), highlife);
        assert!(!Arc::ptr_eq(evolver.store(), &NodeStore::global()));
        assert!(Arc::ptr_eq(
            HashLifeEvolver::with_rule(Rule::conway()).store(),
            &NodeStore::global()
        ));
    }
}
