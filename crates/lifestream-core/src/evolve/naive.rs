//! Brute-force evolution over the explicit alive-cell set.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::cell::{Cell, CellState};
use crate::error::{ComputationFailure, CoreError};
use crate::rule::Rule;

use super::{Evolver, checked_steps};

const NEIGHBOUR_OFFSETS: [(i128, i128); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Reference evolver. Cost per generation is linear in the live population.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveEvolver {
    rule: Rule,
}

impl NaiveEvolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(rule: Rule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    /// One generation. Fails only if a cell alive in the result lies outside
    /// the `i64` plane.
    pub fn step(&self, state: &CellState) -> Result<CellState, ComputationFailure> {
        if state.is_empty() {
            return Ok(state.clone());
        }

        // Counted in `i128` so cells on the edge of the plane still see their
        // outer neighbours. Alive cells with no neighbours still need an entry
        // so the rule sees them.
        let mut counts: FxHashMap<(i128, i128), u32> = FxHashMap::default();
        counts.reserve(state.population() * 9);
        for cell in state.iter() {
            let (x, y) = (i128::from(cell.x), i128::from(cell.y));
            counts.entry((x, y)).or_insert(0);
            for (dx, dy) in NEIGHBOUR_OFFSETS {
                *counts.entry((x + dx, y + dy)).or_insert(0) += 1;
            }
        }

        let mut next = BTreeSet::new();
        for ((x, y), neighbours) in counts {
            let cell = representable(x, y);
            let alive = cell.is_some_and(|cell| state.contains(cell));
            if !self.rule.next(alive, neighbours) {
                continue;
            }
            let Some(cell) = cell else {
                return Err(ComputationFailure::CoordinateOverflow {
                    x: saturate(x),
                    y: saturate(y),
                });
            };
            next.insert(cell);
        }
        Ok(CellState::from_set(next))
    }
}

fn representable(x: i128, y: i128) -> Option<Cell> {
    Some(Cell::new(i64::try_from(x).ok()?, i64::try_from(y).ok()?))
}

fn saturate(v: i128) -> i64 {
    v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

impl Evolver for NaiveEvolver {
    fn advance(&self, state: &CellState, steps: i64) -> Result<CellState, CoreError> {
        let steps = checked_steps(steps)?;
        let mut current = state.clone();
        for _ in 0..steps {
            if current.is_empty() {
                break;
            }
            current = self.step(&current)?;
        }
        Ok(current)
    }

    fn name(&self) -> &'static str {
        "naive"
    }
}
