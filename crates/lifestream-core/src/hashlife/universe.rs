//! Embedding a `CellState` into a quadtree and stepping it by arbitrary counts.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cell::{Cell, CellState};
use crate::error::ComputationFailure;

use super::node::{LEAF_LEVEL, NodeRef};
use super::store::NodeStore;

/// Smallest root level the padding check can inspect (centre of centre must
/// still be a branch).
const MIN_ROOT_LEVEL: u32 = 5;

/// Keeps origin arithmetic comfortably inside `i128`.
const MAX_ROOT_LEVEL: u32 = 100;

/// A root node anchored at an absolute top-left coordinate.
pub(crate) struct Universe {
    root: NodeRef,
    origin_x: i128,
    origin_y: i128,
}

impl Universe {
    pub(crate) fn encode(store: &NodeStore, state: &CellState) -> Self {
        let Some(bounds) = state.bounding_box() else {
            return Self {
                root: store.empty(MIN_ROOT_LEVEL),
                origin_x: 0,
                origin_y: 0,
            };
        };
        let size = bounds.width().max(bounds.height());
        let level = ceil_log2(size).max(LEAF_LEVEL + 1);

        let min_x = i128::from(bounds.min_x);
        let min_y = i128::from(bounds.min_y);
        let mut cells: Vec<(u128, u128)> = state
            .iter()
            .map(|cell| {
                (
                    (i128::from(cell.x) - min_x) as u128,
                    (i128::from(cell.y) - min_y) as u128,
                )
            })
            .collect();

        Self {
            root: build(store, level, &mut cells),
            origin_x: min_x,
            origin_y: min_y,
        }
    }

    pub(crate) fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Advance by `steps` generations: one jump of `2^k` per set bit `k`.
    pub(crate) fn advance(
        &mut self,
        store: &NodeStore,
        steps: u64,
    ) -> Result<(), ComputationFailure> {
        let mut remaining = steps;
        let mut k = 0u32;
        while remaining != 0 && !self.root.is_empty() {
            if remaining & 1 == 1 {
                self.jump(store, k)?;
            }
            remaining >>= 1;
            k += 1;
        }
        Ok(())
    }

    fn jump(&mut self, store: &NodeStore, k: u32) -> Result<(), ComputationFailure> {
        self.pad_for_jump(store, k)?;
        let quarter = 1i128 << (self.root.level() - 2);
        self.root = store.advance_by(&self.root, k);
        self.origin_x += quarter;
        self.origin_y += quarter;
        Ok(())
    }

    /// Grow the root until it is deep enough for a `2^k` jump and every live
    /// cell sits in the central quarter-width square, so the pattern cannot
    /// reach the edge of the result region within the jump.
    fn pad_for_jump(&mut self, store: &NodeStore, k: u32) -> Result<(), ComputationFailure> {
        let min_level = (k + 3).max(MIN_ROOT_LEVEL);
        while self.root.level() < min_level || !self.is_padded(store) {
            if self.root.level() >= MAX_ROOT_LEVEL {
                return Err(ComputationFailure::UniverseTooLarge {
                    level: self.root.level() + 1,
                });
            }
            let half = 1i128 << (self.root.level() - 1);
            self.root = store.expand(&self.root);
            self.origin_x -= half;
            self.origin_y -= half;
        }
        Ok(())
    }

    fn is_padded(&self, store: &NodeStore) -> bool {
        if self.root.level() < MIN_ROOT_LEVEL {
            return false;
        }
        let inner = store.center(&store.center(&self.root));
        inner.population() == self.root.population()
    }

    pub(crate) fn decode(&self) -> Result<CellState, ComputationFailure> {
        let mut cells = BTreeSet::new();
        collect_cells(&self.root, self.origin_x, self.origin_y, &mut cells)?;
        Ok(CellState::from_set(cells))
    }
}

fn ceil_log2(size: u128) -> u32 {
    if size <= 1 {
        0
    } else {
        128 - (size - 1).leading_zeros()
    }
}

/// Build the canonical node of `level` holding `cells` (relative to its
/// top-left). Reorders and rewrites `cells` in place.
fn build(store: &NodeStore, level: u32, cells: &mut [(u128, u128)]) -> NodeRef {
    if cells.is_empty() {
        return store.empty(level);
    }
    if level == LEAF_LEVEL {
        let bits = cells
            .iter()
            .fold(0u16, |acc, &(x, y)| acc | 1 << ((y * 4 + x) as u32));
        return store.leaf(bits);
    }

    let half = 1u128 << (level - 1);
    let quadrant = |&(x, y): &(u128, u128)| usize::from(x >= half) + 2 * usize::from(y >= half);
    cells.sort_unstable_by_key(quadrant);

    let mut rest = cells;
    let [nw, ne, sw, se]: [NodeRef; 4] = std::array::from_fn(|q| {
        let split = rest
            .iter()
            .position(|cell| quadrant(cell) != q)
            .unwrap_or(rest.len());
        let (mine, tail) = std::mem::take(&mut rest).split_at_mut(split);
        rest = tail;
        for cell in mine.iter_mut() {
            if q & 1 == 1 {
                cell.0 -= half;
            }
            if q & 2 == 2 {
                cell.1 -= half;
            }
        }
        build(store, level - 1, mine)
    });
    store.join(nw, ne, sw, se)
}

fn collect_cells(
    node: &NodeRef,
    x0: i128,
    y0: i128,
    out: &mut BTreeSet<Cell>,
) -> Result<(), ComputationFailure> {
    if node.is_empty() {
        return Ok(());
    }
    if let Some(bits) = node.leaf_bits() {
        for i in 0..16i128 {
            if bits & (1 << i) != 0 {
                out.insert(to_cell(x0 + (i % 4), y0 + (i / 4))?);
            }
        }
        return Ok(());
    }
    let half = 1i128 << (node.level() - 1);
    if let Some(children) = node.children() {
        for (i, child) in children.iter().enumerate() {
            let dx = if i & 1 == 1 { half } else { 0 };
            let dy = if i & 2 == 2 { half } else { 0 };
            collect_cells(child, x0 + dx, y0 + dy, out)?;
        }
    }
    Ok(())
}

fn to_cell(x: i128, y: i128) -> Result<Cell, ComputationFailure> {
    match (i64::try_from(x), i64::try_from(y)) {
        (Ok(x), Ok(y)) => Ok(Cell::new(x, y)),
        _ => Err(ComputationFailure::CoordinateOverflow {
            x: x.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64,
            y: y.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64,
        }),
    }
}

impl std::fmt::Debug for Universe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Universe")
            .field("level", &self.root.level())
            .field("population", &self.root.population())
            .field("origin", &(self.origin_x, self.origin_y))
            .field("root_id", &Arc::as_ptr(&self.root))
            .finish()
    }
}
