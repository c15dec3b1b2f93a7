//! Algorithm-independent set of alive cells.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ComputationFailure, InvalidArgument};

/// A single grid coordinate. `y` grows downwards, matching pattern text rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i64,
    pub y: i64,
}

impl Cell {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<(i64, i64)> for Cell {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Inclusive bounds of a non-empty cell set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl BoundingBox {
    pub fn width(&self) -> u128 {
        u128::from(self.max_x.abs_diff(self.min_x)) + 1
    }

    pub fn height(&self) -> u128 {
        u128::from(self.max_y.abs_diff(self.min_y)) + 1
    }
}

/// Immutable set of alive cells.
///
/// Cloning is cheap: the set is shared. Every generation produces a new value.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct CellState {
    cells: Arc<BTreeSet<Cell>>,
}

impl CellState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_cells<I, C>(cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        Self {
            cells: Arc::new(cells.into_iter().map(Into::into).collect()),
        }
    }

    pub(crate) fn from_set(cells: BTreeSet<Cell>) -> Self {
        Self {
            cells: Arc::new(cells),
        }
    }

    /// Parse a plain-text block where `O`, `*` or `#` is alive and `.` or a
    /// space is dead. Lines starting with `!` are comments and do not count as
    /// rows.
    pub fn from_pattern(text: &str) -> Result<Self, InvalidArgument> {
        let mut cells = BTreeSet::new();
        let mut row = 0i64;
        for (line_idx, line) in text.lines().enumerate() {
            if line.starts_with('!') {
                continue;
            }
            for (column, ch) in line.chars().enumerate() {
                match ch {
                    'O' | '*' | '#' => {
                        cells.insert(Cell::new(column as i64, row));
                    }
                    '.' | ' ' | '\t' => {}
                    found => {
                        return Err(InvalidArgument::Pattern {
                            line: line_idx + 1,
                            column: column + 1,
                            found,
                        });
                    }
                }
            }
            row += 1;
        }
        Ok(Self::from_set(cells))
    }

    pub fn population(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    /// Cells in ascending `(x, y)` order.
    pub fn iter(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().copied()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut iter = self.cells.iter();
        let first = iter.next()?;
        let mut bounds = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for cell in iter {
            bounds.min_x = bounds.min_x.min(cell.x);
            bounds.min_y = bounds.min_y.min(cell.y);
            bounds.max_x = bounds.max_x.max(cell.x);
            bounds.max_y = bounds.max_y.max(cell.y);
        }
        Some(bounds)
    }

    pub fn translated(&self, dx: i64, dy: i64) -> Result<Self, ComputationFailure> {
        self.map_cells(|cell| {
            let x = cell.x.checked_add(dx)?;
            let y = cell.y.checked_add(dy)?;
            Some(Cell::new(x, y))
        })
    }

    /// Reflect across the vertical axis (`x -> -x`).
    pub fn flipped_horizontal(&self) -> Result<Self, ComputationFailure> {
        self.map_cells(|cell| Some(Cell::new(cell.x.checked_neg()?, cell.y)))
    }

    /// Reflect across the horizontal axis (`y -> -y`).
    pub fn flipped_vertical(&self) -> Result<Self, ComputationFailure> {
        self.map_cells(|cell| Some(Cell::new(cell.x, cell.y.checked_neg()?)))
    }

    /// Reflect across the main diagonal (`x <-> y`).
    pub fn transposed(&self) -> Self {
        Self::from_cells(self.cells.iter().map(|cell| Cell::new(cell.y, cell.x)))
    }

    fn map_cells(&self, f: impl Fn(Cell) -> Option<Cell>) -> Result<Self, ComputationFailure> {
        let mut out = BTreeSet::new();
        for &cell in self.cells.iter() {
            let mapped = f(cell).ok_or(ComputationFailure::CoordinateOverflow {
                x: cell.x,
                y: cell.y,
            })?;
            out.insert(mapped);
        }
        Ok(Self::from_set(out))
    }
}

impl fmt::Debug for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.cells.iter()).finish()
    }
}

impl<C: Into<Cell>> FromIterator<C> for CellState {
    fn from_iter<T: IntoIterator<Item = C>>(iter: T) -> Self {
        Self::from_cells(iter)
    }
}
