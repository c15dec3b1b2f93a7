#![forbid(unsafe_code)]

//! Two-state cellular automata on an unbounded grid.
//!
//! The crate is split by concern:
//!
//! - [`cell`]: the immutable alive-cell set that every evolver consumes and
//!   produces.
//! - [`rule`]: birth/survival rules in `B3/S23` notation.
//! - [`evolve`]: the [`Evolver`] capability, the naive evolver and the
//!   configurable delegate.
//! - [`hashlife`]: the canonical node store and the HashLife evolver.
//! - [`error`]: argument and computation errors shared by all of the above.

pub mod cell;
pub mod error;
pub mod evolve;
pub mod hashlife;
pub mod rule;

pub use cell::{BoundingBox, Cell, CellState};
pub use error::{ComputationFailure, CoreError, InvalidArgument, Transience};
pub use evolve::{
    Algorithm, AlgorithmSource, AlgorithmSwitch, ConfigurableEvolver, Evolver, Generations,
    NaiveEvolver,
};
pub use hashlife::{HashLifeEvolver, NodeStore, StoreStats};
pub use rule::Rule;
