#![forbid(unsafe_code)]

//! Real-time, observable evolution of two-state cellular automata.
//!
//! [`lifestream_core`] (re-exported as [`core`]) holds the cell model and the
//! evolvers. This crate adds the pacing driver that turns an evolver into a
//! throttled, cancellable stream of snapshots, together with configuration,
//! logging and metrics.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use lifestream_core as core;

pub use driver::{
    DriverOptions, DropReason, Pacing, PacingDriver, Snapshot, SnapshotSubscription, Status,
};
pub use engine::Engine;
pub use error::{ConfigError, DriverError, Error, Result};
