//! Real-time pacing of an evolver into an observable stream of snapshots.
//!
//! A [`PacingDriver`] owns two threads:
//!
//! - the control loop, which waits on commands, compute outcomes and the tick
//!   deadline, and is the only writer of the snapshot watch;
//! - the compute worker, which runs one evolver call at a time.
//!
//! Every pause, reseed or pacing change bumps an epoch. Work tagged with an
//! older epoch is skipped or discarded, so the stream never mixes sessions and
//! never blocks on an evolver call.

mod control;
mod history;
mod watch;
mod worker;

pub use watch::{DropReason, SnapshotSubscription};

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use lifestream_core::{CellState, CoreError, Evolver, InvalidArgument, NodeStore};

use crate::error::DriverError;

use control::{Command, ControlLoop};
use watch::SnapshotWatch;

/// Generations per tick and target tick rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    generations_per_tick: u64,
    ticks_per_second: f64,
    period: Duration,
}

impl Pacing {
    pub fn new(generations_per_tick: u64, ticks_per_second: f64) -> Result<Self, InvalidArgument> {
        if generations_per_tick == 0 || i64::try_from(generations_per_tick).is_err() {
            return Err(InvalidArgument::GenerationsPerTick {
                value: generations_per_tick,
            });
        }
        let invalid_rate = InvalidArgument::TicksPerSecond {
            value: ticks_per_second,
        };
        if !ticks_per_second.is_finite() || ticks_per_second <= 0.0 {
            return Err(invalid_rate);
        }
        let period = Duration::try_from_secs_f64(ticks_per_second.recip())
            .map_err(|_| invalid_rate)?;
        Ok(Self {
            generations_per_tick,
            ticks_per_second,
            period,
        })
    }

    pub fn generations_per_tick(&self) -> u64 {
        self.generations_per_tick
    }

    pub fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }

    /// Minimum wall time of one tick.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn steps(&self) -> i64 {
        // Bounded by the constructor.
        self.generations_per_tick as i64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Paused,
    /// `None` until at least one tick of the current run has completed.
    Running {
        average_generations_per_second: Option<f64>,
    },
    /// An evolver call failed; nothing runs until `resume`, `set_running(true)`
    /// or a new seed.
    Stopped { error: CoreError },
}

impl Status {
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Status::Stopped { .. })
    }

    pub fn average_generations_per_second(&self) -> Option<f64> {
        match self {
            Status::Running {
                average_generations_per_second,
            } => *average_generations_per_second,
            _ => None,
        }
    }
}

/// One published observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Incremented on every new seed.
    pub session: u64,
    /// Generations since the session's seed.
    pub generation: u64,
    pub state: CellState,
    pub status: Status,
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Per-subscriber queue length before a subscriber is dropped.
    pub subscriber_buffer: usize,
    /// Start ticking immediately instead of paused.
    pub start_running: bool,
    /// Store whose size is reported as the `cache_nodes` gauge after each tick.
    pub node_store: Option<Arc<NodeStore>>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            start_running: false,
            node_store: None,
        }
    }
}

/// Handle to a running driver. Dropping it shuts the driver down.
pub struct PacingDriver {
    commands: Sender<Command>,
    watch: Arc<SnapshotWatch>,
    control: Option<JoinHandle<()>>,
}

impl PacingDriver {
    /// Start paused on `seed`.
    pub fn spawn(
        evolver: Arc<dyn Evolver>,
        seed: CellState,
        pacing: Pacing,
    ) -> Result<Self, DriverError> {
        Self::spawn_with(evolver, seed, pacing, DriverOptions::default())
    }

    pub fn spawn_with(
        evolver: Arc<dyn Evolver>,
        seed: CellState,
        pacing: Pacing,
        options: DriverOptions,
    ) -> Result<Self, DriverError> {
        let initial = Snapshot {
            session: 0,
            generation: 0,
            state: seed,
            status: Status::Paused,
        };
        let watch = Arc::new(SnapshotWatch::new(initial, options.subscriber_buffer));
        let (commands, command_rx) = channel::unbounded();
        let control =
            ControlLoop::spawn(evolver, pacing, &options, Arc::clone(&watch), command_rx)?;
        let driver = Self {
            commands,
            watch,
            control: Some(control),
        };
        if options.start_running {
            driver.set_running(true)?;
        }
        Ok(driver)
    }

    pub fn set_running(&self, running: bool) -> Result<(), DriverError> {
        self.send(Command::SetRunning(running))
    }

    /// Start a new session from `seed`, abandoning pending work.
    pub fn set_seed(&self, seed: CellState) -> Result<(), DriverError> {
        self.send(Command::SetSeed(seed))
    }

    pub fn set_pacing(&self, pacing: Pacing) -> Result<(), DriverError> {
        self.send(Command::SetPacing(pacing))
    }

    /// Clear a `Stopped` status and run again from the current state.
    pub fn resume(&self) -> Result<(), DriverError> {
        self.send(Command::Resume)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.watch.latest()
    }

    pub fn subscribe(&self) -> SnapshotSubscription {
        self.watch.subscribe()
    }

    /// Stop both threads. Subscriptions end after draining.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(control) = self.control.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if control.join().is_err() {
            tracing::error!("driver control thread panicked");
            self.watch.close();
        }
    }

    fn send(&self, command: Command) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .map_err(|_| DriverError::Disconnected)
    }
}

impl Drop for PacingDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PacingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacingDriver")
            .field("latest", &self.watch.latest())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_validates_inputs() {
        assert!(matches!(
            Pacing::new(0, 10.0),
            Err(InvalidArgument::GenerationsPerTick { value: 0 })
        ));
        assert!(Pacing::new(u64::MAX, 10.0).is_err());
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-300] {
            assert!(
                matches!(Pacing::new(1, rate), Err(InvalidArgument::TicksPerSecond { .. })),
                "{rate}"
            );
        }
        let pacing = Pacing::new(4, 20.0).unwrap();
        assert_eq!(pacing.period(), Duration::from_millis(50));
        assert_eq!(pacing.steps(), 4);
    }

    #[test]
    fn status_accessors() {
        let running = Status::Running {
            average_generations_per_second: Some(12.5),
        };
        assert!(running.is_running());
        assert_eq!(running.average_generations_per_second(), Some(12.5));
        assert_eq!(Status::Paused.average_generations_per_second(), None);
        assert!(!Status::Paused.is_stopped());
    }
}
