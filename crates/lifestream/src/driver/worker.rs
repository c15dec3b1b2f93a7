//! Compute worker: runs evolver calls off the control thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};

use lifestream_core::{CellState, ComputationFailure, CoreError, Evolver};

use crate::error::DriverError;
use crate::metrics;

pub(crate) struct Job {
    pub(crate) epoch: u64,
    pub(crate) state: CellState,
    pub(crate) steps: i64,
}

pub(crate) struct Outcome {
    pub(crate) epoch: u64,
    pub(crate) result: Result<CellState, CoreError>,
    pub(crate) elapsed: Duration,
}

/// Spawn the worker. It exits once `jobs` is closed and drained.
///
/// `epoch` is the control loop's current epoch; jobs tagged with an older one
/// are skipped without calling the evolver.
pub(crate) fn spawn(
    evolver: Arc<dyn Evolver>,
    epoch: Arc<AtomicU64>,
    jobs: Receiver<Job>,
    outcomes: Sender<Outcome>,
) -> Result<JoinHandle<()>, DriverError> {
    const NAME: &str = "lifestream-compute";
    thread::Builder::new()
        .name(NAME.to_string())
        .spawn(move || run(&*evolver, &epoch, &jobs, &outcomes))
        .map_err(|err| DriverError::Spawn {
            name: NAME,
            reason: err.to_string(),
        })
}

fn run(
    evolver: &dyn Evolver,
    epoch: &AtomicU64,
    jobs: &Receiver<Job>,
    outcomes: &Sender<Outcome>,
) {
    for job in jobs.iter() {
        if job.epoch != epoch.load(Ordering::Acquire) {
            tracing::debug!(job_epoch = job.epoch, "skipping stale compute job");
            continue;
        }

        let started = Instant::now();
        let result = compute(evolver, &job.state, job.steps);
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => metrics::compute_ok(evolver.name(), job.steps.unsigned_abs(), elapsed),
            Err(_) => metrics::compute_err(evolver.name(), elapsed),
        }

        let outcome = Outcome {
            epoch: job.epoch,
            result,
            elapsed,
        };
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
    tracing::debug!("compute worker exiting");
}

fn compute(evolver: &dyn Evolver, state: &CellState, steps: i64) -> Result<CellState, CoreError> {
    panic::catch_unwind(AssertUnwindSafe(|| evolver.advance(state, steps))).unwrap_or_else(
        |payload| {
            let reason = panic_reason(payload.as_ref());
            tracing::error!(evolver = evolver.name(), %reason, "evolver panicked");
            Err(ComputationFailure::EvolverPanicked { reason }.into())
        },
    )
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel;

    use lifestream_core::NaiveEvolver;

    use super::*;

    struct Exploding;

    impl Evolver for Exploding {
        fn advance(&self, _: &CellState, _: i64) -> Result<CellState, CoreError> {
            panic!("boom");
        }

        fn name(&self) -> &'static str {
            "exploding"
        }
    }

    #[test]
    fn panics_become_computation_failures() {
        let result = compute(&Exploding, &CellState::empty(), 1);
        assert_eq!(
            result,
            Err(CoreError::Computation(ComputationFailure::EvolverPanicked {
                reason: "boom".to_string(),
            }))
        );
    }

    #[test]
    fn stale_jobs_are_skipped() {
        let epoch = Arc::new(AtomicU64::new(2));
        let (job_tx, job_rx) = channel::unbounded();
        let (out_tx, out_rx) = channel::unbounded();
        let evolver: Arc<dyn Evolver> = Arc::new(NaiveEvolver::new());
        let handle = spawn(evolver, Arc::clone(&epoch), job_rx, out_tx).unwrap();

        let blinker = CellState::from_cells([(0, 0), (1, 0), (2, 0)]);
        for job_epoch in [1, 2] {
            job_tx
                .send(Job {
                    epoch: job_epoch,
                    state: blinker.clone(),
                    steps: 2,
                })
                .unwrap();
        }
        drop(job_tx);
        handle.join().unwrap();

        let outcomes: Vec<Outcome> = out_rx.iter().collect();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].epoch, 2);
        assert_eq!(outcomes[0].result, Ok(blinker));
    }
}
