//! The control loop: run state, tick timing and publication.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};

use lifestream_core::{CellState, CoreError, Evolver, NodeStore};

use crate::error::DriverError;
use crate::metrics;

use super::history::TickHistory;
use super::watch::SnapshotWatch;
use super::worker::{self, Job, Outcome};
use super::{DriverOptions, Pacing, Snapshot, Status};

pub(crate) enum Command {
    SetRunning(bool),
    SetSeed(CellState),
    SetPacing(Pacing),
    Resume,
    Shutdown,
}

/// Progress of the tick currently owned by the control loop.
enum Tick {
    Computing { start: Instant },
    /// Result is ready; published once `deadline` passes.
    Waiting {
        start: Instant,
        deadline: Instant,
        next: CellState,
    },
}

pub(crate) struct ControlLoop {
    pacing: Pacing,
    watch: Arc<SnapshotWatch>,
    node_store: Option<Arc<NodeStore>>,

    session: u64,
    generation: u64,
    state: CellState,
    running: bool,
    stopped: Option<CoreError>,
    history: TickHistory,
    tick: Option<Tick>,

    epoch: Arc<AtomicU64>,
    jobs: Sender<Job>,
    outcomes: Receiver<Outcome>,
}

impl ControlLoop {
    pub(crate) fn spawn(
        evolver: Arc<dyn Evolver>,
        pacing: Pacing,
        options: &DriverOptions,
        watch: Arc<SnapshotWatch>,
        commands: Receiver<Command>,
    ) -> Result<JoinHandle<()>, DriverError> {
        const NAME: &str = "lifestream-driver";
        let epoch = Arc::new(AtomicU64::new(0));
        let (jobs, job_rx) = channel::unbounded();
        let (outcome_tx, outcomes) = channel::unbounded();
        let algorithm = evolver.name();
        // The worker exits on its own once `jobs` is dropped with the loop.
        worker::spawn(evolver, Arc::clone(&epoch), job_rx, outcome_tx)?;

        let initial = watch.latest();
        let control = ControlLoop {
            pacing,
            watch,
            node_store: options.node_store.clone(),
            session: initial.session,
            generation: initial.generation,
            state: initial.state,
            running: false,
            stopped: None,
            history: TickHistory::default(),
            tick: None,
            epoch,
            jobs,
            outcomes,
        };

        tracing::info!(
            algorithm,
            generations_per_tick = pacing.generations_per_tick(),
            ticks_per_second = pacing.ticks_per_second(),
            "pacing driver started"
        );
        thread::Builder::new()
            .name(NAME.to_string())
            .spawn(move || control.run(commands))
            .map_err(|err| DriverError::Spawn {
                name: NAME,
                reason: err.to_string(),
            })
    }

    fn run(mut self, commands: Receiver<Command>) {
        loop {
            let timer = match &self.tick {
                Some(Tick::Waiting { deadline, .. }) => channel::at(*deadline),
                _ => channel::never(),
            };
            let outcomes = self.outcomes.clone();
            crossbeam::select! {
                recv(commands) -> msg => match msg {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => self.handle(command),
                },
                recv(outcomes) -> msg => match msg {
                    Ok(outcome) => self.on_outcome(outcome),
                    Err(_) => self.on_worker_lost(),
                },
                recv(timer) -> _ => self.on_deadline(),
            }
        }
        self.cancel();
        self.watch.close();
        tracing::info!(
            session = self.session,
            generation = self.generation,
            "pacing driver stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetRunning(true) | Command::Resume => self.start(),
            Command::SetRunning(false) => self.pause(),
            Command::SetSeed(seed) => self.reseed(seed),
            Command::SetPacing(pacing) => self.repace(pacing),
            Command::Shutdown => {}
        }
    }

    // =========================================================================
    // Run-state transitions
    // =========================================================================

    fn start(&mut self) {
        if self.ticking() {
            return;
        }
        if let Some(error) = self.stopped.take() {
            tracing::info!(%error, "resuming after failure");
        }
        self.running = true;
        self.cancel();
        tracing::info!(
            session = self.session,
            generation = self.generation,
            "running"
        );
        self.publish();
        self.begin_tick();
    }

    fn pause(&mut self) {
        let was_active = self.running || self.stopped.is_some();
        self.running = false;
        self.stopped = None;
        self.cancel();
        if was_active {
            tracing::info!(
                session = self.session,
                generation = self.generation,
                "paused"
            );
        }
        self.publish();
    }

    fn reseed(&mut self, seed: CellState) {
        self.cancel();
        self.stopped = None;
        self.session += 1;
        self.generation = 0;
        self.state = seed;
        tracing::info!(
            session = self.session,
            population = self.state.population(),
            running = self.running,
            "new seed"
        );
        self.publish();
        if self.running {
            self.begin_tick();
        }
    }

    fn repace(&mut self, pacing: Pacing) {
        self.pacing = pacing;
        tracing::info!(
            generations_per_tick = pacing.generations_per_tick(),
            ticks_per_second = pacing.ticks_per_second(),
            "pacing changed"
        );
        if self.ticking() {
            self.cancel();
            self.publish();
            self.begin_tick();
        }
    }

    /// Abandon the current tick and timing window.
    fn cancel(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if self.tick.take().is_some() {
            tracing::debug!(epoch = self.current_epoch(), "tick cancelled");
            metrics::tick_cancelled();
        }
        self.history.clear();
    }

    // =========================================================================
    // Tick lifecycle
    // =========================================================================

    fn ticking(&self) -> bool {
        self.running && self.stopped.is_none()
    }

    fn begin_tick(&mut self) {
        let start = Instant::now();
        let job = Job {
            epoch: self.current_epoch(),
            state: self.state.clone(),
            steps: self.pacing.steps(),
        };
        if self.jobs.send(job).is_err() {
            self.on_worker_lost();
            return;
        }
        self.tick = Some(Tick::Computing { start });
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        let current = matches!(self.tick, Some(Tick::Computing { .. }))
            && outcome.epoch == self.current_epoch();
        if !current {
            tracing::debug!(
                outcome_epoch = outcome.epoch,
                epoch = self.current_epoch(),
                reason = %DriverError::Cancelled,
                "discarding stale outcome"
            );
            return;
        }
        let Some(Tick::Computing { start }) = self.tick.take() else {
            return;
        };

        match outcome.result {
            Ok(next) => {
                tracing::trace!(elapsed = ?outcome.elapsed, "tick computed");
                self.tick = Some(Tick::Waiting {
                    start,
                    deadline: start + self.pacing.period(),
                    next,
                });
            }
            Err(error) => self.fail(error),
        }
    }

    fn on_deadline(&mut self) {
        let Some(Tick::Waiting { start, next, .. }) = self.tick.take() else {
            return;
        };
        let end = Instant::now();
        let generations = self.pacing.generations_per_tick();
        self.history.push(generations, start, end);
        self.state = next;
        self.generation = self.generation.saturating_add(generations);
        metrics::tick_published(end - start);
        if let Some(store) = &self.node_store {
            metrics::set_cache_nodes(store.len());
        }
        tracing::trace!(
            generation = self.generation,
            window = self.history.len(),
            "tick published"
        );
        self.publish();
        if self.ticking() {
            self.begin_tick();
        }
    }

    fn fail(&mut self, error: CoreError) {
        tracing::error!(
            session = self.session,
            generation = self.generation,
            %error,
            "evolver failed, stopping"
        );
        self.stopped = Some(error);
        self.cancel();
        self.publish();
    }

    fn on_worker_lost(&mut self) {
        self.outcomes = channel::never();
        let (jobs, _) = channel::bounded(0);
        self.jobs = jobs;
        self.fail(
            lifestream_core::ComputationFailure::EvolverPanicked {
                reason: "compute worker exited".to_string(),
            }
            .into(),
        );
    }

    // =========================================================================
    // Publication
    // =========================================================================

    fn status(&self) -> Status {
        if let Some(error) = &self.stopped {
            Status::Stopped {
                error: error.clone(),
            }
        } else if self.running {
            Status::Running {
                average_generations_per_second: self.history.average_generations_per_second(),
            }
        } else {
            Status::Paused
        }
    }

    fn publish(&self) {
        self.watch.publish(Snapshot {
            session: self.session,
            generation: self.generation,
            state: self.state.clone(),
            status: self.status(),
        });
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}
