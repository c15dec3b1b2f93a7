//! Real-time behaviour of the pacing driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use lifestream::config::Config;
use lifestream::core::{Algorithm, CellState, ComputationFailure, CoreError, Evolver, NaiveEvolver};
use lifestream::{
    DriverError, DriverOptions, DropReason, Engine, Pacing, PacingDriver, Snapshot,
    SnapshotSubscription, Status,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn glider() -> CellState {
    CellState::from_pattern(".O.\n..O\nOOO")
        .unwrap_or_else(|e| panic!("glider: {e}"))
}

fn blinker() -> CellState {
    CellState::from_cells([(0, 0), (1, 0), (2, 0)])
}

fn wait(sub: &SnapshotSubscription, pred: impl FnMut(&Snapshot) -> bool) -> Snapshot {
    sub.wait_for(TIMEOUT, pred)
        .unwrap_or_else(|e| panic!("waiting for snapshot: {e}"))
}

fn measured(snapshot: &Snapshot) -> bool {
    snapshot.status.average_generations_per_second().is_some()
}

fn fresh_window(snapshot: &Snapshot) -> bool {
    snapshot.status.is_running() && snapshot.status.average_generations_per_second().is_none()
}

fn naive() -> Arc<dyn Evolver> {
    Arc::new(NaiveEvolver::new())
}

fn pacing(generations_per_tick: u64, ticks_per_second: f64) -> Pacing {
    Pacing::new(generations_per_tick, ticks_per_second)
        .unwrap_or_else(|e| panic!("pacing: {e}"))
}

fn spawn(evolver: Arc<dyn Evolver>, pacing: Pacing) -> PacingDriver {
    PacingDriver::spawn(evolver, glider(), pacing)
        .unwrap_or_else(|e| panic!("spawn: {e}"))
}

/// Counts calls and fails exactly once, on call number `fail_on` (0-based).
struct FailOnce {
    calls: AtomicUsize,
    fail_on: usize,
}

impl FailOnce {
    fn new(fail_on: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

impl Evolver for FailOnce {
    fn advance(&self, state: &CellState, steps: i64) -> Result<CellState, CoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(ComputationFailure::CoordinateOverflow { x: 7, y: 7 }.into());
        }
        NaiveEvolver::new().advance(state, steps)
    }

    fn name(&self) -> &'static str {
        "fail_once"
    }
}

struct Panicking;

impl Evolver for Panicking {
    fn advance(&self, _: &CellState, _: i64) -> Result<CellState, CoreError> {
        panic!("evolver bug");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

#[test]
fn paused_driver_does_not_compute() {
    let evolver = Arc::new(FailOnce::new(usize::MAX));
    let driver = spawn(evolver.clone(), pacing(1, 100.0));
    thread::sleep(Duration::from_millis(100));
    let snapshot = driver.snapshot();
    assert_eq!(snapshot.status, Status::Paused);
    assert_eq!(snapshot.generation, 0);
    assert_eq!(snapshot.state, glider());
    assert_eq!(evolver.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn ticks_are_paced_and_step_by_generations_per_tick() {
    let paced = pacing(2, 50.0);
    let driver = spawn(naive(), paced);
    let sub = driver.subscribe();
    let started = Instant::now();
    driver.set_running(true).unwrap();

    let mut last_generation = 0;
    loop {
        let snapshot = sub.recv_timeout(TIMEOUT).unwrap();
        let received = started.elapsed();
        assert_eq!(snapshot.generation % 2, 0);
        assert!(
            snapshot.generation == last_generation || snapshot.generation == last_generation + 2,
            "{last_generation} -> {}",
            snapshot.generation
        );
        let ticks = u32::try_from(snapshot.generation / 2).unwrap();
        assert!(
            received >= paced.period() * ticks,
            "tick {ticks} arrived after {received:?}"
        );
        if let Some(avg) = snapshot.status.average_generations_per_second() {
            assert!(avg <= 2.0 * 50.0 * (1.0 + 1e-6), "{avg}");
        }
        last_generation = snapshot.generation;
        if snapshot.generation >= 12 {
            let expected = NaiveEvolver::new()
                .advance(&glider(), snapshot.generation as i64)
                .unwrap();
            assert_eq!(snapshot.state, expected);
            assert!(snapshot.status.average_generations_per_second().is_some());
            break;
        }
    }
}

#[test]
fn failure_stops_until_resumed() {
    let driver = spawn(Arc::new(FailOnce::new(2)), pacing(1, 100.0));
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();

    let stopped = wait(&sub, |s| s.status.is_stopped());
    assert_eq!(stopped.generation, 2);
    assert_eq!(
        stopped.status,
        Status::Stopped {
            error: ComputationFailure::CoordinateOverflow { x: 7, y: 7 }.into(),
        }
    );

    thread::sleep(Duration::from_millis(100));
    let still = driver.snapshot();
    assert!(still.status.is_stopped());
    assert_eq!(still.generation, 2);

    driver.resume().unwrap();
    let resumed = wait(&sub, |s| s.generation >= 4);
    assert!(resumed.status.is_running());
    assert_eq!(
        resumed.state,
        NaiveEvolver::new().advance(&glider(), 4).unwrap()
    );
}

#[test]
fn evolver_panic_is_reported_as_stopped() {
    let driver = spawn(Arc::new(Panicking), pacing(1, 100.0));
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();

    let stopped = wait(&sub, |s| s.status.is_stopped());
    match stopped.status {
        Status::Stopped {
            error: CoreError::Computation(ComputationFailure::EvolverPanicked { reason }),
        } => assert_eq!(reason, "evolver bug"),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(stopped.generation, 0);
    assert_eq!(stopped.state, glider());
}

#[test]
fn pausing_clears_measured_throughput() {
    let driver = spawn(naive(), pacing(1, 100.0));
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();
    wait(&sub, measured);

    driver.set_running(false).unwrap();
    let paused = wait(&sub, |s| s.status == Status::Paused);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(driver.snapshot().generation, paused.generation);

    driver.set_running(true).unwrap();
    let restarted = wait(&sub, |s| s.status.is_running());
    assert_eq!(
        restarted.status,
        Status::Running {
            average_generations_per_second: None,
        }
    );
    assert_eq!(restarted.generation, paused.generation);
}

#[test]
fn new_seed_starts_a_new_session() {
    let driver = spawn(naive(), pacing(1, 200.0));
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();
    wait(&sub, |s| s.generation >= 3);

    driver.set_seed(blinker()).unwrap();
    let fresh = wait(&sub, |s| s.session == 1);
    assert_eq!(fresh.generation, 0);
    assert_eq!(fresh.state, blinker());
    assert_eq!(
        fresh.status,
        Status::Running {
            average_generations_per_second: None,
        }
    );

    for _ in 0..5 {
        let next = sub.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(next.session, 1);
        let expected = NaiveEvolver::new()
            .advance(&blinker(), next.generation as i64)
            .unwrap();
        assert_eq!(next.state, expected);
    }
}

#[test]
fn changing_pacing_restarts_timing() {
    let driver = spawn(naive(), pacing(1, 100.0));
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();
    wait(&sub, measured);

    driver.set_pacing(pacing(3, 100.0)).unwrap();
    let restarted = wait(&sub, fresh_window);
    let next = wait(&sub, |s| s.generation != restarted.generation);
    assert_eq!(next.generation, restarted.generation + 3);
    assert_eq!(next.session, restarted.session);
}

#[test]
fn faster_pacing_abandons_the_slow_deadline() {
    // One tick every five seconds.
    let driver = spawn(naive(), pacing(1, 0.2));
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();
    let running = wait(&sub, |s| s.status.is_running());
    assert_eq!(running.generation, 0);

    let switched = Instant::now();
    driver.set_pacing(pacing(1, 100.0)).unwrap();
    let next = wait(&sub, |s| s.generation >= 1);
    let waited = switched.elapsed();
    let limit = Duration::from_secs(2);
    assert!(waited < limit, "next tick after {waited:?}");
    assert_eq!(next.generation, 1);
    assert_eq!(next.session, running.session);
    let expected = NaiveEvolver::new().advance(&glider(), 1).unwrap();
    assert_eq!(next.state, expected);
}

#[test]
fn lagging_subscriber_is_dropped_and_driver_keeps_going() {
    let options = DriverOptions {
        subscriber_buffer: 2,
        ..DriverOptions::default()
    };
    let driver = PacingDriver::spawn_with(naive(), glider(), pacing(1, 200.0), options)
        .unwrap_or_else(|e| panic!("spawn: {e}"));
    let idle = driver.subscribe();
    driver.set_running(true).unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while driver.snapshot().generation < 10 {
        assert!(Instant::now() < deadline, "driver stalled");
        thread::sleep(Duration::from_millis(5));
    }

    let mut drained = 0;
    let err = loop {
        match idle.recv_timeout(TIMEOUT) {
            Ok(_) => drained += 1,
            Err(err) => break err,
        }
    };
    assert_eq!(err, DriverError::Disconnected);
    assert!(drained <= 2);
    assert_eq!(idle.drop_reason(), Some(DropReason::Lagged));

    let fresh = driver.subscribe();
    let current = fresh.recv_timeout(TIMEOUT).unwrap();
    assert!(current.generation >= 10);
}

#[test]
fn shutdown_ends_subscriptions() {
    let driver = spawn(naive(), pacing(1, 100.0));
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();
    wait(&sub, |s| s.generation >= 1);

    driver.shutdown();
    loop {
        match sub.recv_timeout(TIMEOUT) {
            Ok(_) => continue,
            Err(err) => {
                assert_eq!(err, DriverError::Disconnected);
                break;
            }
        }
    }
    assert_eq!(sub.drop_reason(), None);
}

#[test]
fn engine_switches_algorithm_mid_run() {
    let mut config = Config::default();
    config.engine.algorithm = Algorithm::Naive;
    config.engine.max_cache_nodes = Some(10_000);
    config.pacing.ticks_per_second = 200.0;
    config.pacing.generations_per_tick = 4;

    let engine = Engine::new(&config.engine);
    let driver = engine.spawn_driver(&config, glider()).unwrap();
    let sub = driver.subscribe();
    driver.set_running(true).unwrap();
    wait(&sub, |s| s.generation >= 8);

    engine.set_algorithm(Algorithm::HashLife);
    let later = wait(&sub, |s| s.generation >= 40);
    let offset = i64::try_from(later.generation / 4).unwrap();
    assert_eq!(later.state, glider().translated(offset, offset).unwrap());
}
