//! Latest-value cell plus ordered, bounded subscriptions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::DriverError;
use crate::metrics;

use super::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The subscriber's buffer filled up.
    Lagged,
}

struct Subscriber {
    sender: Sender<Snapshot>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

struct WatchState {
    latest: Snapshot,
    subscribers: Vec<Subscriber>,
    closed: bool,
}

pub(crate) struct SnapshotWatch {
    state: Mutex<WatchState>,
    buffer: usize,
}

impl SnapshotWatch {
    pub(crate) fn new(initial: Snapshot, buffer: usize) -> Self {
        Self {
            state: Mutex::new(WatchState {
                latest: initial,
                subscribers: Vec::new(),
                closed: false,
            }),
            buffer: buffer.max(1),
        }
    }

    pub(crate) fn latest(&self) -> Snapshot {
        self.lock().latest.clone()
    }

    /// New subscription whose first item is the current snapshot.
    pub(crate) fn subscribe(&self) -> SnapshotSubscription {
        let (sender, receiver) = channel::bounded(self.buffer);
        let drop_reason = Arc::new(Mutex::new(None));
        let mut state = self.lock();
        // Capacity is at least one, so the initial send cannot fail.
        let _ = sender.try_send(state.latest.clone());
        if !state.closed {
            state.subscribers.push(Subscriber {
                sender,
                drop_reason: Arc::clone(&drop_reason),
            });
        }
        SnapshotSubscription {
            receiver,
            drop_reason,
        }
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        let mut state = self.lock();
        state.subscribers.retain(|sub| match sub.sender.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                *reason_slot(&sub.drop_reason) = Some(DropReason::Lagged);
                tracing::debug!(
                    generation = snapshot.generation,
                    "dropping lagging subscriber"
                );
                metrics::subscriber_dropped();
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        state.latest = snapshot;
    }

    /// Disconnect every subscription once it has drained its buffer.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordered stream of snapshots from a driver.
///
/// Ends with [`DriverError::Disconnected`] when the driver shuts down or when
/// this subscriber fell too far behind; [`Self::drop_reason`] tells the two
/// apart.
pub struct SnapshotSubscription {
    receiver: Receiver<Snapshot>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl SnapshotSubscription {
    pub fn recv(&self) -> Result<Snapshot, DriverError> {
        self.receiver.recv().map_err(|_| DriverError::Disconnected)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Snapshot, DriverError> {
        self.receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => DriverError::Timeout { waited: timeout },
            RecvTimeoutError::Disconnected => DriverError::Disconnected,
        })
    }

    /// `Ok(None)` when nothing is queued right now.
    pub fn try_recv(&self) -> Result<Option<Snapshot>, DriverError> {
        match self.receiver.try_recv() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DriverError::Disconnected),
        }
    }

    /// Receive until a snapshot satisfies `pred`, skipping the rest.
    pub fn wait_for<P>(&self, timeout: Duration, mut pred: P) -> Result<Snapshot, DriverError>
    where
        P: FnMut(&Snapshot) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let snapshot = self.receiver.recv_timeout(remaining).map_err(|err| match err {
                RecvTimeoutError::Timeout => DriverError::Timeout { waited: timeout },
                RecvTimeoutError::Disconnected => DriverError::Disconnected,
            })?;
            if pred(&snapshot) {
                return Ok(snapshot);
            }
        }
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        *reason_slot(&self.drop_reason)
    }
}

fn reason_slot(slot: &Mutex<Option<DropReason>>) -> MutexGuard<'_, Option<DropReason>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use lifestream_core::CellState;

    use super::*;
    use crate::driver::Status;

    fn snapshot(generation: u64) -> Snapshot {
        Snapshot {
            session: 0,
            generation,
            state: CellState::empty(),
            status: Status::Paused,
        }
    }

    #[test]
    fn subscription_starts_with_latest_and_stays_ordered() {
        let watch = SnapshotWatch::new(snapshot(0), 8);
        watch.publish(snapshot(1));
        let sub = watch.subscribe();
        watch.publish(snapshot(2));
        watch.publish(snapshot(3));
        let seen: Vec<u64> = (0..3).map(|_| sub.recv().unwrap().generation).collect();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(sub.try_recv().unwrap(), None);
        assert_eq!(watch.latest().generation, 3);
    }

    #[test]
    fn lagging_subscriber_is_dropped_without_blocking() {
        let watch = SnapshotWatch::new(snapshot(0), 2);
        let slow = watch.subscribe();
        let fast = watch.subscribe();
        for generation in 1..=5 {
            watch.publish(snapshot(generation));
            while fast.try_recv().unwrap().is_some() {}
        }
        // Buffered items drain, then the stream ends.
        assert_eq!(slow.recv().unwrap().generation, 0);
        assert_eq!(slow.recv().unwrap().generation, 1);
        assert_eq!(slow.recv(), Err(DriverError::Disconnected));
        assert_eq!(slow.drop_reason(), Some(DropReason::Lagged));
        assert_eq!(fast.drop_reason(), None);
        assert_eq!(watch.latest().generation, 5);
    }

    #[test]
    fn close_ends_subscriptions() {
        let watch = SnapshotWatch::new(snapshot(0), 4);
        let sub = watch.subscribe();
        watch.close();
        assert_eq!(sub.recv().unwrap().generation, 0);
        assert_eq!(sub.recv(), Err(DriverError::Disconnected));
        assert_eq!(sub.drop_reason(), None);

        let late = watch.subscribe();
        assert_eq!(late.recv().unwrap().generation, 0);
        assert_eq!(late.recv(), Err(DriverError::Disconnected));
    }

    #[test]
    fn wait_for_times_out() {
        let watch = SnapshotWatch::new(snapshot(0), 4);
        let sub = watch.subscribe();
        let err = sub
            .wait_for(Duration::from_millis(20), |s| s.generation > 0)
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout { .. }));
    }
}
