//! State-change notification.
//!
//! Two delivery paths share one contract: the single-slot callback supplied
//! at initialization, and any number of channel subscriptions. Both are fed
//! outside the state lock, in commit order, and only when the state value
//! actually changed.
//!
//! Committers hand their change to a sequence-ordered queue. Whichever
//! thread finds the queue idle drains it, delivering changes strictly by
//! `seq`; a change that arrives ahead of a missing predecessor waits in the
//! queue until the predecessor's committer shows up and drains both.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use ntrc_common::consts::HANDLER_NAME;
use ntrc_common::tracer::state::TracerState;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Callback invoked with the new state after each distinct transition.
///
/// Calls never overlap and arrive in commit order, but may run on whichever
/// committing thread drains the queue, after later transitions have already
/// landed. A callback may query or change the state; a change it makes is
/// delivered after it returns.
pub type StateCallback = Box<dyn Fn(TracerState) + Send + Sync>;

/// One committed state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// Commit sequence number, assigned under the state lock.
    pub seq: u64,
    /// State before the transition.
    pub previous: TracerState,
    /// State after the transition.
    pub current: TracerState,
}

#[derive(Default)]
struct DeliveryQueue {
    /// Sequence number of the last delivered change.
    delivered: u64,
    pending: BTreeMap<u64, StateChange>,
    draining: bool,
}

/// Fan-out of state changes to the callback and subscribers.
#[derive(Default)]
pub struct StateNotifier {
    callback: Option<StateCallback>,
    subscribers: Mutex<Vec<Sender<StateChange>>>,
    queue: Mutex<DeliveryQueue>,
}

impl StateNotifier {
    /// Notifier with an optional callback and no subscribers.
    pub fn new(callback: Option<StateCallback>) -> Self {
        Self {
            callback,
            subscribers: Mutex::new(Vec::new()),
            queue: Mutex::new(DeliveryQueue::default()),
        }
    }

    /// Register a new channel subscriber.
    pub fn subscribe(&self) -> StateSubscription {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        StateSubscription { rx }
    }

    /// Queue a change and deliver everything that is now in sequence.
    ///
    /// Sequence numbers start at 1 and every number must be handed in
    /// exactly once. Must not be called with the state lock held.
    pub(crate) fn deliver(&self, change: StateChange) {
        let mut queue = self.queue.lock();
        queue.pending.insert(change.seq, change);
        if queue.draining {
            return;
        }
        queue.draining = true;

        loop {
            let next = queue.delivered + 1;
            let Some(change) = queue.pending.remove(&next) else {
                queue.draining = false;
                return;
            };
            drop(queue);
            self.dispatch(change);
            queue = self.queue.lock();
            queue.delivered = next;
        }
    }

    fn dispatch(&self, change: StateChange) {
        if let Some(callback) = &self.callback {
            callback(change.current);
        }

        // Disconnected subscribers are pruned on send failure.
        self.subscribers
            .lock()
            .retain(|tx| tx.send(change).is_ok());
    }

    /// Number of live subscribers (pruned lazily on delivery).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Receiving end of a state-change subscription.
///
/// Dropping the subscription unregisters it on the next delivery.
pub struct StateSubscription {
    rx: Receiver<StateChange>,
}

impl StateSubscription {
    /// Next change if one is already queued.
    pub fn try_next(&self) -> Option<StateChange> {
        match self.rx.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait until a change lands in one of `targets` or in a shutdown-class
    /// state, up to `timeout`. Returns the matching state.
    pub fn wait_for(&self, targets: &[TracerState], timeout: Duration) -> Option<TracerState> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let change = self.rx.recv_timeout(remaining).ok()?;
            if targets.contains(&change.current) || change.current.is_shutdown_class() {
                return Some(change.current);
            }
        }
    }

    /// Drain every queued change.
    pub fn drain(&self) -> Vec<StateChange> {
        self.rx.try_iter().collect()
    }
}

/// Notification text sent to the host for a new state.
pub fn format_notification(state: TracerState) -> String {
    format!("{HANDLER_NAME}!new_state=0x{:08x}", state.as_dword())
}
