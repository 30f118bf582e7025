//! Lock-guarded tracer state.
//!
//! `StateStore` owns the single state value and the captured DMA addresses.
//! `state`, `set_state` and `set_state_if_current_equals` are the only paths
//! that touch the state value; every one of them takes the lock once and
//! delivers notifications after releasing it.

use crate::notify::{StateCallback, StateChange, StateNotifier, StateSubscription};
use ntrc_common::tracer::registers::DmaAddresses;
use ntrc_common::tracer::state::TracerState;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Last DMA addresses published by the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturedDma {
    /// Real (un-hidden) push address and pull address.
    pub addresses: DmaAddresses,
    /// Whether `addresses` may be used. Cleared when the worker resumes
    /// normal operation or shuts down.
    pub valid: bool,
}

struct StoreInner {
    state: TracerState,
    seq: u64,
    dma: CapturedDma,
}

/// Shared tracer state guarded by one mutex.
pub struct StateStore {
    inner: Mutex<StoreInner>,
    notifier: StateNotifier,
}

impl StateStore {
    /// Create a store in `Uninitialized` with an optional change callback.
    pub fn new(callback: Option<StateCallback>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state: TracerState::Uninitialized,
                seq: 0,
                dma: CapturedDma::default(),
            }),
            notifier: StateNotifier::new(callback),
        }
    }

    /// Current state.
    pub fn state(&self) -> TracerState {
        self.inner.lock().state
    }

    /// Write `new_state` unconditionally.
    ///
    /// Returns `true` if the value changed; only then are observers notified.
    pub fn set_state(&self, new_state: TracerState) -> bool {
        let change = {
            let mut inner = self.inner.lock();
            Self::commit(&mut inner, new_state)
        };
        self.publish(change)
    }

    /// Atomically replace the state with `new_state` if it equals `expected`.
    ///
    /// Returns whether the swap occurred. Observers are notified only when
    /// the swap occurred and changed the value.
    pub fn set_state_if_current_equals(
        &self,
        expected: TracerState,
        new_state: TracerState,
    ) -> bool {
        let change = {
            let mut inner = self.inner.lock();
            if inner.state != expected {
                trace!(
                    "Compare-and-set rejected: expected {}, found {}",
                    expected, inner.state
                );
                return false;
            }
            Self::commit(&mut inner, new_state)
        };
        self.publish(change);
        true
    }

    /// Publish DMA addresses and mark them valid.
    pub fn capture_dma(&self, addresses: DmaAddresses) {
        self.inner.lock().dma = CapturedDma {
            addresses,
            valid: true,
        };
    }

    /// Clear the validity flag, returning the addresses if they were valid.
    ///
    /// The stored addresses themselves are kept for diagnostics.
    pub fn invalidate_dma(&self) -> Option<DmaAddresses> {
        let mut inner = self.inner.lock();
        let was_valid = inner.dma.valid;
        inner.dma.valid = false;
        was_valid.then_some(inner.dma.addresses)
    }

    /// Captured addresses, only while valid.
    pub fn dma_addresses(&self) -> Option<DmaAddresses> {
        let dma = self.inner.lock().dma;
        dma.valid.then_some(dma.addresses)
    }

    /// Raw capture record, including the validity flag.
    pub fn captured_dma(&self) -> CapturedDma {
        self.inner.lock().dma
    }

    /// Register a channel subscriber for state changes.
    pub fn subscribe(&self) -> StateSubscription {
        self.notifier.subscribe()
    }

    fn commit(inner: &mut StoreInner, new_state: TracerState) -> Option<StateChange> {
        let previous = inner.state;
        inner.state = new_state;
        if previous == new_state {
            return None;
        }
        inner.seq += 1;
        Some(StateChange {
            seq: inner.seq,
            previous,
            current: new_state,
        })
    }

    fn publish(&self, change: Option<StateChange>) -> bool {
        let Some(change) = change else {
            return false;
        };
        debug!("Tracer state {} -> {}", change.previous, change.current);
        self.notifier.deliver(change);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, OnceLock, Weak};

    fn counting_store() -> (StateStore, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let store = StateStore::new(Some(Box::new(move |_: TracerState| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        (store, calls)
    }

    #[test]
    fn initial_state_is_uninitialized() {
        let store = StateStore::new(None);
        assert_eq!(store.state(), TracerState::Uninitialized);
        assert_eq!(store.dma_addresses(), None);
    }

    #[test]
    fn callback_fires_once_per_distinct_transition() {
        let (store, calls) = counting_store();

        assert!(store.set_state(TracerState::Initializing));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!store.set_state(TracerState::Initializing));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(store.set_state(TracerState::Initialized));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compare_and_set_only_notifies_on_success() {
        let (store, calls) = counting_store();
        store.set_state(TracerState::Idle);
        calls.store(0, Ordering::SeqCst);

        assert!(!store.set_state_if_current_equals(
            TracerState::IdleStablePushBuffer,
            TracerState::BeginWaitingForStablePushBuffer
        ));
        assert_eq!(store.state(), TracerState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(store.set_state_if_current_equals(
            TracerState::Idle,
            TracerState::BeginWaitingForStablePushBuffer
        ));
        assert_eq!(store.state(), TracerState::BeginWaitingForStablePushBuffer);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_query_state_without_deadlock() {
        let slot: Arc<OnceLock<Weak<StateStore>>> = Arc::new(OnceLock::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let observer = {
            let slot = Arc::clone(&slot);
            let seen = Arc::clone(&seen);
            move |_: TracerState| {
                if let Some(store) = slot.get().and_then(Weak::upgrade) {
                    seen.lock().push(store.state());
                }
            }
        };
        let store = Arc::new(StateStore::new(Some(Box::new(observer))));
        slot.set(Arc::downgrade(&store)).unwrap();

        store.set_state(TracerState::Idle);
        assert_eq!(*seen.lock(), vec![TracerState::Idle]);
    }

    #[test]
    fn concurrent_compare_and_set_has_exactly_one_winner() {
        const CALLERS: usize = 16;
        let (store, calls) = counting_store();
        store.set_state(TracerState::Idle);
        calls.store(0, Ordering::SeqCst);
        let barrier = Barrier::new(CALLERS);
        let wins = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..CALLERS {
                s.spawn(|| {
                    barrier.wait();
                    if store.set_state_if_current_equals(
                        TracerState::Idle,
                        TracerState::BeginWaitingForStablePushBuffer,
                    ) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.state(), TracerState::BeginWaitingForStablePushBuffer);
    }

    #[test]
    fn concurrent_compare_and_set_with_one_matching_caller() {
        const CALLERS: usize = 8;
        let store = StateStore::new(None);
        store.set_state(TracerState::IdleStablePushBuffer);
        let barrier = Barrier::new(CALLERS);
        let wins = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for i in 0..CALLERS {
                let store = &store;
                let barrier = &barrier;
                let wins = &wins;
                s.spawn(move || {
                    let expected = if i == 0 {
                        TracerState::IdleStablePushBuffer
                    } else {
                        TracerState::WaitingForStablePushBuffer
                    };
                    barrier.wait();
                    if store.set_state_if_current_equals(expected, TracerState::Idle) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(store.state(), TracerState::Idle);
    }

    #[test]
    fn subscribers_see_sequenced_changes() {
        let store = StateStore::new(None);
        let sub = store.subscribe();
        store.set_state(TracerState::Initializing);
        store.set_state(TracerState::Initializing);
        store.set_state(TracerState::Initialized);

        let changes = sub.drain();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].seq, 1);
        assert_eq!(changes[0].previous, TracerState::Uninitialized);
        assert_eq!(changes[1].seq, 2);
        assert_eq!(changes[1].current, TracerState::Initialized);
    }

    #[test]
    fn dma_capture_validity() {
        let store = StateStore::new(None);
        let addrs = DmaAddresses {
            push: 0x1000,
            pull: 0x0FF0,
        };
        store.capture_dma(addrs);
        assert_eq!(store.dma_addresses(), Some(addrs));

        assert_eq!(store.invalidate_dma(), Some(addrs));
        assert_eq!(store.dma_addresses(), None);
        assert_eq!(store.invalidate_dma(), None);
        assert_eq!(store.captured_dma().addresses, addrs);
    }
}
