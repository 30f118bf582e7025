//! Tracer Control API.
//!
//! `Tracer` is the context object owned by whoever initializes the tracer.
//! It shares the state store and register layer with the worker thread and
//! exposes the entry points that command handlers call.
//!
//! # Lifecycle
//!
//! ```text
//! initialize ─► Uninitialized ─create─► Initializing ─► Initialized
//!                                                          │ worker
//!                                                          ▼
//!   Shutdown ◄─worker exit─ ShutdownRequested ◄─destroy─  Idle
//! ```

use crate::notify::{StateCallback, StateSubscription};
use crate::stabilize::{self, StabilizeOutcome};
use crate::store::StateStore;
use crate::worker::{self, WorkerContext};
use ntrc_common::consts::WORKER_THREAD_NAME;
use ntrc_common::tracer::config::TracerConfig;
use ntrc_common::tracer::error::TracerError;
use ntrc_common::tracer::registers::{DmaAddresses, FifoRegisters};
use ntrc_common::tracer::state::TracerState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Handle to one tracer state machine and its worker.
pub struct Tracer {
    ctx: Arc<WorkerContext>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Tracer {
    /// Build a tracer in `Uninitialized` state.
    ///
    /// `on_state_changed` is invoked outside the state lock after every
    /// distinct transition. It may run after a later transition has already
    /// landed, so it must tolerate stale values.
    ///
    /// # Errors
    /// Returns `TracerError::Config` if `config` fails validation.
    pub fn initialize(
        registers: Arc<dyn FifoRegisters>,
        config: TracerConfig,
        on_state_changed: Option<StateCallback>,
    ) -> Result<Self, TracerError> {
        config.validate()?;

        Ok(Self {
            ctx: Arc::new(WorkerContext {
                store: StateStore::new(on_state_changed),
                registers,
                config,
                last_outcome: Mutex::new(None),
            }),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the worker thread.
    ///
    /// Each call spawns a new worker; callers must call this once. A tracer
    /// that has been destroyed cannot be created again.
    ///
    /// # Errors
    /// - `TracerError::AccessDenied` if the tracer is shutting down or shut down
    /// - `TracerError::Fail` if the thread could not be created
    pub fn create(&self) -> Result<(), TracerError> {
        let store = &self.ctx.store;
        let state = store.state();
        if matches!(
            state,
            TracerState::ShutdownRequested | TracerState::Shutdown
        ) {
            return Err(TracerError::AccessDenied { state });
        }

        store.set_state(TracerState::Initializing);

        let ctx = Arc::clone(&self.ctx);
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker::run(ctx))
            .map_err(|e| {
                error!("Failed to spawn tracer worker: {e}");
                store.set_state(TracerState::Uninitialized);
                TracerError::Fail(format!("failed to spawn worker thread: {e}"))
            })?;
        self.workers.lock().push(handle);

        store.set_state_if_current_equals(TracerState::Initializing, TracerState::Initialized);
        info!("Tracer created");
        Ok(())
    }

    /// Request shutdown and return without waiting for the worker.
    ///
    /// No-op when uninitialized or already shut down / shutting down.
    pub fn destroy(&self) {
        let store = &self.ctx.store;
        loop {
            let state = store.state();
            if matches!(
                state,
                TracerState::Uninitialized
                    | TracerState::ShutdownRequested
                    | TracerState::Shutdown
            ) {
                return;
            }
            if store.set_state_if_current_equals(state, TracerState::ShutdownRequested) {
                info!("Tracer shutdown requested from {state}");
                return;
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> TracerState {
        self.ctx.store.state()
    }

    /// Ask the worker to bring the push buffer into a stable state.
    ///
    /// Succeeds immediately, without any transition, if the push buffer is
    /// already held stable.
    ///
    /// # Errors
    /// Returns `TracerError::AccessDenied` unless the tracer is `Idle`.
    pub fn begin_wait_for_stable_push_buffer(&self) -> Result<(), TracerError> {
        let store = &self.ctx.store;
        if store.state() == TracerState::IdleStablePushBuffer {
            return Ok(());
        }
        if store.set_state_if_current_equals(
            TracerState::Idle,
            TracerState::BeginWaitingForStablePushBuffer,
        ) {
            return Ok(());
        }

        let state = store.state();
        warn!("Stable push buffer request rejected in state {state}");
        Err(TracerError::AccessDenied { state })
    }

    /// Leave the stable hold and un-hide the commands held back by it.
    ///
    /// The real PUT is restored before this returns. A stabilization
    /// requested concurrently finds the capture already consumed.
    ///
    /// # Errors
    /// Returns `TracerError::AccessDenied` unless the tracer is
    /// `IdleStablePushBuffer`.
    pub fn release_stable_push_buffer(&self) -> Result<(), TracerError> {
        let store = &self.ctx.store;
        if !store.set_state_if_current_equals(
            TracerState::IdleStablePushBuffer,
            TracerState::Idle,
        ) {
            return Err(TracerError::AccessDenied {
                state: store.state(),
            });
        }
        stabilize::release_hidden_commands(self.ctx.registers.as_ref(), store);
        Ok(())
    }

    /// Real PUT and stopped GET from the last stabilization, while valid.
    pub fn dma_addresses(&self) -> Option<DmaAddresses> {
        self.ctx.store.dma_addresses()
    }

    /// Outcome of the most recent stabilization run.
    pub fn last_stabilization(&self) -> Option<StabilizeOutcome> {
        *self.ctx.last_outcome.lock()
    }

    /// Register a channel subscriber for state changes.
    pub fn subscribe(&self) -> StateSubscription {
        self.ctx.store.subscribe()
    }

    /// Wait for every spawned worker to exit.
    ///
    /// Blocks until the workers observe a shutdown request; call `destroy`
    /// first.
    ///
    /// # Errors
    /// Returns `TracerError::Fail` if a worker panicked.
    pub fn join(&self) -> Result<(), TracerError> {
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            handle
                .join()
                .map_err(|_| TracerError::Fail("tracer worker panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.destroy();
    }
}
