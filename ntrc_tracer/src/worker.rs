//! Tracer worker thread.
//!
//! The worker polls the state store at a fixed interval and runs the handler
//! for the observed state. It exits as soon as it sees a shutdown-class state
//! and then runs the shutdown sequence, which is the only place the worker
//! moves the tracer to `Shutdown`.

use crate::stabilize::{self, StabilizeOutcome, Stabilizer};
use crate::store::StateStore;
use ntrc_common::tracer::config::TracerConfig;
use ntrc_common::tracer::registers::FifoRegisters;
use ntrc_common::tracer::state::TracerState;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the worker and the Control API share.
pub(crate) struct WorkerContext {
    pub(crate) store: StateStore,
    pub(crate) registers: Arc<dyn FifoRegisters>,
    pub(crate) config: TracerConfig,
    pub(crate) last_outcome: Mutex<Option<StabilizeOutcome>>,
}

/// Worker thread body.
pub(crate) fn run(ctx: Arc<WorkerContext>) {
    info!(
        "Tracer worker started (poll={}ms, settle={}ms)",
        ctx.config.poll_interval_ms, ctx.config.settle_interval_ms
    );

    loop {
        let state = ctx.store.state();
        if state.is_shutdown_class() {
            debug!("Worker observed {state}, leaving poll loop");
            break;
        }

        match state {
            TracerState::Initialized => announce_ready(&ctx),
            TracerState::BeginWaitingForStablePushBuffer => {
                let outcome = Stabilizer::new(
                    ctx.registers.as_ref(),
                    &ctx.store,
                    ctx.config.settle_interval(),
                )
                .wait_for_stable_push_buffer();
                *ctx.last_outcome.lock() = Some(outcome);
            }
            _ => {}
        }

        std::thread::sleep(ctx.config.poll_interval());
    }

    shutdown(&ctx);
}

fn announce_ready(ctx: &WorkerContext) {
    if ctx
        .store
        .set_state_if_current_equals(TracerState::Initialized, TracerState::Idle)
    {
        info!("Tracer ready");
    }
}

/// Undo any hiding, leave the pusher running and publish `Shutdown`.
pub(crate) fn shutdown(ctx: &WorkerContext) {
    stabilize::release_hidden_commands(ctx.registers.as_ref(), &ctx.store);
    ctx.registers.resume_pusher();
    ctx.store.set_state(TracerState::Shutdown);
    info!("Tracer worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SimulatedFifo;
    use ntrc_common::tracer::registers::DmaAddresses;

    fn context(sim: Arc<SimulatedFifo>) -> WorkerContext {
        WorkerContext {
            store: StateStore::new(None),
            registers: sim,
            config: TracerConfig {
                poll_interval_ms: 1,
                settle_interval_ms: 0,
            },
            last_outcome: Mutex::new(None),
        }
    }

    #[test]
    fn shutdown_restores_hidden_put_once() {
        let sim = Arc::new(SimulatedFifo::new(0x1000));
        let ctx = context(Arc::clone(&sim));
        sim.pause_pusher();
        sim.set_dma_push_addr(0x0800);
        ctx.store.capture_dma(DmaAddresses {
            push: 0x1000,
            pull: 0x0800,
        });

        shutdown(&ctx);
        assert_eq!(sim.dma_push_addr(), 0x1000);
        assert!(sim.pusher_running());
        assert_eq!(ctx.store.state(), TracerState::Shutdown);
        assert_eq!(ctx.store.dma_addresses(), None);

        // A second run finds nothing to restore and must not clobber PUT.
        sim.submit(1);
        shutdown(&ctx);
        assert_eq!(sim.dma_push_addr(), 0x1004);
    }

    #[test]
    fn worker_exits_on_shutdown_request() {
        let sim = Arc::new(SimulatedFifo::new(0));
        let ctx = Arc::new(context(sim));
        ctx.store.set_state(TracerState::Initialized);

        let sub = ctx.store.subscribe();
        let handle = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || run(ctx))
        };
        assert_eq!(
            sub.wait_for(&[TracerState::Idle], std::time::Duration::from_secs(5)),
            Some(TracerState::Idle)
        );

        ctx.store.set_state(TracerState::ShutdownRequested);
        handle.join().expect("worker thread");
        assert_eq!(ctx.store.state(), TracerState::Shutdown);
    }
}
