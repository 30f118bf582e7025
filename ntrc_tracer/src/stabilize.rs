//! Push-buffer stabilization.
//!
//! Drives the pusher/puller pair into a state where GET == PUT and nothing
//! advances on its own, without dropping commands the producer already
//! committed. Commands that have not been consumed yet are hidden by
//! rewriting PUT to the point where the consumer will stop; the real PUT is
//! captured so it can be restored later.
//!
//! Each round:
//!
//! 1. Disable graphics FIFO consumption and wait for the engine to idle.
//! 2. Kick the pusher to fill the command cache, then re-enable consumption.
//! 3. Snapshot the real PUT and the current GET.
//! 4. Predict the consumer's stop point: GET + in-flight methods * 4.
//! 5. Rewrite PUT to the prediction and resume the pusher.
//! 6. Re-pause the pusher and let the pipeline settle.
//! 7. Re-read both pointers; retry from 1 on any mismatch.
//!
//! A capture still marked valid when a run starts means PUT is still hidden
//! from an earlier hold; it is restored before the first snapshot.
//!
//! The loop keeps going while the state is `WaitingForStablePushBuffer`.
//! There is no retry limit: if the hardware never settles, observers see
//! the waiting state indefinitely.

use crate::store::StateStore;
use ntrc_common::consts::METHOD_WORD_SIZE;
use ntrc_common::tracer::registers::{DmaAddresses, FifoRegisters};
use ntrc_common::tracer::state::TracerState;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one stabilization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizeOutcome {
    /// Reached `IdleStablePushBuffer`.
    Stable {
        /// Real PUT and the GET the consumer stopped at.
        addresses: DmaAddresses,
        /// Rounds executed, including the successful one.
        attempts: u32,
    },
    /// Cancelled by a concurrent state change; PUT was restored.
    Aborted {
        /// Restored PUT and GET at abort time.
        addresses: DmaAddresses,
        /// Rounds executed before cancellation was observed.
        attempts: u32,
    },
}

impl StabilizeOutcome {
    /// Captured addresses.
    pub const fn addresses(&self) -> DmaAddresses {
        match self {
            Self::Stable { addresses, .. } | Self::Aborted { addresses, .. } => *addresses,
        }
    }

    /// Rounds executed.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Stable { attempts, .. } | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    /// True if the terminal stable state was reached.
    pub const fn is_stable(&self) -> bool {
        matches!(self, Self::Stable { .. })
    }
}

/// Runs the stabilization protocol against one register layer.
pub struct Stabilizer<'a> {
    registers: &'a dyn FifoRegisters,
    store: &'a StateStore,
    settle_interval: Duration,
}

impl<'a> Stabilizer<'a> {
    /// Bind the protocol to `registers` and `store`.
    pub fn new(
        registers: &'a dyn FifoRegisters,
        store: &'a StateStore,
        settle_interval: Duration,
    ) -> Self {
        Self {
            registers,
            store,
            settle_interval,
        }
    }

    /// Run until the push buffer is stable or the request is cancelled.
    ///
    /// Expects the state to be `BeginWaitingForStablePushBuffer`. On every
    /// exit the pusher is running and graphics FIFO consumption is enabled.
    pub fn wait_for_stable_push_buffer(&self) -> StabilizeOutcome {
        let regs = self.registers;

        if !self.store.set_state_if_current_equals(
            TracerState::BeginWaitingForStablePushBuffer,
            TracerState::WaitingForStablePushBuffer,
        ) {
            debug!("Stable push buffer request withdrawn before start");
        }

        release_hidden_commands(regs, self.store);

        let mut attempts = 0u32;
        let mut real_push: Option<u32> = None;

        while self.store.state() == TracerState::WaitingForStablePushBuffer {
            attempts += 1;

            regs.disable_pgraph_fifo();
            regs.busy_wait_until_pgraph_idle();

            regs.populate_fifo_cache();
            regs.enable_pgraph_fifo();

            let real = regs.dma_push_addr();
            let pull = regs.dma_pull_addr();
            real_push = Some(real);

            let method_count = regs.dma_state().method_count;
            let target = pull.wrapping_add(method_count.wrapping_mul(METHOD_WORD_SIZE));
            debug!(
                attempt = attempts,
                "PUT 0x{real:08x} GET 0x{pull:08x} in-flight {method_count}, hide at 0x{target:08x}"
            );

            regs.set_dma_push_addr(target);
            regs.resume_pusher();

            // The in-flight count can be stale mid-transfer; stop again and
            // verify where the pusher actually ended up.
            regs.pause_pusher();
            if !self.settle_interval.is_zero() {
                std::thread::sleep(self.settle_interval);
            }

            let check = regs.dma_addresses();
            if check.push != check.pull || check.push != target {
                warn!(
                    attempt = attempts,
                    "Push buffer moved (PUT 0x{:08x} GET 0x{:08x}, want 0x{target:08x}), retrying",
                    check.push, check.pull
                );
                if check.push == target {
                    // Our rewrite is still in place; un-hide before retrying.
                    regs.set_dma_push_addr(real);
                } else {
                    // Someone else wrote PUT; that is the new real value.
                    real_push = Some(check.push);
                }
                continue;
            }

            regs.resume_pusher();
            let addresses = DmaAddresses {
                push: real,
                pull: check.pull,
            };
            self.store.capture_dma(addresses);

            if self.store.set_state_if_current_equals(
                TracerState::WaitingForStablePushBuffer,
                TracerState::IdleStablePushBuffer,
            ) {
                info!(
                    attempts,
                    "Push buffer stable: PUT 0x{:08x} GET 0x{:08x}",
                    addresses.push, addresses.pull
                );
                return StabilizeOutcome::Stable {
                    addresses,
                    attempts,
                };
            }
            break;
        }

        self.abort(real_push, attempts)
    }

    fn abort(&self, real_push: Option<u32>, attempts: u32) -> StabilizeOutcome {
        let regs = self.registers;

        // Without a round nothing was hidden, and PUT belongs to the producer.
        if let Some(real) = real_push {
            regs.set_dma_push_addr(real);
        }
        regs.enable_pgraph_fifo();
        regs.resume_pusher();

        let addresses = regs.dma_addresses();
        if real_push.is_some() {
            self.store.capture_dma(addresses);
        }

        info!(
            attempts,
            "Stabilization cancelled in state {}, PUT at 0x{:08x}",
            self.store.state(),
            addresses.push
        );
        StabilizeOutcome::Aborted {
            addresses,
            attempts,
        }
    }
}

/// Restore the real PUT of a still-valid capture and drop the capture.
///
/// Returns the restored addresses. The capture is taken atomically, so
/// concurrent callers restore at most once.
pub(crate) fn release_hidden_commands(
    registers: &dyn FifoRegisters,
    store: &StateStore,
) -> Option<DmaAddresses> {
    let addresses = store.invalidate_dma()?;
    registers.set_dma_push_addr(addresses.push);
    registers.resume_pusher();
    info!(
        "Released stable push buffer, PUT restored to 0x{:08x}",
        addresses.push
    );
    Some(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SimulatedFifo;
    use std::sync::Arc;

    const SETTLE: Duration = Duration::from_millis(1);

    fn requested_store() -> StateStore {
        let store = StateStore::new(None);
        store.set_state(TracerState::BeginWaitingForStablePushBuffer);
        store
    }

    #[test]
    fn already_stable_completes_in_one_round() {
        let sim = SimulatedFifo::new(0x0040_0000);
        let store = requested_store();

        let outcome = Stabilizer::new(&sim, &store, SETTLE).wait_for_stable_push_buffer();

        let expected = DmaAddresses {
            push: 0x0040_0000,
            pull: 0x0040_0000,
        };
        assert_eq!(
            outcome,
            StabilizeOutcome::Stable {
                addresses: expected,
                attempts: 1
            }
        );
        assert_eq!(store.state(), TracerState::IdleStablePushBuffer);
        assert_eq!(store.dma_addresses(), Some(expected));
        assert!(sim.pusher_running());
        assert!(sim.pgraph_fifo_enabled());
    }

    #[test]
    fn in_flight_methods_move_the_stop_point() {
        let sim = SimulatedFifo::new(0);
        sim.set_registers(0x2000, 0x1000, 3);
        let store = requested_store();

        let outcome = Stabilizer::new(&sim, &store, SETTLE).wait_for_stable_push_buffer();

        assert!(outcome.is_stable());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(
            outcome.addresses(),
            DmaAddresses {
                push: 0x2000,
                pull: 0x100C
            }
        );
        // PUT stays hidden at the stop point until released.
        assert_eq!(sim.dma_push_addr(), 0x100C);
        assert_eq!(sim.dma_pull_addr(), 0x100C);
    }

    #[test]
    fn drifting_put_is_retried_until_it_holds() {
        let sim = SimulatedFifo::new(0);
        sim.set_registers(0x2000, 0x1000, 0);
        sim.inject_put_drift(2);
        let store = requested_store();

        let outcome = Stabilizer::new(&sim, &store, SETTLE).wait_for_stable_push_buffer();

        assert!(outcome.is_stable());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(sim.counters().drifts, 2);
        // The producer's latest tail is what gets captured as real PUT.
        assert_eq!(outcome.addresses().push, 0x2008);
        assert_eq!(outcome.addresses().push, sim.producer_put());
        assert_eq!(outcome.addresses().pull, 0x1000);
        assert!(sim.pusher_running());
        assert!(sim.pgraph_fifo_enabled());
        assert_eq!(store.state(), TracerState::IdleStablePushBuffer);
    }

    #[test]
    fn withdrawn_request_aborts_without_rounds() {
        let sim = SimulatedFifo::new(0x3000);
        let store = StateStore::new(None);
        store.set_state(TracerState::ShutdownRequested);

        let outcome = Stabilizer::new(&sim, &store, SETTLE).wait_for_stable_push_buffer();

        assert!(!outcome.is_stable());
        assert_eq!(outcome.attempts(), 0);
        assert_eq!(outcome.addresses().push, 0x3000);
        assert_eq!(store.state(), TracerState::ShutdownRequested);
        assert!(sim.pusher_running());
        // Nothing was hidden: PUT untouched, no capture published.
        assert_eq!(sim.counters().push_writes, 0);
        assert_eq!(store.dma_addresses(), None);
        assert!(!store.captured_dma().valid);
    }

    #[test]
    fn rerun_over_a_live_hold_restores_real_put_first() {
        let sim = SimulatedFifo::new(0);
        sim.set_registers(0x2000, 0x1000, 3);
        let store = requested_store();
        let first = Stabilizer::new(&sim, &store, SETTLE).wait_for_stable_push_buffer();
        assert_eq!(first.addresses().push, 0x2000);
        assert_eq!(sim.dma_push_addr(), 0x100C);

        // Re-requested before anything un-hid the commands.
        store.set_state(TracerState::BeginWaitingForStablePushBuffer);
        let second = Stabilizer::new(&sim, &store, SETTLE).wait_for_stable_push_buffer();

        assert!(second.is_stable());
        assert_eq!(
            second.addresses(),
            DmaAddresses {
                push: 0x2000,
                pull: 0x2000
            }
        );
        assert_eq!(store.dma_addresses(), Some(second.addresses()));
    }

    #[test]
    fn release_restores_at_most_once() {
        let sim = SimulatedFifo::new(0x1000);
        let store = StateStore::new(None);
        sim.pause_pusher();
        sim.set_dma_push_addr(0x0F00);
        let hidden = DmaAddresses {
            push: 0x1000,
            pull: 0x0F00,
        };
        store.capture_dma(hidden);

        assert_eq!(release_hidden_commands(&sim, &store), Some(hidden));
        assert_eq!(sim.dma_push_addr(), 0x1000);
        assert!(sim.pusher_running());

        sim.submit(1);
        assert_eq!(release_hidden_commands(&sim, &store), None);
        assert_eq!(sim.dma_push_addr(), 0x1004);
    }

    #[test]
    fn cancellation_mid_retry_restores_real_put() {
        let sim = Arc::new(SimulatedFifo::new(0));
        sim.set_registers(0x2000, 0x1000, 0);
        sim.inject_put_drift(u32::MAX);
        let store = Arc::new(requested_store());

        let runner = {
            let sim = Arc::clone(&sim);
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                Stabilizer::new(sim.as_ref(), store.as_ref(), SETTLE)
                    .wait_for_stable_push_buffer()
            })
        };

        while sim.counters().drifts < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }
        store.set_state(TracerState::ShutdownRequested);
        let outcome = runner.join().expect("stabilizer thread");

        assert!(!outcome.is_stable());
        assert!(outcome.attempts() >= 3);
        assert_eq!(outcome.addresses().push, sim.producer_put());
        assert_eq!(sim.dma_push_addr(), sim.producer_put());
        assert!(sim.pusher_running());
        assert!(sim.pgraph_fifo_enabled());

        let captured = store.captured_dma();
        assert!(captured.valid);
        assert_eq!(captured.addresses.push, sim.producer_put());
    }
}
