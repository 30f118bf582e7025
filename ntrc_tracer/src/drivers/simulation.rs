//! Simulated push-buffer FIFO.
//!
//! `SimulatedFifo` implements [`FifoRegisters`] against an in-process model
//! so the tracer can run without hardware. The model is deliberately coarse:
//!
//! - the consumer drains instantly (GET jumps to PUT, in-flight count drops
//!   to zero) whenever the pusher, the puller and the graphics FIFO are all
//!   running;
//! - a producer thread appends commands with [`SimulatedFifo::submit`] and
//!   keeps its own tail pointer, which it writes to PUT;
//! - faults can be injected: an in-flight method count, and "PUT drift"
//!   where the producer writes PUT right after the tracer rewrote it.

use ntrc_common::consts::METHOD_WORD_SIZE;
use ntrc_common::tracer::registers::{DmaState, FifoRegisters};
use parking_lot::Mutex;
use tracing::trace;

/// Register operation counters, for assertions and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    /// `busy_wait_until_pgraph_idle` calls.
    pub pgraph_idle_waits: u64,
    /// `pause_pusher` calls.
    pub pusher_pauses: u64,
    /// `resume_pusher` calls.
    pub pusher_resumes: u64,
    /// `set_dma_push_addr` calls.
    pub push_writes: u64,
    /// PUT writes performed by injected drift.
    pub drifts: u64,
}

#[derive(Debug)]
struct SimState {
    push: u32,
    pull: u32,
    producer_put: u32,
    method_count: u32,
    pgraph_fifo_enabled: bool,
    pusher_running: bool,
    puller_running: bool,
    drift_remaining: u32,
    drift_armed: bool,
    counters: SimCounters,
}

impl SimState {
    fn pipeline_running(&self) -> bool {
        self.pgraph_fifo_enabled && self.pusher_running && self.puller_running
    }

    fn advance(&mut self) {
        if self.pipeline_running() && (self.pull != self.push || self.method_count != 0) {
            trace!("sim: drain GET 0x{:08x} -> 0x{:08x}", self.pull, self.push);
            self.pull = self.push;
            self.method_count = 0;
        }
    }
}

/// In-process model of the pusher/puller pair.
#[derive(Debug)]
pub struct SimulatedFifo {
    state: Mutex<SimState>,
}

impl SimulatedFifo {
    /// Idle pipeline with PUT == GET == `base`, everything running.
    pub fn new(base: u32) -> Self {
        Self {
            state: Mutex::new(SimState {
                push: base,
                pull: base,
                producer_put: base,
                method_count: 0,
                pgraph_fifo_enabled: true,
                pusher_running: true,
                puller_running: true,
                drift_remaining: 0,
                drift_armed: false,
                counters: SimCounters::default(),
            }),
        }
    }

    /// Producer appends `words` command words and writes its tail to PUT.
    pub fn submit(&self, words: u32) {
        let mut st = self.state.lock();
        st.producer_put = st.producer_put.wrapping_add(words * METHOD_WORD_SIZE);
        st.push = st.producer_put;
        st.advance();
    }

    /// Force PUT, GET and the in-flight method count, as if sampled while
    /// the consumer was mid-transfer. The producer tail follows PUT.
    pub fn set_registers(&self, push: u32, pull: u32, method_count: u32) {
        let mut st = self.state.lock();
        st.push = push;
        st.producer_put = push;
        st.pull = pull;
        st.method_count = method_count;
    }

    /// For the next `times` PUT rewrites, the producer writes one more
    /// command word to PUT as soon as the pusher is paused again.
    pub fn inject_put_drift(&self, times: u32) {
        self.state.lock().drift_remaining = times;
    }

    /// Stop the consumer from draining, so GET lags PUT.
    pub fn stall_consumer(&self, stalled: bool) {
        let mut st = self.state.lock();
        st.puller_running = !stalled;
        st.advance();
    }

    /// The producer's own tail pointer (the real PUT).
    pub fn producer_put(&self) -> u32 {
        self.state.lock().producer_put
    }

    /// Whether the pusher is currently running.
    pub fn pusher_running(&self) -> bool {
        self.state.lock().pusher_running
    }

    /// Whether graphics FIFO consumption is enabled.
    pub fn pgraph_fifo_enabled(&self) -> bool {
        self.state.lock().pgraph_fifo_enabled
    }

    /// Snapshot of the operation counters.
    pub fn counters(&self) -> SimCounters {
        self.state.lock().counters
    }
}

impl Default for SimulatedFifo {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FifoRegisters for SimulatedFifo {
    fn disable_pgraph_fifo(&self) {
        self.state.lock().pgraph_fifo_enabled = false;
    }

    fn enable_pgraph_fifo(&self) {
        let mut st = self.state.lock();
        st.pgraph_fifo_enabled = true;
        st.advance();
    }

    fn busy_wait_until_pgraph_idle(&self) {
        self.state.lock().counters.pgraph_idle_waits += 1;
    }

    fn pause_pusher(&self) {
        let mut st = self.state.lock();
        st.pusher_running = false;
        st.counters.pusher_pauses += 1;

        if st.drift_armed && st.drift_remaining > 0 {
            st.drift_remaining -= 1;
            st.producer_put = st.producer_put.wrapping_add(METHOD_WORD_SIZE);
            st.push = st.producer_put;
            st.counters.drifts += 1;
            trace!("sim: producer drifted PUT to 0x{:08x}", st.push);
        }
        st.drift_armed = false;
    }

    fn resume_pusher(&self) {
        let mut st = self.state.lock();
        st.pusher_running = true;
        st.counters.pusher_resumes += 1;
        st.advance();
    }

    fn busy_wait_until_pusher_idle(&self) {}

    fn pause_puller(&self) {
        self.state.lock().puller_running = false;
    }

    fn resume_puller(&self) {
        let mut st = self.state.lock();
        st.puller_running = true;
        st.advance();
    }

    fn dma_push_addr(&self) -> u32 {
        self.state.lock().push
    }

    fn set_dma_push_addr(&self, addr: u32) {
        let mut st = self.state.lock();
        st.push = addr;
        st.counters.push_writes += 1;
        // Only a rewrite that hides the producer's tail invites drift.
        st.drift_armed = addr != st.producer_put;
        st.advance();
    }

    fn dma_pull_addr(&self) -> u32 {
        self.state.lock().pull
    }

    fn dma_state(&self) -> DmaState {
        DmaState {
            method_count: self.state.lock().method_count,
            ..Default::default()
        }
    }
}
