//! Register access contract for the push-buffer FIFO.
//!
//! This module defines:
//! - `FifoRegisters` trait - The operations the tracer performs on hardware
//! - `DmaState` struct - Decoded CACHE1_DMA_STATE word
//! - `DmaAddresses` struct - A (push, pull) DMA pointer pair

use serde::{Deserialize, Serialize};

/// Decoded view of the pusher's DMA state register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaState {
    /// Current method uses the non-increasing addressing mode.
    pub non_increasing: bool,
    /// Method offset (byte address of the method register).
    pub method: u32,
    /// Subchannel the method targets.
    pub subchannel: u32,
    /// Number of method words still to be fetched for the current command.
    pub method_count: u32,
    /// Pusher error code (0 = none).
    pub error: u32,
}

impl DmaState {
    const NON_INCREASING_BIT: u32 = 1 << 0;
    const METHOD_MASK: u32 = 0x0000_1FFC;
    const SUBCHANNEL_SHIFT: u32 = 13;
    const SUBCHANNEL_MASK: u32 = 0x7;
    const METHOD_COUNT_SHIFT: u32 = 18;
    const METHOD_COUNT_MASK: u32 = 0x7FF;
    const ERROR_SHIFT: u32 = 29;
    const ERROR_MASK: u32 = 0x7;

    /// Decode a raw register value.
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            non_increasing: raw & Self::NON_INCREASING_BIT != 0,
            method: raw & Self::METHOD_MASK,
            subchannel: (raw >> Self::SUBCHANNEL_SHIFT) & Self::SUBCHANNEL_MASK,
            method_count: (raw >> Self::METHOD_COUNT_SHIFT) & Self::METHOD_COUNT_MASK,
            error: (raw >> Self::ERROR_SHIFT) & Self::ERROR_MASK,
        }
    }

    /// Encode back into a raw register value. Out-of-range fields are masked.
    pub const fn raw(&self) -> u32 {
        let mut raw = self.method & Self::METHOD_MASK;
        if self.non_increasing {
            raw |= Self::NON_INCREASING_BIT;
        }
        raw |= (self.subchannel & Self::SUBCHANNEL_MASK) << Self::SUBCHANNEL_SHIFT;
        raw |= (self.method_count & Self::METHOD_COUNT_MASK) << Self::METHOD_COUNT_SHIFT;
        raw |= (self.error & Self::ERROR_MASK) << Self::ERROR_SHIFT;
        raw
    }
}

/// A push/pull DMA pointer pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DmaAddresses {
    /// Producer write pointer (PUT).
    pub push: u32,
    /// Consumer read pointer (GET).
    pub pull: u32,
}

/// Operations the tracer performs on the push-buffer FIFO.
///
/// Implementations talk to real registers (MMIO) or to an in-process model.
/// Registers are shared with the hardware with no software lock; callers
/// serialize access procedurally by pausing one side before touching the
/// related registers.
///
/// # Timing Contracts
///
/// | Operation | Blocking |
/// |-----------|----------|
/// | `busy_wait_until_*` | Spins until hardware reports idle, no timeout |
/// | everything else | Returns immediately |
pub trait FifoRegisters: Send + Sync {
    /// Stop the graphics engine from consuming the command cache.
    fn disable_pgraph_fifo(&self);

    /// Allow the graphics engine to consume the command cache.
    fn enable_pgraph_fifo(&self);

    /// Spin until the graphics engine reports idle.
    fn busy_wait_until_pgraph_idle(&self);

    /// Stop the pusher from fetching commands into the cache.
    fn pause_pusher(&self);

    /// Let the pusher fetch commands into the cache.
    fn resume_pusher(&self);

    /// Spin until the pusher reports idle.
    fn busy_wait_until_pusher_idle(&self);

    /// Stop the puller from draining the cache.
    fn pause_puller(&self);

    /// Let the puller drain the cache.
    fn resume_puller(&self);

    /// Current DMA push address (PUT).
    fn dma_push_addr(&self) -> u32;

    /// Overwrite the DMA push address (PUT).
    fn set_dma_push_addr(&self, addr: u32);

    /// Current DMA pull address (GET).
    fn dma_pull_addr(&self) -> u32;

    /// Current pusher DMA state.
    fn dma_state(&self) -> DmaState;

    /// Let the pusher fetch whatever is pending into the cache, then pause
    /// it again.
    fn populate_fifo_cache(&self) {
        self.resume_pusher();
        self.pause_pusher();
    }

    /// Snapshot of both DMA pointers.
    fn dma_addresses(&self) -> DmaAddresses {
        DmaAddresses {
            push: self.dma_push_addr(),
            pull: self.dma_pull_addr(),
        }
    }
}
