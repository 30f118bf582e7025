//! NV2A push-buffer FIFO over memory-mapped registers.
//!
//! `Nv2aFifo` implements [`FifoRegisters`] with read-modify-write accesses
//! to the PFIFO and PGRAPH control registers. Register storage is abstracted
//! by [`RegisterIo`] so the same code runs on a mapped MMIO window
//! ([`MmioWindow`]) or on a test double.

use bitflags::bitflags;
use ntrc_common::tracer::registers::{DmaState, FifoRegisters};
use std::ptr::NonNull;

/// Base of the NV2A register aperture.
pub const NV2A_MMIO_BASE: u32 = 0xFD00_0000;

/// PFIFO CACHE1 pusher access/status (`CACHE1_DMA_PUSH`).
pub const CACHE_PUSH_STATE: u32 = NV2A_MMIO_BASE + 0x3220;
/// PFIFO CACHE1 DMA state (`CACHE1_DMA_STATE`).
pub const DMA_STATE: u32 = NV2A_MMIO_BASE + 0x3228;
/// PFIFO CACHE1 DMA PUT.
pub const DMA_PUSH_ADDR: u32 = NV2A_MMIO_BASE + 0x3240;
/// PFIFO CACHE1 DMA GET.
pub const DMA_PULL_ADDR: u32 = NV2A_MMIO_BASE + 0x3244;
/// PFIFO CACHE1 puller control (`CACHE1_PULL0`).
pub const CACHE_PULL_STATE: u32 = NV2A_MMIO_BASE + 0x3250;
/// PGRAPH status.
pub const PGRAPH_STATUS: u32 = NV2A_MMIO_BASE + 0x40_0700;
/// PGRAPH FIFO access control.
pub const PGRAPH_STATE: u32 = NV2A_MMIO_BASE + 0x40_0720;

bitflags! {
    /// `PGRAPH_STATE` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PgraphFifo: u32 {
        /// Graphics engine may consume the command cache.
        const ACCESS = 1 << 0;
    }

    /// `PGRAPH_STATUS` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PgraphStatus: u32 {
        /// Graphics engine is processing.
        const BUSY = 1 << 0;
    }

    /// `CACHE_PUSH_STATE` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PusherState: u32 {
        /// Pusher may fetch commands.
        const ACCESS = 1 << 0;
        /// Pusher is fetching.
        const BUSY = 1 << 4;
    }

    /// `CACHE_PULL_STATE` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PullerState: u32 {
        /// Puller may drain the cache.
        const ACCESS = 1 << 0;
    }
}

/// 32-bit register access at absolute bus addresses.
pub trait RegisterIo: Send + Sync {
    /// Read the register at `addr`.
    fn read_u32(&self, addr: u32) -> u32;

    /// Write `value` to the register at `addr`.
    fn write_u32(&self, addr: u32, value: u32);

    /// Write `value` and return the previous register content.
    fn exchange_u32(&self, addr: u32, value: u32) -> u32 {
        let previous = self.read_u32(addr);
        self.write_u32(addr, value);
        previous
    }
}

/// Volatile access to a mapped register window.
pub struct MmioWindow {
    base: NonNull<u32>,
    bus_base: u32,
    len: u32,
}

// SAFETY: the window refers to device registers, which tolerate access from
// any thread; every access is a single aligned volatile load or store.
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// Wrap a mapping of `len` bytes of bus space starting at `bus_base`.
    ///
    /// # Safety
    ///
    /// `base` must point to a live, 4-byte aligned mapping of at least `len`
    /// bytes that outlives the returned window.
    pub unsafe fn new(base: NonNull<u32>, bus_base: u32, len: u32) -> Self {
        Self {
            base,
            bus_base,
            len,
        }
    }

    fn register(&self, addr: u32) -> *mut u32 {
        let offset = addr.wrapping_sub(self.bus_base);
        assert!(
            offset % 4 == 0 && offset < self.len,
            "register 0x{addr:08x} outside MMIO window"
        );
        // SAFETY: offset is in bounds and aligned per the check above.
        unsafe { self.base.as_ptr().add((offset / 4) as usize) }
    }
}

impl RegisterIo for MmioWindow {
    fn read_u32(&self, addr: u32) -> u32 {
        // SAFETY: `register` only yields in-bounds aligned pointers.
        unsafe { self.register(addr).read_volatile() }
    }

    fn write_u32(&self, addr: u32, value: u32) {
        // SAFETY: `register` only yields in-bounds aligned pointers.
        unsafe { self.register(addr).write_volatile(value) }
    }
}

/// [`FifoRegisters`] implementation for the NV2A.
pub struct Nv2aFifo<R: RegisterIo> {
    io: R,
}

impl<R: RegisterIo> Nv2aFifo<R> {
    /// Drive the FIFO through `io`.
    pub fn new(io: R) -> Self {
        Self { io }
    }

    /// Underlying register access.
    pub fn io(&self) -> &R {
        &self.io
    }

    fn set_bits(&self, addr: u32, bits: u32) {
        let value = self.io.read_u32(addr);
        self.io.write_u32(addr, value | bits);
    }

    fn clear_bits(&self, addr: u32, bits: u32) {
        let value = self.io.read_u32(addr);
        self.io.write_u32(addr, value & !bits);
    }

    fn spin_while_set(&self, addr: u32, bits: u32) {
        while self.io.read_u32(addr) & bits != 0 {
            std::hint::spin_loop();
        }
    }
}

impl<R: RegisterIo> FifoRegisters for Nv2aFifo<R> {
    fn disable_pgraph_fifo(&self) {
        self.clear_bits(PGRAPH_STATE, PgraphFifo::ACCESS.bits());
    }

    fn enable_pgraph_fifo(&self) {
        self.set_bits(PGRAPH_STATE, PgraphFifo::ACCESS.bits());
    }

    fn busy_wait_until_pgraph_idle(&self) {
        self.spin_while_set(PGRAPH_STATUS, PgraphStatus::BUSY.bits());
    }

    fn pause_pusher(&self) {
        self.clear_bits(CACHE_PUSH_STATE, PusherState::ACCESS.bits());
    }

    fn resume_pusher(&self) {
        self.set_bits(CACHE_PUSH_STATE, PusherState::ACCESS.bits());
    }

    fn busy_wait_until_pusher_idle(&self) {
        self.spin_while_set(CACHE_PUSH_STATE, PusherState::BUSY.bits());
    }

    fn pause_puller(&self) {
        self.clear_bits(CACHE_PULL_STATE, PullerState::ACCESS.bits());
    }

    fn resume_puller(&self) {
        self.set_bits(CACHE_PULL_STATE, PullerState::ACCESS.bits());
    }

    fn dma_push_addr(&self) -> u32 {
        self.io.read_u32(DMA_PUSH_ADDR)
    }

    fn set_dma_push_addr(&self, addr: u32) {
        self.io.write_u32(DMA_PUSH_ADDR, addr);
    }

    fn dma_pull_addr(&self) -> u32 {
        self.io.read_u32(DMA_PULL_ADDR)
    }

    fn dma_state(&self) -> DmaState {
        DmaState::from_raw(self.io.read_u32(DMA_STATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Plain register file; unset registers read as zero.
    #[derive(Default)]
    struct RegisterBank {
        regs: Mutex<HashMap<u32, u32>>,
    }

    impl RegisterIo for RegisterBank {
        fn read_u32(&self, addr: u32) -> u32 {
            self.regs.lock().get(&addr).copied().unwrap_or(0)
        }

        fn write_u32(&self, addr: u32, value: u32) {
            self.regs.lock().insert(addr, value);
        }
    }

    #[test]
    fn access_bits_are_read_modify_write() {
        let fifo = Nv2aFifo::new(RegisterBank::default());
        fifo.io().write_u32(CACHE_PUSH_STATE, 0xABCD_0000);

        fifo.resume_pusher();
        assert_eq!(fifo.io().read_u32(CACHE_PUSH_STATE), 0xABCD_0001);
        fifo.pause_pusher();
        assert_eq!(fifo.io().read_u32(CACHE_PUSH_STATE), 0xABCD_0000);

        fifo.io().write_u32(PGRAPH_STATE, 0x10);
        fifo.enable_pgraph_fifo();
        assert_eq!(fifo.io().read_u32(PGRAPH_STATE), 0x11);
        fifo.disable_pgraph_fifo();
        assert_eq!(fifo.io().read_u32(PGRAPH_STATE), 0x10);

        fifo.resume_puller();
        assert_eq!(fifo.io().read_u32(CACHE_PULL_STATE), 1);
        fifo.pause_puller();
        assert_eq!(fifo.io().read_u32(CACHE_PULL_STATE), 0);
    }

    #[test]
    fn dma_registers() {
        let fifo = Nv2aFifo::new(RegisterBank::default());
        fifo.set_dma_push_addr(0x0123_4560);
        fifo.io().write_u32(DMA_PULL_ADDR, 0x0123_4000);
        fifo.io().write_u32(DMA_STATE, 5 << 18);

        assert_eq!(fifo.dma_push_addr(), 0x0123_4560);
        assert_eq!(fifo.dma_pull_addr(), 0x0123_4000);
        assert_eq!(fifo.dma_state().method_count, 5);
    }

    #[test]
    fn busy_waits_return_once_idle() {
        let fifo = Nv2aFifo::new(RegisterBank::default());
        fifo.io().write_u32(CACHE_PUSH_STATE, PusherState::ACCESS.bits());
        fifo.busy_wait_until_pgraph_idle();
        fifo.busy_wait_until_pusher_idle();
    }

    #[test]
    fn mmio_window_maps_bus_addresses() {
        let mut backing = vec![0u32; 0x1000 / 4];
        let base = NonNull::new(backing.as_mut_ptr()).unwrap();
        // SAFETY: `backing` outlives `window` and is 0x1000 bytes long.
        let window = unsafe { MmioWindow::new(base, NV2A_MMIO_BASE + 0x3000, 0x1000) };

        let previous = window.exchange_u32(DMA_PUSH_ADDR, 0xCAFE_0000);
        assert_eq!(previous, 0);
        assert_eq!(window.read_u32(DMA_PUSH_ADDR), 0xCAFE_0000);
        drop(window);
        assert_eq!(backing[0x240 / 4], 0xCAFE_0000);
    }

    #[test]
    #[should_panic(expected = "outside MMIO window")]
    fn mmio_window_rejects_out_of_range() {
        let mut backing = vec![0u32; 4];
        let base = NonNull::new(backing.as_mut_ptr()).unwrap();
        // SAFETY: accesses are bounds-checked before dereference.
        let window = unsafe { MmioWindow::new(base, NV2A_MMIO_BASE, 16) };
        window.read_u32(PGRAPH_STATUS);
    }
}
