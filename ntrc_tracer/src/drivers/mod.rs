//! Register access drivers.
//!
//! - [`simulation`] - In-process FIFO model for development and testing
//! - [`nv2a`] - NV2A PFIFO/PGRAPH registers over a mapped MMIO window
//!
//! Both implement `FifoRegisters` from `ntrc_common::tracer::registers`.

pub mod nv2a;
pub mod simulation;

pub use nv2a::{MmioWindow, Nv2aFifo, RegisterIo};
pub use simulation::{SimCounters, SimulatedFifo};
