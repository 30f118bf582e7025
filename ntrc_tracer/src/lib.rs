//! # NTRC Tracer Library
//!
//! Push-buffer tracer state machine: a lock-guarded state store, a Control
//! API, a polling worker thread and the stabilization algorithm that freezes
//! the GPU command stream without losing committed commands.
//!
//! # Module Structure
//!
//! - [`command`] - `ntrc!` text command router
//! - [`control`] - `Tracer` Control API
//! - [`drivers`] - Register layer implementations (NV2A MMIO, simulation)
//! - [`notify`] - State-change callback and subscriptions
//! - [`stabilize`] - Stable push buffer algorithm
//! - [`store`] - Lock-guarded state store
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ntrc_tracer                              │
//! │  ┌──────────────┐    ┌──────────────┐    ┌────────────────────┐  │
//! │  │ Command      │───►│  Tracer      │◄──►│  StateStore        │  │
//! │  │ Processor    │    │ (Control API)│    │  + StateNotifier   │  │
//! │  └──────────────┘    └──────┬───────┘    └─────────▲──────────┘  │
//! │                             │ spawn                │             │
//! │                             ▼                      │             │
//! │                   ┌────────────────┐    ┌──────────┴─────────┐   │
//! │                   │  Worker loop   │───►│  Stabilizer        │   │
//! │                   └───────┬────────┘    └──────────┬─────────┘   │
//! │                           ▼                        ▼             │
//! │                   ┌──────────────────────────────────────────┐   │
//! │                   │  FifoRegisters (trait object)            │   │
//! │                   └──────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod command;
pub mod control;
pub mod drivers;
pub mod notify;
pub mod stabilize;
pub mod store;
mod worker;

// Re-export key types for convenience
pub use crate::command::{CommandProcessor, CommandResponse};
pub use crate::control::Tracer;
pub use crate::drivers::SimulatedFifo;
pub use crate::notify::{StateCallback, StateChange, StateSubscription, format_notification};
pub use crate::stabilize::StabilizeOutcome;
