//! Prelude module for common re-exports.
//!
//! # Usage
//!
//! ```rust
//! use ntrc_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::tracer::config::TracerConfig;

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{HANDLER_NAME, METHOD_WORD_SIZE};

// ─── Tracer ─────────────────────────────────────────────────────────
pub use crate::tracer::error::TracerError;
pub use crate::tracer::registers::{DmaAddresses, DmaState, FifoRegisters};
pub use crate::tracer::state::TracerState;
