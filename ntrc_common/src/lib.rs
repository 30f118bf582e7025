//! NTRC Common Library
//!
//! This crate provides the shared vocabulary for the push-buffer tracer:
//! the tracer state enumeration, the register access contract consumed by the
//! stabilization algorithm, error types and configuration loading.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Tracer-wide constants
//! - [`tracer`] - Tracer state, register layer contract, errors, tuning
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ntrc_common::prelude::*;
//!
//! assert!(TracerState::ShutdownRequested.is_shutdown_class());
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod tracer;
