//! Tracer state, register layer contract, errors and tuning.
//!
//! These types are shared between the tracer service and anything that
//! drives or observes it (command front ends, host tooling, tests).

pub mod config;
pub mod error;
pub mod registers;
pub mod state;
