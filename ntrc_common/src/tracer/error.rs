//! Tracer error types.
//!
//! Only two failures ever reach a Control API caller: a transition requested
//! from the wrong state, and a worker thread that could not be created.
//! Hardware anomalies during stabilization are retried internally and never
//! surface here.

use crate::config::ConfigError;
use crate::tracer::state::TracerState;
use thiserror::Error;

/// Error types for tracer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TracerError {
    /// The requested transition is not permitted from the current state.
    #[error("Access denied: request not valid in state {state}")]
    AccessDenied {
        /// State observed when the request was rejected.
        state: TracerState,
    },

    /// Fatal failure, e.g. the worker thread could not be created.
    #[error("Tracer failure: {0}")]
    Fail(String),

    /// The command router has no handler for the given text.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
