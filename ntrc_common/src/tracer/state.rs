//! Tracer state enumeration.
//!
//! The numeric values are part of the external contract: host tooling reads
//! them from `state=0x...` responses and `new_state=0x...` notifications.
//! Ordering is meaningful:
//!
//! | Range      | Meaning                                  |
//! |------------|------------------------------------------|
//! | `< 0`      | shutdown class (requested or complete)   |
//! | `0`        | uninitialized                            |
//! | `1..=2`    | initializing                             |
//! | `100..`    | idle variants                            |
//! | `1000..`   | transient busy workflow states           |

use serde::{Deserialize, Serialize};

/// Lifecycle and workflow state of the tracer.
///
/// Variants are declared in ascending numeric order so the derived `Ord`
/// matches the raw value ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(i32)]
pub enum TracerState {
    /// `Destroy` was called; the worker exits on its next poll.
    ShutdownRequested = -2,
    /// Worker has exited. Terminal until reinitialization.
    Shutdown = -1,

    /// `Initialize` ran but no worker exists yet.
    Uninitialized = 0,

    /// `Create` is spawning the worker.
    Initializing = 1,
    /// Worker spawned; it promotes itself to `Idle` on its first poll.
    Initialized = 2,

    /// Ready to accept workflow requests.
    Idle = 100,
    /// Push buffer drained and held; captured DMA addresses are valid.
    IdleStablePushBuffer = 101,

    /// A stable push buffer was requested; the worker has not picked it up.
    BeginWaitingForStablePushBuffer = 1000,
    /// Stabilization algorithm in progress.
    WaitingForStablePushBuffer = 1001,
}

impl TracerState {
    /// Convert from the raw wire value. Returns `None` for unknown values.
    #[inline]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            -2 => Some(Self::ShutdownRequested),
            -1 => Some(Self::Shutdown),
            0 => Some(Self::Uninitialized),
            1 => Some(Self::Initializing),
            2 => Some(Self::Initialized),
            100 => Some(Self::Idle),
            101 => Some(Self::IdleStablePushBuffer),
            1000 => Some(Self::BeginWaitingForStablePushBuffer),
            1001 => Some(Self::WaitingForStablePushBuffer),
            _ => None,
        }
    }

    /// Raw wire value.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Wire value reinterpreted as an unsigned DWORD, as printed in hex.
    #[inline]
    pub const fn as_dword(self) -> u32 {
        self as i32 as u32
    }

    /// True for states below `Initializing`, at which the worker stops.
    ///
    /// `Uninitialized` is included: a worker never runs in that state.
    #[inline]
    pub const fn is_shutdown_class(self) -> bool {
        self.as_i32() < Self::Initializing.as_i32()
    }
}

impl Default for TracerState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl std::fmt::Display for TracerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.as_i32())
    }
}
