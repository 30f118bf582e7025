//! Tracer-wide constants.

/// Command prefix handled by the tracer's command processor.
pub const HANDLER_NAME: &str = "ntrc";

/// Size in bytes of one push-buffer command word.
pub const METHOD_WORD_SIZE: u32 = 4;

/// Default worker polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default settle interval after re-pausing the pusher, in milliseconds.
pub const DEFAULT_SETTLE_INTERVAL_MS: u64 = 10;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ntrc/ntrc.toml";

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "ntrc-worker";
