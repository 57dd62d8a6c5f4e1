//! # tinyweb-core
//!
//! Core primitives for the tinyweb server.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Descriptor, signal and thread-pool plumbing lives in `tinyweb-runtime`.
//!
//! ## Modules
//!
//! - `log` - Leveled file logger with sync/async delivery and rotation
//! - `timer` - Ascending timeout list for idle-connection eviction
//! - `sync` - Counting semaphore shared by the pool and the log consumer
//! - `env` - `TW_*` environment variable parsing
//! - `error` - Error types

pub mod env;
pub mod error;
pub mod log;
pub mod sync;
pub mod timer;

// Re-exports for convenience
pub use error::{LogError, TimerError};
pub use log::{LocalClock, LogClock, LogConfig, LogLevel, LogMode, Logger};
pub use sync::Semaphore;
pub use timer::{TimerHandle, TimerList};

/// Defaults shared by the logger and the runtime configuration
pub mod constants {
    /// Formatting buffer size, bounds one rendered log line
    pub const LOG_BUFFER_SIZE: usize = 8192;

    /// Lines per log file before a same-day rotation
    pub const LOG_SPLIT_LINES: u64 = 5_000_000;

    /// Shortest buffer that still fits a timestamp, a tag and a newline
    pub const LOG_MIN_BUFFER_SIZE: usize = 64;

    /// Initial arena capacity of a timeout list
    pub const TIMER_CAPACITY: usize = 1024;
}
