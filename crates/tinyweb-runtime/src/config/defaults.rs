//! Compile-time defaults for `ServerConfig`
//!
//! Every value can be overridden at runtime through the matching `TW_*`
//! environment variable, see `ServerConfig::from_env`.

/// Worker threads in the pool
pub const THREADS: usize = 8;

/// Request queue depth
pub const MAX_REQUESTS: usize = 10_000;

/// Base log path; the file name gets a `YYYY_MM_DD_` prefix
pub const LOG_PATH: &str = "./ServerLog";

pub const LOG_ENABLED: bool = true;

/// Deliver log lines through the background writer
pub const LOG_ASYNC: bool = false;

/// Bytes per rendered log line
pub const LOG_BUFFER_SIZE: usize = tinyweb_core::constants::LOG_BUFFER_SIZE;

/// Lines per log file before a same-day rotation
pub const LOG_SPLIT_LINES: u64 = 800_000;

/// Async log queue capacity
pub const LOG_QUEUE_CAPACITY: usize = 800;

/// Alarm period in seconds; idle connections live three of these
pub const TIMESLOT_SECS: u64 = 5;

/// Idle timeout expressed in timeslots
pub const IDLE_TIMESLOTS: u32 = 3;

/// Edge-triggered listening socket
pub const LISTEN_EDGE: bool = false;

/// Edge-triggered client sockets
pub const CONN_EDGE: bool = false;

/// Register client sockets with EPOLLONESHOT
pub const ONE_SHOT: bool = true;
