//! Server configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env` only)
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use tinyweb_runtime::config::ServerConfig;
//!
//! let config = ServerConfig::from_env()
//!     .threads(4)
//!     .timeslot(Duration::from_secs(2));
//! config.validate()?;
//!
//! let logger = Arc::new(Logger::open(config.log_config())?);
//! let pool = ThreadPool::new(config.pool_config(), conns, logger)?;
//! ```

pub mod defaults;

use std::path::PathBuf;
use std::time::Duration;

use tinyweb_core::env::{env_get, env_get_bool};
use tinyweb_core::{linfo, LogConfig, LogMode, Logger};

pub use crate::error::ConfigError;
use crate::event::TriggerMode;
use crate::pool::{DispatchMode, PoolConfig};

/// Every knob the server core consumes
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Worker threads in the pool
    pub threads: usize,
    /// Request queue depth
    pub max_requests: usize,
    /// Staged (workers do I/O) or direct (reactor does I/O)
    pub dispatch: DispatchMode,
    /// Base log path
    pub log_path: PathBuf,
    /// Master switch for the logging macros
    pub log_enabled: bool,
    pub log_mode: LogMode,
    /// Bytes per rendered log line
    pub log_buffer_size: usize,
    /// Lines per log file before a same-day rotation
    pub log_split_lines: u64,
    /// Async log queue capacity
    pub log_queue_capacity: usize,
    /// Alarm period for the idle sweep
    pub timeslot: Duration,
    pub listen_trigger: TriggerMode,
    pub conn_trigger: TriggerMode,
    /// Register client sockets with EPOLLONESHOT
    pub one_shot: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn trigger(edge: bool) -> TriggerMode {
    if edge {
        TriggerMode::Edge
    } else {
        TriggerMode::Level
    }
}

impl ServerConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `TW_THREADS` - Worker threads
    /// - `TW_MAX_REQUESTS` - Request queue depth
    /// - `TW_DISPATCH` - `staged` or `direct`
    /// - `TW_LOG_PATH` - Base log path
    /// - `TW_LOG` - Enable logging (0/1)
    /// - `TW_LOG_MODE` - `sync` or `async`
    /// - `TW_LOG_BUFFER` - Bytes per log line
    /// - `TW_LOG_SPLIT_LINES` - Lines per log file
    /// - `TW_LOG_QUEUE` - Async log queue capacity
    /// - `TW_TIMESLOT_SECS` - Sweep period in seconds
    /// - `TW_LISTEN_TRIGGER` - `level` or `edge`
    /// - `TW_CONN_TRIGGER` - `level` or `edge`
    /// - `TW_ONE_SHOT` - EPOLLONESHOT on client sockets (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            threads: env_get("TW_THREADS", base.threads),
            max_requests: env_get("TW_MAX_REQUESTS", base.max_requests),
            dispatch: env_get("TW_DISPATCH", base.dispatch),
            log_path: env_get("TW_LOG_PATH", base.log_path),
            log_enabled: env_get_bool("TW_LOG", base.log_enabled),
            log_mode: env_get("TW_LOG_MODE", base.log_mode),
            log_buffer_size: env_get("TW_LOG_BUFFER", base.log_buffer_size),
            log_split_lines: env_get("TW_LOG_SPLIT_LINES", base.log_split_lines),
            log_queue_capacity: env_get("TW_LOG_QUEUE", base.log_queue_capacity),
            timeslot: Duration::from_secs(env_get("TW_TIMESLOT_SECS", defaults::TIMESLOT_SECS)),
            listen_trigger: env_get("TW_LISTEN_TRIGGER", base.listen_trigger),
            conn_trigger: env_get("TW_CONN_TRIGGER", base.conn_trigger),
            one_shot: env_get_bool("TW_ONE_SHOT", base.one_shot),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            threads: defaults::THREADS,
            max_requests: defaults::MAX_REQUESTS,
            dispatch: DispatchMode::Direct,
            log_path: PathBuf::from(defaults::LOG_PATH),
            log_enabled: defaults::LOG_ENABLED,
            log_mode: if defaults::LOG_ASYNC { LogMode::Async } else { LogMode::Sync },
            log_buffer_size: defaults::LOG_BUFFER_SIZE,
            log_split_lines: defaults::LOG_SPLIT_LINES,
            log_queue_capacity: defaults::LOG_QUEUE_CAPACITY,
            timeslot: Duration::from_secs(defaults::TIMESLOT_SECS),
            listen_trigger: trigger(defaults::LISTEN_EDGE),
            conn_trigger: trigger(defaults::CONN_EDGE),
            one_shot: defaults::ONE_SHOT,
        }
    }

    // Builder methods

    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    pub fn max_requests(mut self, n: usize) -> Self {
        self.max_requests = n;
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    pub fn log_enabled(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    pub fn log_mode(mut self, mode: LogMode) -> Self {
        self.log_mode = mode;
        self
    }

    pub fn log_buffer_size(mut self, size: usize) -> Self {
        self.log_buffer_size = size;
        self
    }

    pub fn log_split_lines(mut self, lines: u64) -> Self {
        self.log_split_lines = lines;
        self
    }

    pub fn log_queue_capacity(mut self, cap: usize) -> Self {
        self.log_queue_capacity = cap;
        self
    }

    pub fn timeslot(mut self, d: Duration) -> Self {
        self.timeslot = d;
        self
    }

    pub fn listen_trigger(mut self, mode: TriggerMode) -> Self {
        self.listen_trigger = mode;
        self
    }

    pub fn conn_trigger(mut self, mode: TriggerMode) -> Self {
        self.conn_trigger = mode;
        self
    }

    pub fn one_shot(mut self, enable: bool) -> Self {
        self.one_shot = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidValue("threads must be > 0"));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::InvalidValue("max_requests must be > 0"));
        }
        if self.log_path.file_name().is_none() {
            return Err(ConfigError::InvalidValue("log_path must name a file"));
        }
        if self.log_buffer_size < tinyweb_core::constants::LOG_MIN_BUFFER_SIZE {
            return Err(ConfigError::InvalidValue("log_buffer_size too small"));
        }
        if self.timeslot.as_secs() == 0 {
            return Err(ConfigError::InvalidValue("timeslot must be at least one second"));
        }
        Ok(())
    }

    /// Pool view of this configuration
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .threads(self.threads)
            .max_requests(self.max_requests)
            .mode(self.dispatch)
    }

    /// Logger view of this configuration
    pub fn log_config(&self) -> LogConfig {
        LogConfig::new(self.log_path.clone())
            .enabled(self.log_enabled)
            .mode(self.log_mode)
            .buffer_size(self.log_buffer_size)
            .split_lines(self.log_split_lines)
            .queue_capacity(self.log_queue_capacity)
    }

    /// How long a silent connection survives
    pub fn idle_timeout(&self) -> Duration {
        self.timeslot * defaults::IDLE_TIMESLOTS
    }

    /// Write the effective configuration to the log at info level
    pub fn log_summary(&self, logger: &Logger) {
        linfo!(logger, "tinyweb configuration:");
        linfo!(logger, "  threads:            {}", self.threads);
        linfo!(logger, "  max_requests:       {}", self.max_requests);
        linfo!(logger, "  dispatch:           {:?}", self.dispatch);
        linfo!(logger, "  log_path:           {}", self.log_path.display());
        linfo!(logger, "  log_mode:           {:?}", self.log_mode);
        linfo!(logger, "  log_buffer_size:    {}", self.log_buffer_size);
        linfo!(logger, "  log_split_lines:    {}", self.log_split_lines);
        linfo!(logger, "  log_queue_capacity: {}", self.log_queue_capacity);
        linfo!(logger, "  timeslot:           {:?}", self.timeslot);
        linfo!(logger, "  listen_trigger:     {:?}", self.listen_trigger);
        linfo!(logger, "  conn_trigger:       {:?}", self.conn_trigger);
        linfo!(logger, "  one_shot:           {}", self.one_shot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new();
        assert_eq!(config.threads, 8);
        assert_eq!(config.max_requests, 10_000);
        assert_eq!(config.dispatch, DispatchMode::Direct);
        assert_eq!(config.log_path, PathBuf::from("./ServerLog"));
        assert_eq!(config.log_mode, LogMode::Sync);
        assert_eq!(config.log_split_lines, 800_000);
        assert_eq!(config.log_queue_capacity, 800);
        assert_eq!(config.listen_trigger, TriggerMode::Level);
        assert!(config.one_shot);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("TW_DISPATCH", "staged");
        std::env::set_var("TW_CONN_TRIGGER", "edge");
        std::env::set_var("TW_LOG_MODE", "async");
        let config = ServerConfig::from_env();
        std::env::remove_var("TW_DISPATCH");
        std::env::remove_var("TW_CONN_TRIGGER");
        std::env::remove_var("TW_LOG_MODE");

        assert_eq!(config.dispatch, DispatchMode::Staged);
        assert_eq!(config.conn_trigger, TriggerMode::Edge);
        assert_eq!(config.log_mode, LogMode::Async);
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .threads(2)
            .dispatch(DispatchMode::Staged)
            .timeslot(Duration::from_secs(2))
            .one_shot(false);

        assert_eq!(config.threads, 2);
        assert!(!config.one_shot);
        assert_eq!(config.idle_timeout(), Duration::from_secs(6));

        let pool = config.pool_config();
        assert_eq!(pool.threads, 2);
        assert_eq!(pool.mode, DispatchMode::Staged);
    }

    #[test]
    fn test_log_config_view() {
        let config = ServerConfig::new()
            .log_path("/tmp/tw/app")
            .log_mode(LogMode::Async)
            .log_queue_capacity(16)
            .log_enabled(false);
        let log = config.log_config();

        assert_eq!(log.path, PathBuf::from("/tmp/tw/app"));
        assert_eq!(log.mode, LogMode::Async);
        assert_eq!(log.queue_capacity, 16);
        assert!(!log.enabled);
    }

    #[test]
    fn test_validation() {
        assert!(ServerConfig::new().threads(0).validate().is_err());
        assert!(ServerConfig::new().max_requests(0).validate().is_err());
        assert!(ServerConfig::new().log_path("/").validate().is_err());
        assert!(ServerConfig::new().timeslot(Duration::from_millis(10)).validate().is_err());
        assert!(ServerConfig::new().log_buffer_size(8).validate().is_err());
    }

    #[test]
    fn test_log_summary_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new().log_path(dir.path().join("summary"));
        let logger = Logger::open(config.log_config()).unwrap();

        config.log_summary(&logger);
        assert_eq!(logger.line_count(), 13);
    }
}
