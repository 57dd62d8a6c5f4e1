//! Leveled file logger
//!
//! One `Logger` is built at startup and shared as `Arc<Logger>` with every
//! component that logs. Its configuration is fixed at construction.
//!
//! # Delivery
//!
//! - `LogMode::Sync`: each record is written to the file under the state lock.
//! - `LogMode::Async` with `queue_capacity >= 1`: records go to a bounded
//!   FIFO drained by a dedicated `tinyweb-log` thread. When the FIFO is full
//!   the record is written synchronously instead; callers never wait for
//!   queue space and records are never dropped.
//! - `LogMode::Async` with `queue_capacity == 0` behaves like `Sync`.
//!
//! # Line format
//!
//! ```text
//! 2024-01-05 14:03:07.000123 [info]: worker 3 started
//! ```
//!
//! Lines from one thread keep program order, except that a record taking the
//! full-queue fallback can land ahead of that thread's still-queued records.
//! Across threads the file order is the order in which writers took the
//! lock, not timestamp order: two records stamped with the same microsecond
//! may appear in either order.
//!
//! # Usage
//!
//! ```ignore
//! use tinyweb_core::log::{Logger, LogConfig, LogMode};
//! use tinyweb_core::{linfo, lerror};
//!
//! let logger = Arc::new(Logger::open(
//!     LogConfig::new("./ServerLog").mode(LogMode::Async).queue_capacity(800),
//! )?);
//! linfo!(logger, "listening on port {}", port);
//! lerror!(logger, "accept failed: {}", err);
//! ```

mod clock;
mod file;
mod queue;

pub use clock::{LocalClock, LogClock, ManualClock};

use chrono::NaiveDateTime;
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::constants::{LOG_BUFFER_SIZE, LOG_MIN_BUFFER_SIZE, LOG_SPLIT_LINES};
use crate::error::LogError;
use file::LogFile;
use queue::LineQueue;

/// Record severity
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    /// Map a numeric level; anything unrecognized is `Info`
    pub fn from_raw(v: i32) -> Self {
        match v {
            0 => LogLevel::Debug,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            LogLevel::Debug => "[debug]:",
            LogLevel::Info => "[info]:",
            LogLevel::Warn => "[warn]:",
            LogLevel::Error => "[error]:",
        }
    }
}

/// Delivery mode, chosen once per logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    #[default]
    Sync,
    Async,
}

impl std::str::FromStr for LogMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" | "0" => Ok(LogMode::Sync),
            "async" | "1" => Ok(LogMode::Async),
            _ => Err(()),
        }
    }
}

/// Logger configuration with builder pattern
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base path; the file name part gets a date prefix
    pub path: PathBuf,
    /// When false the logging macros skip formatting entirely
    pub enabled: bool,
    /// Upper bound in bytes for one rendered line, newline included
    pub buffer_size: usize,
    /// Lines per file before a same-day rotation (0 disables splitting)
    pub split_lines: u64,
    /// Async FIFO capacity (0 forces synchronous writes)
    pub queue_capacity: usize,
    /// Delivery mode
    pub mode: LogMode,
}

impl LogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            buffer_size: LOG_BUFFER_SIZE,
            split_lines: LOG_SPLIT_LINES,
            queue_capacity: 0,
            mode: LogMode::Sync,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn split_lines(mut self, lines: u64) -> Self {
        self.split_lines = lines;
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = cap;
        self
    }

    pub fn mode(mut self, mode: LogMode) -> Self {
        self.mode = mode;
        self
    }
}

/// State shared with the writer thread
struct Shared {
    /// `None` for a disabled sink logger
    file: Mutex<Option<LogFile>>,
    queue: Option<LineQueue>,
}

impl Shared {
    fn lock_file(&self) -> MutexGuard<'_, Option<LogFile>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_now(&self, line: &str) {
        if let Some(file) = self.lock_file().as_mut() {
            let _ = file.write_line(line);
        }
    }
}

/// Leveled, rotating file logger
pub struct Logger {
    shared: Arc<Shared>,
    enabled: bool,
    mode: LogMode,
    buffer_size: usize,
    clock: Box<dyn LogClock>,
    writer: Option<JoinHandle<()>>,
}

impl Logger {
    /// Open a logger reading local time from the system clock
    pub fn open(config: LogConfig) -> Result<Self, LogError> {
        Self::with_clock(config, LocalClock)
    }

    /// Open a logger with an explicit clock
    pub fn with_clock(config: LogConfig, clock: impl LogClock + 'static) -> Result<Self, LogError> {
        let today = clock.now().date();
        let file = LogFile::open(&config.path, config.split_lines, today)?;

        let queue = match config.mode {
            LogMode::Async if config.queue_capacity >= 1 => {
                Some(LineQueue::new(config.queue_capacity))
            }
            _ => None,
        };

        let shared = Arc::new(Shared {
            file: Mutex::new(Some(file)),
            queue,
        });

        let writer = if shared.queue.is_some() {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name("tinyweb-log".into())
                .spawn(move || writer_loop(shared))
                .map_err(LogError::Spawn)?;
            Some(handle)
        } else {
            None
        };

        Ok(Self {
            shared,
            enabled: config.enabled,
            mode: config.mode,
            buffer_size: config.buffer_size.max(LOG_MIN_BUFFER_SIZE),
            clock: Box::new(clock),
            writer,
        })
    }

    /// Logger that accepts every call and writes nothing
    pub fn disabled() -> Self {
        Self {
            shared: Arc::new(Shared {
                file: Mutex::new(None),
                queue: None,
            }),
            enabled: false,
            mode: LogMode::Sync,
            buffer_size: LOG_BUFFER_SIZE,
            clock: Box::new(LocalClock),
            writer: None,
        }
    }

    /// Format and deliver one record
    ///
    /// Prefer the `ldebug!`/`linfo!`/`lwarn!`/`lerror!` macros, which also
    /// honour the enabled flag and flush after writing.
    pub fn write(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let now = self.clock.now();
        let line = format_line(now, level, args, self.buffer_size);

        let Some(queue) = self.shared.queue.as_ref() else {
            let mut guard = self.shared.lock_file();
            if let Some(file) = guard.as_mut() {
                rotate(file, now);
                let _ = file.write_line(&line);
            }
            return;
        };

        {
            let mut guard = self.shared.lock_file();
            match guard.as_mut() {
                Some(file) => rotate(file, now),
                None => return,
            }
        }

        if let Err(line) = queue.try_push(line) {
            self.shared.write_now(&line);
        }
    }

    /// Push buffered file contents to the OS
    pub fn flush(&self) {
        if let Some(file) = self.shared.lock_file().as_mut() {
            let _ = file.flush();
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn mode(&self) -> LogMode {
        self.mode
    }

    /// True when records go through the writer thread
    #[inline]
    pub fn is_async(&self) -> bool {
        self.shared.queue.is_some()
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> Option<PathBuf> {
        self.shared
            .lock_file()
            .as_ref()
            .map(|f| f.path().to_path_buf())
    }

    /// Lines counted since the last day change
    pub fn line_count(&self) -> u64 {
        self.shared.lock_file().as_ref().map_or(0, |f| f.count())
    }

    /// Lines waiting for the writer thread
    pub fn pending(&self) -> usize {
        self.shared.queue.as_ref().map_or(0, LineQueue::len)
    }

    /// Async FIFO capacity, 0 in synchronous mode
    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.as_ref().map_or(0, LineQueue::capacity)
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if let Some(queue) = self.shared.queue.as_ref() {
            queue.close();
        }
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
        self.flush();
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.enabled)
            .field("mode", &self.mode)
            .field("async", &self.is_async())
            .field("path", &self.current_path())
            .finish()
    }
}

fn rotate(file: &mut LogFile, now: NaiveDateTime) {
    if let Err(e) = file.advance(now.date()) {
        // The logger cannot report on itself; keep the old file and say so once per failure.
        eprintln!("tinyweb: log rotation failed: {}", e);
    }
}

fn writer_loop(shared: Arc<Shared>) {
    let Some(queue) = shared.queue.as_ref() else {
        return;
    };
    while let Some(line) = queue.pop_blocking() {
        shared.write_now(&line);
    }
    if let Some(file) = shared.lock_file().as_mut() {
        let _ = file.flush();
    }
}

/// Render `"<date> <time>.<micros> [tag]: <message>\n"` within `limit` bytes
fn format_line(now: NaiveDateTime, level: LogLevel, args: fmt::Arguments<'_>, limit: usize) -> String {
    let mut line = String::with_capacity(128);
    let _ = write!(line, "{} {} ", now.format("%Y-%m-%d %H:%M:%S%.6f"), level.tag());
    let prefix = line.len();
    let _ = line.write_fmt(args);

    let max = limit.saturating_sub(1).max(prefix);
    if line.len() > max {
        let mut cut = max;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    line.push('\n');
    line
}

// ============================================================================
// Public Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __tinyweb_log {
    ($level:expr, $logger:expr, $($arg:tt)*) => {{
        let logger: &$crate::log::Logger = &$logger;
        if logger.enabled() {
            logger.write($level, format_args!($($arg)*));
            logger.flush();
        }
    }};
}

/// Debug level record
#[macro_export]
macro_rules! ldebug {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__tinyweb_log!($crate::log::LogLevel::Debug, $logger, $($arg)*)
    };
}

/// Info level record
#[macro_export]
macro_rules! linfo {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__tinyweb_log!($crate::log::LogLevel::Info, $logger, $($arg)*)
    };
}

/// Warning level record
#[macro_export]
macro_rules! lwarn {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__tinyweb_log!($crate::log::LogLevel::Warn, $logger, $($arg)*)
    };
}

/// Error level record
#[macro_export]
macro_rules! lerror {
    ($logger:expr, $($arg:tt)*) => {
        $crate::__tinyweb_log!($crate::log::LogLevel::Error, $logger, $($arg)*)
    };
}

// ============================================================================
// Tests
// ============================================================================
