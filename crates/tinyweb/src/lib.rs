//! # tinyweb - half-sync/half-reactive server core
//!
//! The main thread multiplexes sockets and signals over epoll; a bounded
//! pool of worker threads processes requests; an ascending timeout list
//! closes idle connections on every `SIGALRM`; a leveled file logger
//! records it all.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tinyweb::{Control, Core, FixedPool, ServerConfig};
//!
//! let config = ServerConfig::from_env();
//! let mut core: Core<MyTask, FixedPool<Db>> = Core::start(config, Arc::new(FixedPool::new(dbs)))?;
//!
//! loop {
//!     let n = core.poller().wait(&mut events, None)?;
//!     for ev in &events[..n] {
//!         let fd = ev.data() as RawFd;
//!         if fd == core.signal_fd() {
//!             if core.handle_signals()? == Control::Stop { return Ok(()); }
//!         }
//!         // accept / read / write ...
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Main thread (reactor)                       │
//! │     Poller::wait, accept, SignalPipe, SweepTimer            │
//! └─────────────────────────────────────────────────────────────┘
//!              │ append / append_direct           ▲ rearm
//!              ▼                                  │
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ThreadPool (bounded FIFO + semaphore)          │
//! │     read_once / process(conn) / write, TaskFlags            │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                  │
//!              ▼                                  ▼
//!    ┌───────────────────┐              ┌───────────────────┐
//!    │  ConnectionPool   │              │      Logger       │
//!    │  (RAII borrow)    │              │ (sync / async)    │
//!    └───────────────────┘              └───────────────────┘
//! ```

use std::fmt;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

// Re-export core types
pub use tinyweb_core::{
    LocalClock, LogClock, LogConfig, LogError, LogLevel, LogMode, Logger, Semaphore, TimerError,
    TimerHandle, TimerList,
};

// Re-export logging macros
pub use tinyweb_core::{ldebug, lerror, linfo, lwarn};

// Re-export env utilities
pub use tinyweb_core::env::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use tinyweb_runtime::event::{
    self, EpollEvent, EpollFlags, Interest, Signal, TriggerMode,
};
pub use tinyweb_runtime::{
    ConfigError, ConnectionPool, DispatchMode, EventError, FixedPool, Phase, PoolConfig,
    PoolError, PooledConnection, Poller, ServerConfig, SignalPipe, SweepTimer, Task, TaskFlags,
    ThreadPool,
};

/// Failure while bringing the core up
#[derive(Debug)]
pub enum StartError {
    Config(ConfigError),
    Log(LogError),
    Pool(PoolError),
    Event(EventError),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Config(e) => write!(f, "{}", e),
            StartError::Log(e) => write!(f, "logger: {}", e),
            StartError::Pool(e) => write!(f, "thread pool: {}", e),
            StartError::Event(e) => write!(f, "event loop: {}", e),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::Config(e) => Some(e),
            StartError::Log(e) => Some(e),
            StartError::Pool(e) => Some(e),
            StartError::Event(e) => Some(e),
        }
    }
}

impl From<ConfigError> for StartError {
    fn from(e: ConfigError) -> Self {
        StartError::Config(e)
    }
}

impl From<LogError> for StartError {
    fn from(e: LogError) -> Self {
        StartError::Log(e)
    }
}

impl From<PoolError> for StartError {
    fn from(e: PoolError) -> Self {
        StartError::Pool(e)
    }
}

impl From<EventError> for StartError {
    fn from(e: EventError) -> Self {
        StartError::Event(e)
    }
}

/// What the event loop should do after draining the signal pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Everything the reactor thread owns, built from one `ServerConfig`
pub struct Core<T, P>
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    config: ServerConfig,
    logger: Arc<Logger>,
    pool: ThreadPool<T, P>,
    poller: Arc<Poller>,
    signals: SignalPipe,
    sweep: SweepTimer,
    users: Arc<AtomicUsize>,
}

impl<T, P> Core<T, P>
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    /// Validate `config`, open the log, start the workers and route signals
    ///
    /// `SIGPIPE` is ignored. `SIGALRM` and `SIGTERM` are forwarded through
    /// the signal pipe, and the first alarm is armed.
    pub fn start(config: ServerConfig, conns: Arc<P>) -> Result<Self, StartError> {
        config.validate()?;

        let logger = Arc::new(Logger::open(config.log_config())?);
        config.log_summary(&logger);

        let pool = ThreadPool::new(config.pool_config(), conns, Arc::clone(&logger))?;
        let poller = Arc::new(Poller::new()?);

        let signals = SignalPipe::new()?;
        poller.register(signals.read_fd(), false, TriggerMode::Level)?;
        event::ignore(Signal::SIGPIPE)?;
        signals.forward(Signal::SIGALRM, true)?;
        signals.forward(Signal::SIGTERM, true)?;

        let timers = TimerList::new().with_logger(Arc::clone(&logger));
        let sweep = SweepTimer::new(Arc::new(Mutex::new(timers)), config.timeslot, Arc::clone(&logger));
        sweep.arm();

        linfo!(logger, "core started");
        Ok(Self {
            config,
            logger,
            pool,
            poller,
            signals,
            sweep,
            users: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Start tracking an accepted client
    ///
    /// Registers `fd` with the client trigger mode and one-shot setting and
    /// schedules its eviction one idle timeout from now.
    pub fn watch(&self, fd: RawFd) -> Result<TimerHandle, EventError> {
        self.poller.register(fd, self.config.one_shot, self.config.conn_trigger)?;
        self.users.fetch_add(1, Ordering::AcqRel);

        let evict = event::eviction(
            Arc::clone(&self.poller),
            fd,
            Arc::clone(&self.users),
            Arc::clone(&self.logger),
        );
        let deadline = Instant::now() + self.config.idle_timeout();
        Ok(self.sweep.lock().add(deadline, evict))
    }

    /// Push a client's eviction one idle timeout into the future
    pub fn touch(&self, handle: TimerHandle) -> Result<(), TimerError> {
        let deadline = Instant::now() + self.config.idle_timeout();
        self.sweep.lock().adjust(handle, deadline)?;
        ldebug!(self.logger, "adjust {}", handle);
        Ok(())
    }

    /// Re-enable a one-shot client for the given readiness
    pub fn rearm(&self, fd: RawFd, interest: Interest) -> Result<(), EventError> {
        self.poller.rearm(fd, interest, self.config.conn_trigger)
    }

    /// Close a client now and cancel its timer
    ///
    /// A timer that already fired closed the descriptor itself; nothing
    /// more happens then.
    pub fn close(&self, handle: TimerHandle, fd: RawFd) -> Result<(), EventError> {
        if self.sweep.lock().remove(handle).is_err() {
            return Ok(());
        }
        linfo!(self.logger, "close fd {}", fd);
        event::evict_connection(&self.poller, fd, &self.users)
    }

    /// Drain the signal pipe
    ///
    /// `SIGALRM` runs an idle sweep and re-arms the alarm. `SIGTERM` asks
    /// the loop to stop.
    pub fn handle_signals(&mut self) -> Result<Control, EventError> {
        let mut control = Control::Continue;
        for signal in self.signals.drain()? {
            match signal {
                Signal::SIGALRM => {
                    self.sweep.on_alarm();
                }
                Signal::SIGTERM => {
                    linfo!(self.logger, "SIGTERM received, stopping");
                    control = Control::Stop;
                }
                other => ldebug!(self.logger, "ignoring {:?}", other),
            }
        }
        Ok(control)
    }

    #[inline]
    pub fn signal_fd(&self) -> RawFd {
        self.signals.read_fd()
    }

    /// Connected clients
    pub fn users(&self) -> usize {
        self.users.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn pool(&self) -> &ThreadPool<T, P> {
        &self.pool
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn sweep(&self) -> &SweepTimer {
        &self.sweep
    }
}

impl<T, P> Drop for Core<T, P>
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    fn drop(&mut self) {
        self.sweep.disarm();
        linfo!(self.logger, "core stopped");
    }
}
