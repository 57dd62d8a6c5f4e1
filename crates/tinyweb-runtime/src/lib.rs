//! # tinyweb-runtime
//!
//! Platform-specific half of the tinyweb server core.
//!
//! This crate provides:
//! - `pool` - Bounded worker pool with staged and direct dispatch
//! - `event` - epoll registration, the signal self-pipe, idle sweeps (Linux)
//! - `config` - `ServerConfig` with `TW_*` environment overrides
//! - `error` - Pool, event and configuration errors

pub mod config;
pub mod error;
pub mod event;
pub mod pool;

// Re-exports
pub use config::ServerConfig;
pub use error::{ConfigError, PoolError, PoolResult};
pub use pool::{
    ConnectionPool, DispatchMode, FixedPool, Phase, PoolConfig, PooledConnection, Task, TaskFlags,
    ThreadPool,
};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub use error::{EventError, EventResult};
        pub use event::{Poller, SignalPipe, SweepTimer};
    } else {
        compile_error!("tinyweb-runtime needs epoll; only Linux is supported");
    }
}
