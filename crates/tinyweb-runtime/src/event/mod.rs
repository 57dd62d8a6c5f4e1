//! Reactor glue: epoll registration, signal forwarding and idle eviction
//!
//! The main thread owns a `Poller`. Signals are turned into readable bytes
//! on a `SignalPipe` so they arrive through the same `wait` as socket
//! readiness. `SIGALRM` drives a `SweepTimer` that expires idle
//! connections via closures built by `eviction`.

use std::str::FromStr;

/// Level- or edge-triggered readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    #[default]
    Level,
    Edge,
}

impl FromStr for TriggerMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "level" | "lt" | "0" => Ok(TriggerMode::Level),
            "edge" | "et" | "1" => Ok(TriggerMode::Edge),
            _ => Err(()),
        }
    }
}

/// Readiness a one-shot descriptor is re-armed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod epoll;
        mod evict;
        mod signal;
        mod sweep;

        pub use epoll::{set_nonblocking, Poller};
        pub use evict::{evict_connection, eviction, show_error};
        pub use signal::{ignore, install_handler, SignalPipe};
        pub use sweep::SweepTimer;

        pub use nix::sys::epoll::{EpollEvent, EpollFlags};
        pub use nix::sys::signal::Signal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_mode_parse() {
        assert_eq!("edge".parse(), Ok(TriggerMode::Edge));
        assert_eq!("LT".parse(), Ok(TriggerMode::Level));
        assert!("both".parse::<TriggerMode>().is_err());
        assert_eq!(TriggerMode::default(), TriggerMode::Level);
    }
}
