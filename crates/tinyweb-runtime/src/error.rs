//! Runtime error types

use std::fmt;
use std::io;

/// Thread pool errors
///
/// Capacity and mode errors are recoverable: the caller decides whether to
/// drop the request or report it to the client.
#[derive(Debug)]
pub enum PoolError {
    /// Zero workers or zero queue depth
    InvalidConfig(&'static str),
    /// A worker thread could not be spawned
    Spawn(io::Error),
    /// The queue already holds `max_requests` entries
    QueueFull,
    /// `append` on a direct pool or `append_direct` on a staged pool
    ModeMismatch,
    /// The pool no longer accepts work
    ShutDown,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::InvalidConfig(msg) => write!(f, "Invalid pool config: {}", msg),
            PoolError::Spawn(e) => write!(f, "Failed to spawn worker: {}", e),
            PoolError::QueueFull => write!(f, "Request queue full"),
            PoolError::ModeMismatch => write!(f, "Append does not match pool dispatch mode"),
            PoolError::ShutDown => write!(f, "Pool is shut down"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        use nix::errno::Errno;

        /// Descriptor, epoll and signal errors
        #[derive(Debug)]
        pub enum EventError {
            /// A system call failed
            Os(Errno),
            /// Reading or writing a descriptor failed
            Io(io::Error),
            /// Another `SignalPipe` is still alive
            PipeInUse,
        }

        impl fmt::Display for EventError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    EventError::Os(errno) => write!(f, "OS error: {} ({})", errno.desc(), *errno as i32),
                    EventError::Io(e) => write!(f, "I/O error: {}", e),
                    EventError::PipeInUse => write!(f, "A signal pipe is already installed"),
                }
            }
        }

        impl std::error::Error for EventError {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                match self {
                    EventError::Os(errno) => Some(errno),
                    EventError::Io(e) => Some(e),
                    EventError::PipeInUse => None,
                }
            }
        }

        impl From<Errno> for EventError {
            fn from(errno: Errno) -> Self {
                EventError::Os(errno)
            }
        }

        impl From<io::Error> for EventError {
            fn from(e: io::Error) -> Self {
                EventError::Io(e)
            }
        }

        pub type EventResult<T> = Result<T, EventError>;
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::QueueFull.to_string(), "Request queue full");
        let e = PoolError::InvalidConfig("threads must be > 0");
        assert!(e.to_string().contains("threads must be > 0"));
    }

    #[test]
    fn test_spawn_error_source() {
        use std::error::Error;
        let e = PoolError::Spawn(io::Error::new(io::ErrorKind::Other, "no threads"));
        assert!(e.source().is_some());
        assert!(PoolError::ShutDown.source().is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_event_error_from_errno() {
        let e: EventError = Errno::EBADF.into();
        assert!(matches!(e, EventError::Os(Errno::EBADF)));
        assert!(e.to_string().contains("OS error"));
    }
}
