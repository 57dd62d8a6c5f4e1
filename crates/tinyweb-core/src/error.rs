//! Error types for the tinyweb core

use core::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised while setting up or rotating the log file
#[derive(Debug)]
pub enum LogError {
    /// Log file could not be created or opened for append
    Open {
        path: PathBuf,
        source: io::Error,
    },

    /// Asynchronous consumer thread could not be started
    Spawn(io::Error),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::Open { path, source } => {
                write!(f, "cannot open log file {}: {}", path.display(), source)
            }
            LogError::Spawn(e) => write!(f, "cannot spawn log writer thread: {}", e),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LogError::Open { source, .. } => Some(source),
            LogError::Spawn(e) => Some(e),
        }
    }
}

/// Errors returned by timeout list operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Handle refers to a timer that expired, was removed, or never existed
    StaleHandle,

    /// Deadlines may only be extended; the list never moves a record backward
    DeadlineMovedEarlier,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::StaleHandle => write!(f, "timer handle is stale"),
            TimerError::DeadlineMovedEarlier => {
                write!(f, "timer deadline can only be extended")
            }
        }
    }
}

impl std::error::Error for TimerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(TimerError::StaleHandle.to_string(), "timer handle is stale");

        let e = LogError::Open {
            path: PathBuf::from("/nope/log"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("cannot open log file /nope/log"));
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;

        let e = LogError::Spawn(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(e.source().is_some());
        assert!(TimerError::DeadlineMovedEarlier.source().is_none());
    }
}
