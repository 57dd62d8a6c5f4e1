//! Work items and their completion flags

use std::sync::atomic::{AtomicBool, Ordering};

/// Unit of work handed to the pool
///
/// A task is shared between the event loop, which owns the descriptor,
/// and the worker that services it, hence `Sync` and `&self` methods.
pub trait Task: Send + Sync + 'static {
    /// Resource borrowed from the connection pool for `process`
    type Connection;

    /// Handle a request with a borrowed connection
    fn process(&self, conn: &mut Self::Connection);

    /// Pull the pending bytes off the socket; false on error or peer close
    fn read_once(&self) -> bool;

    /// Flush the prepared response; false on error
    fn write(&self) -> bool;

    /// Completion state observed by the event loop
    fn flags(&self) -> &TaskFlags;
}

/// Completion state shared between a worker and the event loop
///
/// The event loop polls `is_completed` after a staged append and tears the
/// connection down when `has_failed` is set.
#[derive(Debug, Default)]
pub struct TaskFlags {
    completed: AtomicBool,
    failed: AtomicBool,
}

impl TaskFlags {
    pub const fn new() -> Self {
        Self {
            completed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    /// Record a failure; a failed task is also complete
    #[inline]
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
        self.completed.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Clear both flags before the next round trip
    pub fn reset(&self) {
        self.failed.store(false, Ordering::Release);
        self.completed.store(false, Ordering::Release);
    }
}

/// Which half of a staged request a worker performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Read,
    Write,
}

/// Routing tag stored with each queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Read,
    Write,
    Direct,
}

impl From<Phase> for Dispatch {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Read => Dispatch::Read,
            Phase::Write => Dispatch::Write,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_lifecycle() {
        let flags = TaskFlags::new();
        assert!(!flags.is_completed());

        flags.mark_completed();
        assert!(flags.is_completed());
        assert!(!flags.has_failed());

        flags.reset();
        flags.mark_failed();
        assert!(flags.is_completed());
        assert!(flags.has_failed());

        flags.reset();
        assert!(!flags.is_completed() && !flags.has_failed());
    }

    #[test]
    fn test_phase_to_dispatch() {
        assert_eq!(Dispatch::from(Phase::Read), Dispatch::Read);
        assert_eq!(Dispatch::from(Phase::Write), Dispatch::Write);
    }
}
