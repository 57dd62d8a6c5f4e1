//! Bounded FIFO of formatted lines between producers and the log writer
//!
//! Producers never block: `try_push` hands the line back when the queue is
//! full so the caller can write it synchronously. The single consumer blocks
//! on the semaphore until a line (or the close marker) arrives.

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::sync::Semaphore;

pub(crate) struct LineQueue {
    lines: ArrayQueue<String>,
    ready: Semaphore,
    closed: AtomicBool,
}

impl LineQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: ArrayQueue::new(capacity.max(1)),
            ready: Semaphore::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue without blocking, returning the line if the queue is full
    pub(crate) fn try_push(&self, line: String) -> Result<(), String> {
        self.lines.push(line)?;
        self.ready.post();
        Ok(())
    }

    /// Block until a line is available
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub(crate) fn pop_blocking(&self) -> Option<String> {
        loop {
            self.ready.wait();
            if let Some(line) = self.lines.pop() {
                return Some(line);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
        }
    }

    /// Wake the consumer for the last time
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.post();
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.lines.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_returns_line() {
        let q = LineQueue::new(2);
        q.try_push("a".into()).unwrap();
        q.try_push("b".into()).unwrap();

        let back = q.try_push("c".into()).unwrap_err();
        assert_eq!(back, "c");
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_drains_before_close() {
        let q = LineQueue::new(4);
        q.try_push("a".into()).unwrap();
        q.try_push("b".into()).unwrap();
        q.close();

        assert_eq!(q.pop_blocking().as_deref(), Some("a"));
        assert_eq!(q.pop_blocking().as_deref(), Some("b"));
        assert_eq!(q.pop_blocking(), None);
    }
}
