//! Ascending timeout list for idle-connection eviction
//!
//! Records live in an arena and are chained head-to-tail in non-decreasing
//! deadline order through index links. Callers hold a `TimerHandle`.
//!
//! # Lifecycle
//!
//! ```text
//!   add ──► (adjust)* ──┬──► tick: deadline passed, callback runs
//!                       └──► remove: callback dropped unrun
//! ```
//!
//! Both exits are terminal; the handle is stale afterwards.
//!
//! # Complexity
//!
//! - Insert: O(1) at either end, otherwise a linear scan from the closer end
//! - Adjust: O(1) while the record stays ahead of its successor, otherwise
//!   a forward scan starting at the old successor
//! - Remove: O(1)
//! - Tick: O(k) for k expired records
//!
//! Deadlines only move later. `adjust` never looks backward, so an earlier
//! deadline is rejected instead of silently breaking the ordering.
//!
//! Records with equal deadlines expire in insertion order.

mod entry;

pub use entry::{ExpiryFn, TimerHandle};

use std::sync::Arc;
use std::time::Instant;

use crate::constants::TIMER_CAPACITY;
use crate::error::TimerError;
use crate::ldebug;
use crate::log::Logger;
use entry::Slot;

/// Doubly linked, deadline-ordered timer chain stored in an arena
///
/// Not synchronized; the runtime wraps it in a `Mutex` when the event loop
/// and the alarm sweep share it.
pub struct TimerList {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
    logger: Option<Arc<Logger>>,
}

impl TimerList {
    pub fn new() -> Self {
        Self::with_capacity(TIMER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            logger: None,
        }
    }

    /// Attach a logger for sweep diagnostics
    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Insert a timer that runs `on_expire` once `deadline` has passed
    pub fn add<F>(&mut self, deadline: Instant, on_expire: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let on_expire: ExpiryFn = Box::new(on_expire);
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].occupy(deadline, on_expire);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot::occupied(deadline, on_expire));
                index
            }
        };

        self.link(index, None);
        self.len += 1;

        TimerHandle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Move a timer's deadline later
    ///
    /// A record still earlier than its successor stays where it is.
    /// Otherwise it is unlinked and reinserted scanning forward from the
    /// old successor.
    pub fn adjust(&mut self, handle: TimerHandle, deadline: Instant) -> Result<(), TimerError> {
        let index = self.validate(handle)?;
        if deadline < self.slot(index).deadline {
            return Err(TimerError::DeadlineMovedEarlier);
        }
        self.slot_mut(index).deadline = deadline;

        let Some(next) = self.slot(index).next else {
            return Ok(());
        };
        if deadline < self.slot(next).deadline {
            return Ok(());
        }

        self.unlink(index);
        self.link(index, Some(next));
        Ok(())
    }

    /// Cancel a timer without running its callback
    pub fn remove(&mut self, handle: TimerHandle) -> Result<(), TimerError> {
        let index = self.validate(handle)?;
        self.unlink(index);
        self.release(index);
        Ok(())
    }

    /// Expire every record whose deadline is at or before `now`
    ///
    /// Callbacks run in ascending deadline order, each exactly once. Stops at
    /// the first record still in the future. Returns the number expired.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut expired = 0;

        while let Some(head) = self.head {
            if now < self.slot(head).deadline {
                break;
            }
            self.unlink(head);
            if let Some(on_expire) = self.release(head) {
                on_expire();
            }
            expired += 1;
        }

        if expired > 0 {
            if let Some(logger) = self.logger.as_deref() {
                ldebug!(logger, "timer sweep expired {}, {} pending", expired, self.len);
            }
        }
        expired
    }

    /// `tick` against a single reading of the monotonic clock
    pub fn tick_now(&mut self) -> usize {
        self.tick(Instant::now())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.validate(handle).is_ok()
    }

    pub fn deadline(&self, handle: TimerHandle) -> Option<Instant> {
        self.validate(handle).ok().map(|i| self.slot(i).deadline)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.head.map(|h| self.slot(h).deadline)
    }

    /// Deadlines walking head to tail
    pub fn deadlines(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(i) = cursor {
            let slot = self.slot(i);
            out.push(slot.deadline);
            cursor = slot.next;
        }
        out
    }

    /// Deadlines walking tail to head
    pub fn deadlines_rev(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.tail;
        while let Some(i) = cursor {
            let slot = self.slot(i);
            out.push(slot.deadline);
            cursor = slot.prev;
        }
        out
    }

    // ========================================================================
    // Chain surgery
    // ========================================================================

    #[inline]
    fn slot(&self, index: u32) -> &Slot {
        &self.slots[index as usize]
    }

    #[inline]
    fn slot_mut(&mut self, index: u32) -> &mut Slot {
        &mut self.slots[index as usize]
    }

    fn validate(&self, handle: TimerHandle) -> Result<u32, TimerError> {
        match self.slots.get(handle.index as usize) {
            Some(slot) if slot.live && slot.generation == handle.generation => Ok(handle.index),
            _ => Err(TimerError::StaleHandle),
        }
    }

    /// Splice an unlinked record into ascending position
    ///
    /// `scan_from` is a live record known to be at or before the insertion
    /// point; without it the scan starts from whichever end is closer.
    fn link(&mut self, index: u32, scan_from: Option<u32>) {
        let deadline = self.slot(index).deadline;

        let (Some(head), Some(tail)) = (self.head, self.tail) else {
            self.head = Some(index);
            self.tail = Some(index);
            return;
        };

        if deadline < self.slot(head).deadline {
            self.link_before(index, head);
            return;
        }
        if deadline >= self.slot(tail).deadline {
            self.link_after(index, tail);
            return;
        }

        // Strictly inside (head, tail): both scans terminate before an end.
        match scan_from {
            Some(start) => {
                let at = self.first_later(start, deadline);
                self.link_before(index, at);
            }
            None => {
                let from_head = deadline.duration_since(self.slot(head).deadline);
                let from_tail = self.slot(tail).deadline.duration_since(deadline);
                if from_head < from_tail {
                    let at = self.first_later(head, deadline);
                    self.link_before(index, at);
                } else {
                    let at = self.last_not_later(tail, deadline);
                    self.link_after(index, at);
                }
            }
        }
    }

    /// First record from `start` forward whose deadline is after `deadline`
    fn first_later(&self, start: u32, deadline: Instant) -> u32 {
        let mut cursor = start;
        while self.slot(cursor).deadline <= deadline {
            match self.slot(cursor).next {
                Some(next) => cursor = next,
                None => break,
            }
        }
        cursor
    }

    /// First record from `start` backward whose deadline is not after `deadline`
    fn last_not_later(&self, start: u32, deadline: Instant) -> u32 {
        let mut cursor = start;
        while self.slot(cursor).deadline > deadline {
            match self.slot(cursor).prev {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
        cursor
    }

    fn link_before(&mut self, index: u32, at: u32) {
        let prev = self.slot(at).prev;
        {
            let slot = self.slot_mut(index);
            slot.prev = prev;
            slot.next = Some(at);
        }
        self.slot_mut(at).prev = Some(index);
        match prev {
            Some(p) => self.slot_mut(p).next = Some(index),
            None => self.head = Some(index),
        }
    }

    fn link_after(&mut self, index: u32, at: u32) {
        let next = self.slot(at).next;
        {
            let slot = self.slot_mut(index);
            slot.prev = Some(at);
            slot.next = next;
        }
        self.slot_mut(at).next = Some(index);
        match next {
            Some(n) => self.slot_mut(n).prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let slot = self.slot(index);
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slot_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slot_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let slot = self.slot_mut(index);
        slot.prev = None;
        slot.next = None;
    }

    /// Return an unlinked slot to the free list
    fn release(&mut self, index: u32) -> Option<ExpiryFn> {
        let on_expire = self.slot_mut(index).vacate();
        self.free.push(index);
        self.len -= 1;
        on_expire
    }
}

impl Default for TimerList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerList")
            .field("len", &self.len)
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}
