//! Timer record and handle types

use std::fmt;
use std::time::Instant;

/// Callback run once when a timer expires
pub type ExpiryFn = Box<dyn FnOnce() + Send + 'static>;

/// Generation-checked reference to a timer record
///
/// The caller keeps the handle to extend or cancel its timer. A handle goes
/// stale when the record expires or is removed; the slot may then be reused
/// under a newer generation, so an old handle can never touch the new timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl TimerHandle {
    /// Arena slot (for debugging/logging)
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}.{}", self.index, self.generation)
    }
}

/// Arena slot holding one timer record
///
/// `live` is false while the slot sits on the free list; `prev`/`next` are
/// only meaningful for live slots.
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) live: bool,
    pub(crate) deadline: Instant,
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
    pub(crate) on_expire: Option<ExpiryFn>,
}

impl Slot {
    pub(crate) fn occupied(deadline: Instant, on_expire: ExpiryFn) -> Self {
        Self {
            generation: 0,
            live: true,
            deadline,
            prev: None,
            next: None,
            on_expire: Some(on_expire),
        }
    }

    /// Fill a free slot, keeping its generation
    pub(crate) fn occupy(&mut self, deadline: Instant, on_expire: ExpiryFn) {
        self.live = true;
        self.deadline = deadline;
        self.prev = None;
        self.next = None;
        self.on_expire = Some(on_expire);
    }

    /// Empty the slot and retire its generation
    pub(crate) fn vacate(&mut self) -> Option<ExpiryFn> {
        self.live = false;
        self.prev = None;
        self.next = None;
        self.generation = self.generation.wrapping_add(1);
        self.on_expire.take()
    }
}
