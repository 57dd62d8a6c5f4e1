//! Wall-clock source for log timestamps and dated file names

use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::{Arc, Mutex, PoisonError};

/// Supplies local calendar time to the logger
///
/// The logger reads the clock once per record: the same reading stamps the
/// line and drives day-based rotation.
pub trait LogClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// System local time (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl LogClock for LocalClock {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

impl<C: LogClock + ?Sized> LogClock for Arc<C> {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

/// Manually driven clock
///
/// Holds a fixed instant until told otherwise. Share it as `Arc<ManualClock>`
/// to move time forward after handing it to a logger.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl LogClock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
