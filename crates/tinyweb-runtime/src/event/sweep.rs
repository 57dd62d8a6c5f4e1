//! Periodic idle sweep driven by `SIGALRM`

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nix::unistd::alarm;
use tinyweb_core::{ldebug, Logger, TimerList};

/// Shared timeout list plus the alarm period that sweeps it
///
/// The event loop calls `on_alarm` when `SIGALRM` comes out of the signal
/// pipe, never from the handler itself.
#[derive(Debug, Clone)]
pub struct SweepTimer {
    timers: Arc<Mutex<TimerList>>,
    interval: Duration,
    logger: Arc<Logger>,
}

impl SweepTimer {
    pub fn new(timers: Arc<Mutex<TimerList>>, interval: Duration, logger: Arc<Logger>) -> Self {
        Self {
            timers,
            interval,
            logger,
        }
    }

    /// Schedule the next `SIGALRM`, replacing any pending one
    ///
    /// Sub-second intervals round up to one second.
    pub fn arm(&self) {
        let secs = self.interval.as_secs().clamp(1, u64::from(u32::MAX)) as u32;
        alarm::set(secs);
    }

    /// Cancel a pending alarm
    pub fn disarm(&self) {
        alarm::cancel();
    }

    /// Expire overdue connections now
    pub fn sweep(&self) -> usize {
        let expired = self.lock().tick_now();
        ldebug!(self.logger, "idle sweep: {} expired", expired);
        expired
    }

    /// Sweep and schedule the next alarm
    pub fn on_alarm(&self) -> usize {
        let expired = self.sweep();
        self.arm();
        expired
    }

    /// Lock the shared list for add/adjust/remove
    pub fn lock(&self) -> MutexGuard<'_, TimerList> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn timers(&self) -> &Arc<Mutex<TimerList>> {
        &self.timers
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn sweeper(interval: Duration) -> SweepTimer {
        SweepTimer::new(
            Arc::new(Mutex::new(TimerList::new())),
            interval,
            Arc::new(Logger::disabled()),
        )
    }

    #[test]
    fn test_sweep_expires_only_overdue() {
        let sweep = sweeper(Duration::from_secs(5));
        let fired = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        for offset in [0u64, 3600] {
            let fired = Arc::clone(&fired);
            sweep.lock().add(now + Duration::from_secs(offset), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(sweep.sweep(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(sweep.lock().len(), 1);
    }

    #[test]
    fn test_arm_schedules_alarm() {
        let sweep = sweeper(Duration::from_millis(200));
        sweep.arm();
        // Rounded up to one second, cancelled before it fires
        assert_eq!(alarm::cancel(), Some(1));
        assert_eq!(sweep.interval(), Duration::from_millis(200));
    }
}
