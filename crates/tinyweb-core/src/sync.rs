//! Counting semaphore
//!
//! Producers `post()` without ever blocking; consumers `wait()` until a
//! permit is available. The worker pool uses one to signal pending tasks,
//! the asynchronous logger uses one to signal queued lines.
//!
//! Permits are counted, not coalesced: N posts release exactly N waits.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counting semaphore built on `Mutex` + `Condvar`
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `permits` initial permits
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Release one permit and wake one waiter
    pub fn post(&self) {
        let mut permits = self.lock();
        *permits += 1;
        drop(permits);
        self.available.notify_one();
    }

    /// Release `n` permits at once
    pub fn post_many(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut permits = self.lock();
        *permits += n;
        drop(permits);
        self.available.notify_all();
    }

    /// Block until a permit is available, then take it
    pub fn wait(&self) {
        let mut permits = self.lock();
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    /// Take a permit if one is available right now
    pub fn try_wait(&self) -> bool {
        let mut permits = self.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Block for at most `timeout`
    ///
    /// Returns `true` if a permit was taken.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = self.lock();
        while *permits == 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .available
                .wait_timeout(permits, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            permits = guard;
        }
        *permits -= 1;
        true
    }

    /// Current permit count (hint, may be stale)
    pub fn permits(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_try_wait() {
        let sem = Semaphore::new(1);
        assert!(sem.try_wait());
        assert!(!sem.try_wait());

        sem.post();
        assert_eq!(sem.permits(), 1);
        assert!(sem.try_wait());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let sem = Semaphore::new(0);
        let start = Instant::now();
        assert!(!sem.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_post_wakes_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = Arc::clone(&sem);

        let waiter = thread::spawn(move || {
            sem2.wait();
        });

        thread::sleep(Duration::from_millis(10));
        sem.post();
        waiter.join().unwrap();
        assert_eq!(sem.permits(), 0);
    }

    #[test]
    fn test_permits_are_counted() {
        let sem = Arc::new(Semaphore::new(0));
        let taken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sem = Arc::clone(&sem);
                let taken = Arc::clone(&taken);
                thread::spawn(move || {
                    sem.wait();
                    taken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        sem.post_many(4);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(taken.load(Ordering::SeqCst), 4);
        assert_eq!(sem.permits(), 0);
    }
}
