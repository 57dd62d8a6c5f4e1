//! Connection pool seam and the RAII borrow guard

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use tinyweb_core::sync::Semaphore;

/// Source of reusable connections (database handles and the like)
pub trait ConnectionPool: Send + Sync + 'static {
    type Connection;

    /// Take a connection, waiting while every one is borrowed
    ///
    /// `None` means the pool can never serve a request.
    fn acquire(&self) -> Option<Self::Connection>;

    /// Give a connection back
    fn release(&self, conn: Self::Connection);
}

/// Borrowed connection, returned to its pool when dropped
///
/// Release happens on every exit path, unwinding included.
pub struct PooledConnection<'a, P: ConnectionPool> {
    pool: &'a P,
    conn: ManuallyDrop<P::Connection>,
}

impl<'a, P: ConnectionPool> PooledConnection<'a, P> {
    pub fn acquire(pool: &'a P) -> Option<Self> {
        pool.acquire().map(|conn| Self {
            pool,
            conn: ManuallyDrop::new(conn),
        })
    }
}

impl<P: ConnectionPool> Deref for PooledConnection<'_, P> {
    type Target = P::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<P: ConnectionPool> DerefMut for PooledConnection<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<P: ConnectionPool> Drop for PooledConnection<'_, P> {
    fn drop(&mut self) {
        // SAFETY: `conn` is taken exactly once, here, and never touched again.
        let conn = unsafe { ManuallyDrop::take(&mut self.conn) };
        self.pool.release(conn);
    }
}

/// Fixed set of connections handed out LIFO
///
/// One permit per idle connection; `acquire` blocks on it.
pub struct FixedPool<C> {
    idle: Mutex<Vec<C>>,
    permits: Semaphore,
    size: usize,
}

impl<C> FixedPool<C> {
    pub fn new(conns: Vec<C>) -> Self {
        let size = conns.len();
        Self {
            idle: Mutex::new(conns),
            permits: Semaphore::new(size),
            size,
        }
    }

    /// Take a connection only if one is idle right now
    pub fn try_acquire(&self) -> Option<C> {
        if !self.permits.try_wait() {
            return None;
        }
        self.take()
    }

    /// Connections currently not borrowed
    pub fn available(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Connections the pool was built with
    pub fn size(&self) -> usize {
        self.size
    }

    fn take(&self) -> Option<C> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop()
    }
}

impl<C: Send + 'static> ConnectionPool for FixedPool<C> {
    type Connection = C;

    fn acquire(&self) -> Option<C> {
        if self.size == 0 {
            return None;
        }
        self.permits.wait();
        self.take()
    }

    fn release(&self, conn: C) {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).push(conn);
        self.permits.post();
    }
}

impl<C> fmt::Debug for FixedPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPool")
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}
