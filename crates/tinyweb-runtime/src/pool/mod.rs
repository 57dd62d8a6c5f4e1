//! Bounded worker pool (the half-sync side)
//!
//! The event loop appends requests; `threads` workers block on a counting
//! semaphore, pop the head of a mutex-guarded FIFO and dispatch it.
//!
//! # Dispatch modes
//!
//! ```text
//!   Staged:  append(task, Read)  ──► read_once ─► process(conn) ─► completed
//!            append(task, Write) ──► write ─────────────────────► completed
//!   Direct:  append_direct(task) ──► process(conn) ─────────────► completed
//! ```
//!
//! `process` waits for a pooled connection when all are borrowed. Any failure
//! (I/O, a connection pool that can never serve, panic) marks the task failed.
//! The phase rides with each queued request, so concurrent appends of
//! different phases never race.

mod conn;
mod task;

pub use conn::{ConnectionPool, FixedPool, PooledConnection};
pub use task::{Dispatch, Phase, Task, TaskFlags};

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tinyweb_core::sync::Semaphore;
use tinyweb_core::{ldebug, lerror, lwarn, Logger};

use crate::config::defaults;
use crate::error::{PoolError, PoolResult};

/// How the pool interprets queued work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Reactor performs I/O, workers only process
    #[default]
    Direct,
    /// Workers perform the read or write phase themselves
    Staged,
}

impl FromStr for DispatchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "proactor" | "0" => Ok(DispatchMode::Direct),
            "staged" | "reactor" | "1" => Ok(DispatchMode::Staged),
            _ => Err(()),
        }
    }
}

/// Pool sizing and mode
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker threads
    pub threads: usize,
    /// Queue capacity
    pub max_requests: usize,
    pub mode: DispatchMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: defaults::THREADS,
            max_requests: defaults::MAX_REQUESTS,
            mode: DispatchMode::default(),
        }
    }
}

impl PoolConfig {
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    pub fn max_requests(mut self, n: usize) -> Self {
        self.max_requests = n;
        self
    }

    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.threads == 0 {
            return Err(PoolError::InvalidConfig("threads must be > 0"));
        }
        if self.max_requests == 0 {
            return Err(PoolError::InvalidConfig("max_requests must be > 0"));
        }
        Ok(())
    }
}

struct Request<T> {
    task: Arc<T>,
    dispatch: Dispatch,
}

/// State shared by the pool handle and its workers
struct Shared<T, P> {
    queue: Mutex<VecDeque<Request<T>>>,
    pending: Semaphore,
    shutdown: AtomicBool,
    active: AtomicUsize,
    capacity: usize,
    conns: Arc<P>,
    logger: Arc<Logger>,
}

impl<T, P> Shared<T, P> {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Request<T>>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fixed-size pool of named worker threads
pub struct ThreadPool<T, P>
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    shared: Arc<Shared<T, P>>,
    workers: Vec<JoinHandle<()>>,
    config: PoolConfig,
}

impl<T, P> ThreadPool<T, P>
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    /// Validate `config` and start the workers
    pub fn new(config: PoolConfig, conns: Arc<P>, logger: Arc<Logger>) -> PoolResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(config.max_requests.min(1024))),
            pending: Semaphore::new(0),
            shutdown: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            capacity: config.max_requests,
            conns,
            logger,
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(config.threads),
            config,
        };

        for id in 0..pool.config.threads {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("tinyweb-worker-{}", id))
                .spawn(move || worker_loop(id, shared));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    lerror!(pool.shared.logger, "failed to spawn worker {}: {}", id, e);
                    // Drop stops and joins whatever did start
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        Ok(pool)
    }

    /// Queue one phase of a staged request
    pub fn append(&self, task: Arc<T>, phase: Phase) -> PoolResult<()> {
        if self.config.mode != DispatchMode::Staged {
            return Err(PoolError::ModeMismatch);
        }
        self.enqueue(task, phase.into())
    }

    /// Queue a request for direct processing
    pub fn append_direct(&self, task: Arc<T>) -> PoolResult<()> {
        if self.config.mode != DispatchMode::Direct {
            return Err(PoolError::ModeMismatch);
        }
        self.enqueue(task, Dispatch::Direct)
    }

    fn enqueue(&self, task: Arc<T>, dispatch: Dispatch) -> PoolResult<()> {
        {
            let mut queue = self.shared.lock_queue();
            if self.shared.shutdown.load(Ordering::Acquire) {
                return Err(PoolError::ShutDown);
            }
            if queue.len() >= self.shared.capacity {
                drop(queue);
                lwarn!(self.shared.logger, "request queue full ({}), rejecting", self.shared.capacity);
                return Err(PoolError::QueueFull);
            }
            queue.push_back(Request { task, dispatch });
        }
        self.shared.pending.post();
        Ok(())
    }

    /// Stop accepting work
    ///
    /// Workers finish everything already queued, then exit. Idempotent;
    /// `join` or dropping the pool waits for them.
    pub fn shutdown(&self) {
        let was_running = {
            let _queue = self.shared.lock_queue();
            !self.shared.shutdown.swap(true, Ordering::AcqRel)
        };
        if was_running {
            // One wake-up per worker on top of the permits for queued work
            self.shared.pending.post_many(self.workers.len());
        }
    }

    /// Shut down and wait for every worker to exit
    pub fn join(&mut self) {
        self.shutdown();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.config.threads
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Requests waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Workers currently running a task
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn mode(&self) -> DispatchMode {
        self.config.mode
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }
}

impl<T, P> Drop for ThreadPool<T, P>
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    fn drop(&mut self) {
        self.join();
    }
}

impl<T, P> std::fmt::Debug for ThreadPool<T, P>
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.config.threads)
            .field("capacity", &self.shared.capacity)
            .field("mode", &self.config.mode)
            .field("queued", &self.queued())
            .finish()
    }
}

// ============================================================================
// Worker side
// ============================================================================

fn worker_loop<T, P>(id: usize, shared: Arc<Shared<T, P>>)
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    ldebug!(shared.logger, "worker {} started", id);

    loop {
        shared.pending.wait();

        let request = shared.lock_queue().pop_front();
        let Some(request) = request else {
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            continue;
        };

        shared.active.fetch_add(1, Ordering::AcqRel);
        run(&shared, &request);
        shared.active.fetch_sub(1, Ordering::AcqRel);
    }

    ldebug!(shared.logger, "worker {} exiting", id);
}

fn run<T, P>(shared: &Shared<T, P>, request: &Request<T>)
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    let task = &*request.task;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatch(shared, task, request.dispatch)));

    match outcome {
        Ok(true) => task.flags().mark_completed(),
        Ok(false) => task.flags().mark_failed(),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("<non-string panic>");
            lerror!(shared.logger, "task panicked during {:?}: {}", request.dispatch, msg);
            task.flags().mark_failed();
        }
    }
}

/// Perform one request; false marks the task failed
fn dispatch<T, P>(shared: &Shared<T, P>, task: &T, kind: Dispatch) -> bool
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    match kind {
        Dispatch::Read => task.read_once() && process(shared, task),
        Dispatch::Write => task.write(),
        Dispatch::Direct => process(shared, task),
    }
}

fn process<T, P>(shared: &Shared<T, P>, task: &T) -> bool
where
    T: Task,
    P: ConnectionPool<Connection = T::Connection>,
{
    match PooledConnection::acquire(&*shared.conns) {
        Some(mut conn) => {
            task.process(&mut *conn);
            true
        }
        None => {
            lerror!(shared.logger, "connection pool has no connections");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Scripted task recording which hooks ran
    #[derive(Default)]
    struct Probe {
        flags: TaskFlags,
        read_fails: bool,
        write_fails: bool,
        panics: bool,
        reads: AtomicUsize,
        writes: AtomicUsize,
        processed: AtomicUsize,
        last_conn: Mutex<Option<u32>>,
        started: Option<Arc<Semaphore>>,
        gate: Option<Arc<Semaphore>>,
        order: Option<(usize, Arc<Mutex<Vec<usize>>>)>,
    }

    impl Task for Probe {
        type Connection = u32;

        fn process(&self, conn: &mut u32) {
            if let Some(started) = &self.started {
                started.post();
            }
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            if self.panics {
                panic!("probe panic");
            }
            *self.last_conn.lock().unwrap() = Some(*conn);
            if let Some((id, log)) = &self.order {
                log.lock().unwrap().push(*id);
            }
            self.processed.fetch_add(1, Ordering::SeqCst);
        }

        fn read_once(&self) -> bool {
            self.reads.fetch_add(1, Ordering::SeqCst);
            !self.read_fails
        }

        fn write(&self) -> bool {
            self.writes.fetch_add(1, Ordering::SeqCst);
            !self.write_fails
        }

        fn flags(&self) -> &TaskFlags {
            &self.flags
        }
    }

    fn pool(
        mode: DispatchMode,
        threads: usize,
        max: usize,
        conns: Vec<u32>,
    ) -> (ThreadPool<Probe, FixedPool<u32>>, Arc<FixedPool<u32>>) {
        let conns = Arc::new(FixedPool::new(conns));
        let config = PoolConfig::default().threads(threads).max_requests(max).mode(mode);
        let pool = ThreadPool::new(config, Arc::clone(&conns), Arc::new(Logger::disabled())).unwrap();
        (pool, conns)
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(matches!(
            PoolConfig::default().threads(0).validate(),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(matches!(
            PoolConfig::default().max_requests(0).validate(),
            Err(PoolError::InvalidConfig(_))
        ));

        let conns = Arc::new(FixedPool::new(vec![1u32]));
        let r: PoolResult<ThreadPool<Probe, _>> =
            ThreadPool::new(PoolConfig::default().threads(0), conns, Arc::new(Logger::disabled()));
        assert!(r.is_err());
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!("staged".parse(), Ok(DispatchMode::Staged));
        assert_eq!("Direct".parse(), Ok(DispatchMode::Direct));
        assert_eq!("1".parse(), Ok(DispatchMode::Staged));
        assert!("sideways".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_direct_processes_with_connection() {
        let (mut pool, conns) = pool(DispatchMode::Direct, 2, 16, vec![7]);
        let tasks: Vec<_> = (0..5).map(|_| Arc::new(Probe::default())).collect();
        for t in &tasks {
            pool.append_direct(Arc::clone(t)).unwrap();
        }
        pool.join();

        for t in &tasks {
            assert!(t.flags.is_completed());
            assert!(!t.flags.has_failed());
            assert_eq!(t.processed.load(Ordering::SeqCst), 1);
            assert_eq!(*t.last_conn.lock().unwrap(), Some(7));
            assert_eq!(t.reads.load(Ordering::SeqCst), 0);
        }
        assert_eq!(conns.available(), 1);
    }

    #[test]
    fn test_single_worker_keeps_fifo_order() {
        let (mut pool, _) = pool(DispatchMode::Direct, 1, 128, vec![1]);
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..100 {
            let task = Probe {
                order: Some((id, Arc::clone(&order))),
                ..Probe::default()
            };
            pool.append_direct(Arc::new(task)).unwrap();
        }
        pool.join();

        assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_staged_read_and_write() {
        let (mut pool, _) = pool(DispatchMode::Staged, 2, 16, vec![1, 2]);

        let reader = Arc::new(Probe::default());
        let writer = Arc::new(Probe::default());
        let bad_read = Arc::new(Probe { read_fails: true, ..Probe::default() });
        let bad_write = Arc::new(Probe { write_fails: true, ..Probe::default() });

        pool.append(Arc::clone(&reader), Phase::Read).unwrap();
        pool.append(Arc::clone(&writer), Phase::Write).unwrap();
        pool.append(Arc::clone(&bad_read), Phase::Read).unwrap();
        pool.append(Arc::clone(&bad_write), Phase::Write).unwrap();
        pool.join();

        assert!(reader.flags.is_completed() && !reader.flags.has_failed());
        assert_eq!(reader.processed.load(Ordering::SeqCst), 1);

        // No connection on the write path
        assert!(writer.flags.is_completed() && !writer.flags.has_failed());
        assert_eq!(writer.writes.load(Ordering::SeqCst), 1);
        assert_eq!(writer.processed.load(Ordering::SeqCst), 0);

        assert!(bad_read.flags.has_failed());
        assert_eq!(bad_read.processed.load(Ordering::SeqCst), 0);
        assert!(bad_write.flags.has_failed());
    }

    #[test]
    fn test_mode_mismatch() {
        let (staged, _) = pool(DispatchMode::Staged, 1, 4, vec![1]);
        assert!(matches!(
            staged.append_direct(Arc::new(Probe::default())),
            Err(PoolError::ModeMismatch)
        ));
        assert_eq!(staged.queued(), 0);

        let (direct, _) = pool(DispatchMode::Direct, 1, 4, vec![1]);
        assert!(matches!(
            direct.append(Arc::new(Probe::default()), Phase::Read),
            Err(PoolError::ModeMismatch)
        ));
    }

    #[test]
    fn test_queue_full_rejects_without_blocking() {
        let (mut pool, _) = pool(DispatchMode::Direct, 1, 1, vec![1]);
        let started = Arc::new(Semaphore::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let blocker = Arc::new(Probe {
            started: Some(Arc::clone(&started)),
            gate: Some(Arc::clone(&gate)),
            ..Probe::default()
        });
        pool.append_direct(Arc::clone(&blocker)).unwrap();
        assert!(started.wait_timeout(Duration::from_secs(5)));
        assert_eq!(pool.active_workers(), 1);

        let queued = Arc::new(Probe::default());
        let rejected = Arc::new(Probe::default());
        pool.append_direct(Arc::clone(&queued)).unwrap();
        assert!(matches!(pool.append_direct(Arc::clone(&rejected)), Err(PoolError::QueueFull)));
        assert_eq!(pool.queued(), 1);

        gate.post();
        pool.join();

        assert!(blocker.flags.is_completed());
        assert!(queued.flags.is_completed());
        assert!(!rejected.flags.is_completed());
        assert_eq!(rejected.processed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_direct_waits_for_busy_connection() {
        let (mut pool, conns) = pool(DispatchMode::Direct, 2, 4, vec![9]);
        let started = Arc::new(Semaphore::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let first = Arc::new(Probe {
            started: Some(Arc::clone(&started)),
            gate: Some(Arc::clone(&gate)),
            ..Probe::default()
        });
        let second = Arc::new(Probe::default());

        pool.append_direct(Arc::clone(&first)).unwrap();
        assert!(started.wait_timeout(Duration::from_secs(5)));
        pool.append_direct(Arc::clone(&second)).unwrap();

        // The second worker is parked on the only connection
        thread::sleep(Duration::from_millis(50));
        assert!(!second.flags.is_completed());
        assert_eq!(pool.active_workers(), 2);

        gate.post();
        pool.join();

        for t in [&first, &second] {
            assert!(t.flags.is_completed() && !t.flags.has_failed());
            assert_eq!(t.processed.load(Ordering::SeqCst), 1);
            assert_eq!(*t.last_conn.lock().unwrap(), Some(9));
        }
        assert_eq!(conns.available(), 1);
    }

    #[test]
    fn test_empty_connection_pool_fails_task() {
        let (mut pool, _) = pool(DispatchMode::Direct, 1, 4, Vec::new());
        let task = Arc::new(Probe::default());
        pool.append_direct(Arc::clone(&task)).unwrap();
        pool.join();

        assert!(task.flags.has_failed());
        assert_eq!(task.processed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_is_contained() {
        let (mut pool, conns) = pool(DispatchMode::Direct, 1, 4, vec![3]);
        let boom = Arc::new(Probe { panics: true, ..Probe::default() });
        let after = Arc::new(Probe::default());

        pool.append_direct(Arc::clone(&boom)).unwrap();
        pool.append_direct(Arc::clone(&after)).unwrap();
        pool.join();

        assert!(boom.flags.has_failed());
        // Same single worker survived and the connection came back
        assert!(after.flags.is_completed() && !after.flags.has_failed());
        assert_eq!(*after.last_conn.lock().unwrap(), Some(3));
        assert_eq!(conns.available(), 1);
    }

    #[test]
    fn test_shutdown_drains_then_rejects() {
        let (mut pool, _) = pool(DispatchMode::Direct, 2, 64, vec![1, 2]);
        let tasks: Vec<_> = (0..32).map(|_| Arc::new(Probe::default())).collect();
        for t in &tasks {
            pool.append_direct(Arc::clone(t)).unwrap();
        }

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.append_direct(Arc::new(Probe::default())),
            Err(PoolError::ShutDown)
        ));

        pool.join();
        assert!(tasks.iter().all(|t| t.flags.is_completed()));
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_introspection() {
        let (pool, _) = pool(DispatchMode::Staged, 3, 50, vec![1]);
        assert_eq!(pool.thread_count(), 3);
        assert_eq!(pool.capacity(), 50);
        assert_eq!(pool.mode(), DispatchMode::Staged);
        assert_eq!(pool.queued(), 0);
    }
}
