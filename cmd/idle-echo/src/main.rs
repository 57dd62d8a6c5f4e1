//! Idle-evicting echo server
//!
//! Single reactor thread on epoll, echo work on the tinyweb worker pool,
//! silent clients closed after three timeslots by the SIGALRM sweep.
//!
//! Usage:
//!     cargo build --release -p idle-echo
//!     ./target/release/idle-echo [port]
//!
//! Knobs come from the environment (`TW_THREADS`, `TW_DISPATCH=staged`,
//! `TW_CONN_TRIGGER=edge`, `TW_TIMESLOT_SECS=1`, `TW_LOG_MODE=async`, ...).
//!
//! Test with:
//!     echo "hello" | nc localhost 9006
//!     nc localhost 9006            # stay silent, gets closed after 3 timeslots
//!     kill -TERM <pid>             # clean shutdown

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::mem::ManuallyDrop;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::sync::{Arc, Mutex};

use tinyweb::{
    event, lerror, linfo, lwarn, Control, Core, DispatchMode, EpollEvent, EpollFlags, FixedPool,
    Interest, Logger, Phase, PoolError, Poller, ServerConfig, Task, TaskFlags, TimerHandle,
    TriggerMode,
};

const DEFAULT_PORT: u16 = 9006;
const MAX_FD: usize = 65536;
const MAX_EVENTS: usize = 10000;
const SESSIONS: u32 = 8;

// ── Pooled resource ──

/// Stand-in for a database handle: counts the requests it served
struct Session {
    id: u32,
    served: u64,
}

// ── Per-connection task ──

struct EchoTask {
    fd: RawFd,
    /// Closed by eviction, never by drop
    stream: ManuallyDrop<TcpStream>,
    inbox: Mutex<Vec<u8>>,
    outbox: Mutex<Vec<u8>>,
    poller: Arc<Poller>,
    trigger: TriggerMode,
    flags: TaskFlags,
    logger: Arc<Logger>,
}

impl EchoTask {
    fn new(fd: RawFd, poller: Arc<Poller>, trigger: TriggerMode, logger: Arc<Logger>) -> Self {
        Self {
            fd,
            // SAFETY: `fd` is an accepted socket; ManuallyDrop keeps this
            // handle from closing it.
            stream: ManuallyDrop::new(unsafe { TcpStream::from_raw_fd(fd) }),
            inbox: Mutex::new(Vec::new()),
            outbox: Mutex::new(Vec::new()),
            poller,
            trigger,
            flags: TaskFlags::new(),
            logger,
        }
    }

    /// Record a failed I/O phase and hand the socket back to the reactor
    ///
    /// Under EPOLLONESHOT nothing else would report it again; a write
    /// interest fires at once and the reactor closes on the failed flag.
    fn fail(&self) -> bool {
        self.flags.mark_failed();
        self.rearm(Interest::Write);
        false
    }

    fn fill_inbox(&self) -> bool {
        let mut inbox = self.inbox.lock().unwrap_or_else(|e| e.into_inner());
        let mut buf = [0u8; 4096];
        loop {
            match (&*self.stream).read(&mut buf) {
                Ok(0) => return false,
                Ok(n) => {
                    inbox.extend_from_slice(&buf[..n]);
                    if self.trigger == TriggerMode::Level {
                        return true;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return !inbox.is_empty(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return false,
            }
        }
    }

    fn flush_outbox(&self) -> bool {
        let mut outbox = self.outbox.lock().unwrap_or_else(|e| e.into_inner());
        while !outbox.is_empty() {
            match (&*self.stream).write(&outbox) {
                Ok(0) => return false,
                Ok(n) => {
                    outbox.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return self.rearm(Interest::Write);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return false,
            }
        }
        self.rearm(Interest::Read)
    }

    fn rearm(&self, interest: Interest) -> bool {
        match self.poller.rearm(self.fd, interest, self.trigger) {
            Ok(()) => true,
            Err(e) => {
                lerror!(self.logger, "rearm fd {}: {}", self.fd, e);
                false
            }
        }
    }
}

impl Task for EchoTask {
    type Connection = Session;

    fn process(&self, session: &mut Session) {
        let request = std::mem::take(&mut *self.inbox.lock().unwrap_or_else(|e| e.into_inner()));
        session.served += 1;
        self.outbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(&request);
        linfo!(
            self.logger,
            "fd {}: {} bytes via session {} (#{})",
            self.fd,
            request.len(),
            session.id,
            session.served
        );
        self.rearm(Interest::Write);
    }

    fn read_once(&self) -> bool {
        self.fill_inbox() || self.fail()
    }

    fn write(&self) -> bool {
        self.flush_outbox() || self.fail()
    }

    fn flags(&self) -> &TaskFlags {
        &self.flags
    }
}

// ── Reactor ──

struct Client {
    task: Arc<EchoTask>,
    timer: TimerHandle,
}

type EchoCore = Core<EchoTask, FixedPool<Session>>;

fn accept(core: &EchoCore, listener: &TcpListener, clients: &mut HashMap<RawFd, Client>) {
    loop {
        let stream = match listener.accept() {
            Ok((stream, peer)) => {
                linfo!(core.logger(), "accept {}", peer);
                stream
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                lerror!(core.logger(), "accept: {}", e);
                return;
            }
        };
        let fd = stream.into_raw_fd();

        if core.users() >= MAX_FD {
            lwarn!(core.logger(), "too many clients, refusing fd {}", fd);
            let _ = event::show_error(fd, "Internal server busy");
        } else {
            match core.watch(fd) {
                Ok(timer) => {
                    let task = EchoTask::new(
                        fd,
                        Arc::clone(core.poller()),
                        core.config().conn_trigger,
                        Arc::clone(core.logger()),
                    );
                    clients.insert(fd, Client { task: Arc::new(task), timer });
                }
                Err(e) => {
                    lerror!(core.logger(), "watch fd {}: {}", fd, e);
                    // SAFETY: `fd` came from into_raw_fd above and is unowned.
                    drop(unsafe { TcpStream::from_raw_fd(fd) });
                }
            }
        }

        if core.config().listen_trigger == TriggerMode::Level {
            return;
        }
    }
}

fn close(core: &EchoCore, clients: &mut HashMap<RawFd, Client>, fd: RawFd) {
    if let Some(client) = clients.remove(&fd) {
        if let Err(e) = core.close(client.timer, fd) {
            lwarn!(core.logger(), "close fd {}: {}", fd, e);
        }
    }
}

fn on_readable(core: &EchoCore, clients: &mut HashMap<RawFd, Client>, fd: RawFd) {
    let Some(client) = clients.get(&fd) else { return };
    let task = Arc::clone(&client.task);
    let _ = core.touch(client.timer);
    task.flags().reset();

    let queued = match core.pool().mode() {
        DispatchMode::Staged => core.pool().append(task, Phase::Read),
        DispatchMode::Direct => {
            if !task.read_once() {
                return close(core, clients, fd);
            }
            core.pool().append_direct(task)
        }
    };
    if let Err(e) = queued {
        reject(core, clients, fd, e);
    }
}

fn on_writable(core: &EchoCore, clients: &mut HashMap<RawFd, Client>, fd: RawFd) {
    let Some(client) = clients.get(&fd) else { return };
    let task = Arc::clone(&client.task);
    let _ = core.touch(client.timer);

    match core.pool().mode() {
        DispatchMode::Staged => {
            task.flags().reset();
            if let Err(e) = core.pool().append(task, Phase::Write) {
                reject(core, clients, fd, e);
            }
        }
        DispatchMode::Direct => {
            if !task.write() {
                close(core, clients, fd);
            }
        }
    }
}

fn reject(core: &EchoCore, clients: &mut HashMap<RawFd, Client>, fd: RawFd, e: PoolError) {
    lwarn!(core.logger(), "fd {} not queued: {}", fd, e);
    close(core, clients, fd);
}

fn run(core: &mut EchoCore, listener: &TcpListener) -> io::Result<()> {
    let listen_fd = listener.as_raw_fd();
    core.poller()
        .register(listen_fd, false, core.config().listen_trigger)
        .map_err(io::Error::other)?;

    let mut clients: HashMap<RawFd, Client> = HashMap::new();
    let mut events = vec![EpollEvent::empty(); MAX_EVENTS];

    loop {
        let n = core.poller().wait(&mut events, None).map_err(io::Error::other)?;

        for ev in &events[..n] {
            let fd = ev.data() as RawFd;
            let flags = ev.events();

            if fd == listen_fd {
                accept(core, listener, &mut clients);
            } else if fd == core.signal_fd() {
                if core.handle_signals().map_err(io::Error::other)? == Control::Stop {
                    return Ok(());
                }
                // Forget clients the sweep already closed
                let sweep = core.sweep().lock();
                clients.retain(|_, c| sweep.contains(c.timer));
            } else if flags.intersects(EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR)
                || clients.get(&fd).is_some_and(|c| c.task.flags().has_failed())
            {
                close(core, &mut clients, fd);
            } else if flags.contains(EpollFlags::EPOLLIN) {
                on_readable(core, &mut clients, fd);
            } else if flags.contains(EpollFlags::EPOLLOUT) {
                on_writable(core, &mut clients, fd);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let config = ServerConfig::from_env();
    let sessions = (0..SESSIONS).map(|id| Session { id, served: 0 }).collect();
    let mut core: EchoCore = Core::start(config, Arc::new(FixedPool::new(sessions)))?;

    let listener = TcpListener::bind(("0.0.0.0", port))?;
    linfo!(core.logger(), "listening on port {}", port);
    eprintln!("idle-echo listening on port {} (pid {})", port, std::process::id());

    run(&mut core, &listener)?;

    linfo!(core.logger(), "shutting down with {} clients", core.users());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SHORT: Option<Duration> = Some(Duration::from_millis(100));

    #[test]
    fn test_failed_read_wakes_reactor() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let fd = listener.accept().unwrap().0.into_raw_fd();

        let poller = Arc::new(Poller::new().unwrap());
        poller.register(fd, true, TriggerMode::Level).unwrap();
        let task = EchoTask::new(
            fd,
            Arc::clone(&poller),
            TriggerMode::Level,
            Arc::new(Logger::disabled()),
        );

        drop(client);
        let mut events = vec![EpollEvent::empty(); 4];
        assert_eq!(poller.wait(&mut events, SHORT).unwrap(), 1);
        // One-shot: silent until someone re-arms
        assert_eq!(poller.wait(&mut events, SHORT).unwrap(), 0);

        assert!(!task.read_once());
        assert!(task.flags().has_failed());
        assert_eq!(poller.wait(&mut events, SHORT).unwrap(), 1);
        assert_eq!(events[0].data(), fd as u64);

        // SAFETY: the task never owned the descriptor
        drop(unsafe { TcpStream::from_raw_fd(fd) });
    }
}
