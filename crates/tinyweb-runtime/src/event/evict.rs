//! Closing idle or failed connections

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nix::errno::Errno;
use nix::unistd::close;
use tinyweb_core::{linfo, Logger};

use super::Poller;
use crate::error::EventResult;

/// Stop watching `fd`, close it and drop the connection count
///
/// The descriptor is closed and counted out even when deregistration
/// fails; that error is returned afterwards.
pub fn evict_connection(poller: &Poller, fd: RawFd, users: &AtomicUsize) -> EventResult<()> {
    let deregistered = poller.deregister(fd);
    let closed = close(fd);
    let _ = users.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    deregistered?;
    closed?;
    Ok(())
}

/// Expiry callback for a connection's idle timer
pub fn eviction(
    poller: Arc<Poller>,
    fd: RawFd,
    users: Arc<AtomicUsize>,
    logger: Arc<Logger>,
) -> impl FnOnce() + Send + 'static {
    move || {
        let _ = evict_connection(&poller, fd, &users);
        linfo!(logger, "close fd {}", fd);
    }
}

/// Send a short notice to a client we refuse, then close it
pub fn show_error(fd: RawFd, message: &str) -> EventResult<()> {
    // SAFETY: the buffer outlives the call and `len` matches it.
    let sent = unsafe {
        libc::send(
            fd,
            message.as_ptr().cast::<libc::c_void>(),
            message.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    let sent = Errno::result(sent);
    close(fd)?;
    sent?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TriggerMode;
    use std::io::Read;
    use std::os::fd::IntoRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};
    use tinyweb_core::TimerList;

    fn read_to_eof(mut stream: UnixStream) -> Vec<u8> {
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_evict_connection_closes_and_counts() {
        let poller = Poller::new().unwrap();
        let (ours, peer) = UnixStream::pair().unwrap();
        let fd = ours.into_raw_fd();
        poller.register(fd, true, TriggerMode::Level).unwrap();

        let users = AtomicUsize::new(1);
        evict_connection(&poller, fd, &users).unwrap();

        assert_eq!(users.load(Ordering::SeqCst), 0);
        assert!(read_to_eof(peer).is_empty());
    }

    #[test]
    fn test_eviction_from_timer() {
        let poller = Arc::new(Poller::new().unwrap());
        let (ours, peer) = UnixStream::pair().unwrap();
        let fd = ours.into_raw_fd();
        poller.register(fd, true, TriggerMode::Level).unwrap();

        let users = Arc::new(AtomicUsize::new(3));
        let mut timers = TimerList::new();
        let now = Instant::now();
        timers.add(
            now,
            eviction(Arc::clone(&poller), fd, Arc::clone(&users), Arc::new(Logger::disabled())),
        );

        assert_eq!(timers.tick(now), 1);
        assert_eq!(users.load(Ordering::SeqCst), 2);
        assert!(read_to_eof(peer).is_empty());
    }

    #[test]
    fn test_show_error_sends_then_closes() {
        let (ours, peer) = UnixStream::pair().unwrap();
        show_error(ours.into_raw_fd(), "Internal server busy").unwrap();
        assert_eq!(read_to_eof(peer), b"Internal server busy");
    }
}
