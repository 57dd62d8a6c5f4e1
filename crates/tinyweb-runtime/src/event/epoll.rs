//! epoll registration

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};

use super::{Interest, TriggerMode};
use crate::error::EventResult;

/// Put `fd` into non-blocking mode, returning its previous status flags
pub fn set_nonblocking(fd: RawFd) -> EventResult<OFlag> {
    let old = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(old | OFlag::O_NONBLOCK))?;
    Ok(old)
}

/// Owned epoll instance
///
/// Each event carries the registered descriptor in its `data()` field.
#[derive(Debug)]
pub struct Poller {
    epoll: Epoll,
}

impl Poller {
    pub fn new() -> EventResult<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        Ok(Self { epoll })
    }

    /// Watch `fd` for input and peer hang-up
    ///
    /// The descriptor is switched to non-blocking mode first, whether or not
    /// epoll accepts it. With `one_shot` it reports once and stays silent
    /// until `rearm`.
    pub fn register(&self, fd: RawFd, one_shot: bool, mode: TriggerMode) -> EventResult<()> {
        let mut flags = EpollFlags::EPOLLIN | EpollFlags::EPOLLRDHUP | trigger_flags(mode);
        if one_shot {
            flags |= EpollFlags::EPOLLONESHOT;
        }
        set_nonblocking(fd)?;
        self.epoll.add(borrow(fd), EpollEvent::new(flags, fd as u64))?;
        Ok(())
    }

    /// Re-enable a one-shot descriptor for the given readiness
    pub fn rearm(&self, fd: RawFd, interest: Interest, mode: TriggerMode) -> EventResult<()> {
        let readiness = match interest {
            Interest::Read => EpollFlags::EPOLLIN,
            Interest::Write => EpollFlags::EPOLLOUT,
        };
        let flags = readiness | EpollFlags::EPOLLONESHOT | EpollFlags::EPOLLRDHUP | trigger_flags(mode);
        let mut event = EpollEvent::new(flags, fd as u64);
        self.epoll.modify(borrow(fd), &mut event)?;
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> EventResult<()> {
        self.epoll.delete(borrow(fd))?;
        Ok(())
    }

    /// Wait for readiness, `None` blocks indefinitely
    ///
    /// A wait interrupted by a signal reports zero events; the signal itself
    /// shows up on the `SignalPipe` at the next call.
    pub fn wait(&self, events: &mut [EpollEvent], timeout: Option<Duration>) -> EventResult<usize> {
        let timeout_ms = match timeout {
            Some(d) => d.as_millis().min(i32::MAX as u128) as libc::c_int,
            None => -1,
        };
        let max = events.len().min(libc::c_int::MAX as usize) as libc::c_int;

        // SAFETY: EpollEvent is a transparent wrapper over epoll_event and
        // the kernel writes at most `max` entries.
        let n = unsafe {
            libc::epoll_wait(
                self.epoll.0.as_raw_fd(),
                events.as_mut_ptr().cast::<libc::epoll_event>(),
                max,
                timeout_ms,
            )
        };

        match Errno::result(n) {
            Ok(n) => Ok(n as usize),
            Err(Errno::EINTR) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl AsRawFd for Poller {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll.0.as_raw_fd()
    }
}

fn trigger_flags(mode: TriggerMode) -> EpollFlags {
    match mode {
        TriggerMode::Level => EpollFlags::empty(),
        TriggerMode::Edge => EpollFlags::EPOLLET,
    }
}

#[inline]
fn borrow<'a>(fd: RawFd) -> BorrowedFd<'a> {
    // SAFETY: callers pass descriptors they keep open for the duration of
    // the epoll_ctl call.
    unsafe { BorrowedFd::borrow_raw(fd) }
}
