//! Signal disposition and the self-pipe
//!
//! Handlers do nothing but write the signal number into a non-blocking
//! pipe; the event loop reads it back with the rest of its readiness.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::fcntl::OFlag;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::pipe2;

use crate::error::{EventError, EventResult};

/// Write end published to `forward_signal`, -1 when no pipe is live
static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// Install `handler` for `signal`
///
/// Every signal is blocked while the handler runs. With `restart`,
/// interrupted system calls are resumed (`SA_RESTART`).
///
/// # Safety
///
/// `handler` must only perform async-signal-safe operations.
pub unsafe fn install_handler(signal: Signal, handler: SigHandler, restart: bool) -> EventResult<()> {
    let flags = if restart { SaFlags::SA_RESTART } else { SaFlags::empty() };
    let action = SigAction::new(handler, flags, SigSet::all());
    sigaction(signal, &action)?;
    Ok(())
}

/// Discard `signal` (used for `SIGPIPE` on half-closed sockets)
pub fn ignore(signal: Signal) -> EventResult<()> {
    // SAFETY: SIG_IGN runs no code.
    unsafe { install_handler(signal, SigHandler::SigIgn, true) }
}

extern "C" fn forward_signal(sig: libc::c_int) {
    // SAFETY: errno access and write(2) are async-signal-safe.
    unsafe {
        let errno = libc::__errno_location();
        let saved = *errno;
        let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
        if fd >= 0 {
            let byte = sig as u8;
            libc::write(fd, (&byte as *const u8).cast::<libc::c_void>(), 1);
        }
        *errno = saved;
    }
}

/// Self-pipe carrying signal numbers from handlers to the event loop
///
/// Only one may exist at a time since the handler finds the write end
/// through a process-wide slot.
#[derive(Debug)]
pub struct SignalPipe {
    read: File,
    write: OwnedFd,
}

impl SignalPipe {
    pub fn new() -> EventResult<Self> {
        let (read, write) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;
        PIPE_WRITE_FD
            .compare_exchange(-1, write.as_raw_fd(), Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EventError::PipeInUse)?;
        Ok(Self {
            read: File::from(read),
            write,
        })
    }

    /// Descriptor to register with the poller
    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    /// Route `signal` into this pipe
    pub fn forward(&self, signal: Signal, restart: bool) -> EventResult<()> {
        // SAFETY: forward_signal only touches errno and write(2).
        unsafe { install_handler(signal, SigHandler::Handler(forward_signal), restart) }
    }

    /// Read every pending signal in arrival order
    ///
    /// Unknown numbers are skipped.
    pub fn drain(&mut self) -> EventResult<Vec<Signal>> {
        let mut signals = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match self.read.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => signals.extend(
                    buf[..n].iter().filter_map(|&b| Signal::try_from(libc::c_int::from(b)).ok()),
                ),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(signals)
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        // Unpublish before the descriptors close
        let _ = PIPE_WRITE_FD.compare_exchange(
            self.write.as_raw_fd(),
            -1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;

    #[test]
    fn test_signal_pipe_forwards_and_is_exclusive() {
        let mut pipe = SignalPipe::new().unwrap();
        assert!(matches!(SignalPipe::new(), Err(EventError::PipeInUse)));

        assert!(pipe.drain().unwrap().is_empty());

        pipe.forward(Signal::SIGUSR1, true).unwrap();
        pipe.forward(Signal::SIGUSR2, false).unwrap();
        raise(Signal::SIGUSR1).unwrap();
        raise(Signal::SIGUSR2).unwrap();
        raise(Signal::SIGUSR1).unwrap();

        assert_eq!(
            pipe.drain().unwrap(),
            vec![Signal::SIGUSR1, Signal::SIGUSR2, Signal::SIGUSR1]
        );

        drop(pipe);
        let again = SignalPipe::new().unwrap();
        assert!(again.read_fd() >= 0);
    }

    #[test]
    fn test_ignore_sigpipe() {
        ignore(Signal::SIGPIPE).unwrap();
        // A second time is harmless
        ignore(Signal::SIGPIPE).unwrap();
    }
}
