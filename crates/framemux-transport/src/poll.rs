use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Result, TransportError};

/// Wait until any of `fds` is readable, or `timeout` elapses.
///
/// Returns one flag per descriptor, in input order. Hang-up and error
/// conditions count as readable so the caller's next read surfaces them.
/// An empty set simply sleeps for `timeout`. A wait interrupted by a signal
/// returns with no descriptors ready, giving the caller a chance to observe
/// cancellation.
pub fn wait_readable(fds: &[BorrowedFd<'_>], timeout: Duration) -> Result<Vec<bool>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|fd| libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    // SAFETY: `pollfds` is a valid, exclusively borrowed array of `pollfd` of the
    // given length, and each descriptor is kept open by its `BorrowedFd`.
    let rc = unsafe {
        libc::poll(
            pollfds.as_mut_ptr(),
            pollfds.len() as libc::nfds_t,
            timeout_millis(timeout),
        )
    };

    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(vec![false; fds.len()]);
        }
        return Err(TransportError::Poll(err));
    }

    Ok(pollfds
        .iter()
        .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .collect())
}

/// Wait until `fd` accepts writes, for at most `timeout`.
///
/// Returns `Ok(false)` on timeout. Error and hang-up conditions report
/// `true` so the retried write fails with the real cause.
pub fn wait_writable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut pollfd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLOUT,
            revents: 0,
        };

        // SAFETY: `pollfd` is a valid single-element array and `fd` stays open for
        // the duration of the call.
        let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_millis(remaining)) };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted && !remaining.is_zero() {
                continue;
            }
            return Err(TransportError::Poll(err));
        }
        if rc == 0 {
            return Ok(false);
        }
        return Ok(pollfd.revents & (libc::POLLOUT | libc::POLLERR | libc::POLLHUP) != 0);
    }
}

/// Restores a descriptor's original status flags when dropped.
///
/// Status flags belong to the open file description, which every duplicate
/// of the descriptor shares. The guard keeps its own duplicate so the reset
/// reaches the terminal or pipe behind it even after the caller's handle is
/// gone.
#[derive(Debug)]
#[must_use = "dropping the guard restores blocking mode immediately"]
pub struct NonblockingGuard {
    restore: Option<(OwnedFd, libc::c_int)>,
}

impl Drop for NonblockingGuard {
    fn drop(&mut self) {
        if let Some((fd, flags)) = self.restore.take() {
            if let Err(err) = set_status_flags(fd.as_raw_fd(), flags) {
                warn!(error = %err, "failed to restore descriptor flags");
            }
        }
    }
}

/// Put a descriptor into non-blocking mode until the returned guard drops.
///
/// A descriptor that is already non-blocking is left alone, and its guard
/// does nothing.
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<NonblockingGuard> {
    let flags = status_flags(fd.as_raw_fd())?;
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(NonblockingGuard { restore: None });
    }

    let dup = fd.try_clone_to_owned().map_err(TransportError::Io)?;
    set_status_flags(dup.as_raw_fd(), flags | libc::O_NONBLOCK)?;
    Ok(NonblockingGuard {
        restore: Some((dup, flags)),
    })
}

fn status_flags(raw: RawFd) -> Result<libc::c_int> {
    // SAFETY: `raw` is an open descriptor kept alive by the caller; F_GETFL
    // takes no pointer arguments.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    Ok(flags)
}

fn set_status_flags(raw: RawFd, flags: libc::c_int) -> Result<()> {
    // SAFETY: as above; F_SETFL takes an integer flag argument.
    let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags) };
    if rc < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Round up to whole milliseconds so a sub-millisecond remainder does not
/// turn into a zero-timeout busy loop.
fn timeout_millis(timeout: Duration) -> libc::c_int {
    let millis = timeout.as_micros().div_ceil(1000);
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}
