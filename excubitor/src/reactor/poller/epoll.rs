//! Linux `epoll`-based poller implementation.
//!
//! Every descriptor is registered edge-triggered (`EPOLLET`): the kernel
//! reports a descriptor again only when its readiness state transitions,
//! never merely because it stays ready. The reactor's pending-queue
//! deduplication relies on that.

use super::common::Interest;
use super::platform::sys_close;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLLPRI, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// A readiness report for one registered descriptor.
pub(crate) struct Event {
    /// Token the descriptor was registered with.
    pub(crate) token: usize,

    /// Conditions reported by the kernel.
    pub(crate) ready: Interest,
}

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - a reusable event buffer.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Upper bound on events returned by one wait.
    max_events: usize,
}

impl EpollPoller {
    /// Create a new `EpollPoller` returning at most `capacity` events per wait.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let max_events = capacity.clamp(1, i32::MAX as usize);

        Ok(Self {
            epoll,
            events: Vec::with_capacity(max_events),
            max_events,
        })
    }

    /// Register a file descriptor with the poller, edge-triggered.
    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: to_epoll(interest) | EPOLLET as u32,
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Poll for I/O readiness events.
    ///
    /// Blocks until at least one descriptor becomes ready or the timeout
    /// expires. `None` blocks indefinitely, `Some(Duration::ZERO)` returns
    /// immediately. An interrupted wait is reported as an empty batch.
    pub(crate) fn wait(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        events.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.max_events as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        // SAFETY: epoll_wait initialized the first `n` entries.
        unsafe {
            self.events.set_len(n as usize);
        }

        events.extend(self.events.iter().map(|ev| Event {
            token: ev.u64 as usize,
            ready: from_epoll(ev.events),
        }));

        Ok(())
    }
}

impl Drop for EpollPoller {
    /// Closes the epoll instance.
    fn drop(&mut self) {
        sys_close(self.epoll);
    }
}

fn to_epoll(interest: Interest) -> u32 {
    let mut flags = 0;

    if interest.contains(Interest::READABLE) {
        flags |= EPOLLIN;
    }
    if interest.contains(Interest::WRITABLE) {
        flags |= EPOLLOUT;
    }
    if interest.contains(Interest::PRIORITY) {
        flags |= EPOLLPRI;
    }
    if interest.contains(Interest::READ_HANGUP) {
        flags |= EPOLLRDHUP;
    }

    flags as u32
}

fn from_epoll(events: u32) -> Interest {
    let mut ready = Interest::NONE;

    if events & EPOLLIN as u32 != 0 {
        ready |= Interest::READABLE;
    }
    if events & EPOLLOUT as u32 != 0 {
        ready |= Interest::WRITABLE;
    }
    if events & EPOLLPRI as u32 != 0 {
        ready |= Interest::PRIORITY;
    }
    if events & EPOLLERR as u32 != 0 {
        ready |= Interest::ERROR;
    }
    if events & EPOLLHUP as u32 != 0 {
        ready |= Interest::HANGUP;
    }
    if events & EPOLLRDHUP as u32 != 0 {
        ready |= Interest::READ_HANGUP;
    }

    ready
}
