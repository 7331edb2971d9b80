use super::{EventSource, EventSourceFd, SourceFuncs};
use crate::reactor::Interest;
use crate::reactor::platform::{
    sys_read_expirations, sys_timerfd, sys_timerfd_arm, sys_timerfd_disarm,
};

use std::cell::Cell;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Duration;

use tracing::{trace, warn};

/// A timer backed by a `timerfd`.
///
/// The timer is armed by `prepare` when the source is registered with a
/// loop and disarmed when it leaves: `after` counts from each
/// registration, not from construction. With an `interval` it keeps
/// firing until the source is removed.
pub struct TimerSource {
    fd: OwnedFd,
    after: Duration,
    interval: Option<Duration>,
    armed: Cell<bool>,
    expirations: Cell<u64>,
}

impl TimerSource {
    /// Creates a timer firing once after `after`, then every `interval`.
    pub fn new(after: Duration, interval: Option<Duration>) -> io::Result<EventSource> {
        let fd = sys_timerfd()?;
        let raw = fd.as_raw_fd();

        let source = EventSource::new(TimerSource {
            fd,
            after,
            interval,
            armed: Cell::new(false),
            expirations: Cell::new(0),
        });
        source.add_fd(raw, Interest::READABLE);

        Ok(source)
    }

    /// Total expirations observed by dispatches so far.
    pub fn expirations(&self) -> u64 {
        self.expirations.get()
    }
}

impl SourceFuncs for TimerSource {
    fn prepare(&self, _source: &EventSource) {
        if self.armed.get() {
            return;
        }

        match sys_timerfd_arm(self.fd.as_raw_fd(), self.after, self.interval) {
            Ok(()) => self.armed.set(true),
            Err(e) => warn!(error = %e, "failed to arm timer"),
        }
    }

    fn check(&self, _source: &EventSource, fd: &EventSourceFd) -> bool {
        fd.ready().is_readable()
    }

    fn detach(&self, source: &EventSource) {
        if !self.armed.replace(false) {
            return;
        }

        if let Err(e) = sys_timerfd_disarm(self.fd.as_raw_fd()) {
            warn!(error = %e, "failed to disarm timer");
        }
        for fd in source.fds() {
            fd.clear_ready(Interest::READABLE);
        }
    }

    fn dispatch(
        &self,
        _source: &EventSource,
        fd: &EventSourceFd,
        callback: &mut dyn FnMut(&EventSourceFd) -> bool,
    ) -> bool {
        match sys_read_expirations(self.fd.as_raw_fd()) {
            Ok(count) => {
                trace!(count, "timer expired");
                self.expirations.set(self.expirations.get() + count);
                fd.clear_ready(Interest::READABLE);
                callback(fd)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    warn!(error = %e, "failed to read timerfd");
                }
                fd.clear_ready(Interest::READABLE);
                true
            }
        }
    }
}
