use super::{EventSource, EventSourceFd, SourceFuncs};
use crate::reactor::Interest;

use std::os::fd::RawFd;

/// A source over descriptors owned by the caller.
///
/// The callback receives the ready descriptor and is expected to
/// consume it until it reports `WouldBlock`, then clear the drained
/// condition with [`EventSourceFd::clear_ready`]. While a condition the
/// descriptor is interested in stays set, it keeps being dispatched
/// on every tick.
///
/// The source never closes its descriptors.
///
/// # Examples
///
/// ```rust,ignore
/// let source = IoSource::new(listener.as_raw_fd(), Interest::READABLE);
/// source.set_callback(move |fd| accept_all(fd), None);
/// event_loop.add_source(&source);
/// ```
pub struct IoSource;

impl IoSource {
    /// Creates a source watching `fd` for `interest`.
    pub fn new(fd: RawFd, interest: Interest) -> EventSource {
        let source = Self::empty();
        source.add_fd(fd, interest);
        source
    }

    /// Creates a source without descriptors; add them with
    /// [`EventSource::add_fd`].
    pub fn empty() -> EventSource {
        EventSource::new(IoSource)
    }
}

impl SourceFuncs for IoSource {
    fn check(&self, _source: &EventSource, fd: &EventSourceFd) -> bool {
        fd.ready()
            .intersects(fd.interest() | Interest::ERROR | Interest::HANGUP)
    }

    fn dispatch(
        &self,
        _source: &EventSource,
        fd: &EventSourceFd,
        callback: &mut dyn FnMut(&EventSourceFd) -> bool,
    ) -> bool {
        callback(fd)
    }
}
