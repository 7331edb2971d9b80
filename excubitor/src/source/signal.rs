use super::{EventSource, EventSourceFd, SourceFuncs};
use crate::reactor::Interest;
use crate::reactor::platform::{sys_read_signal, sys_signalfd};

use libc::c_int;
use std::cell::Cell;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

use tracing::{debug, trace, warn};

/// A source delivering OS signals through a `signalfd`.
///
/// Creating the source blocks the signals for the calling thread, so
/// they are queued on the descriptor instead of running a handler. The
/// loop has to run on that same thread, and other threads should block
/// the signals too, otherwise the kernel may deliver a process-directed
/// signal to a thread that did not block it.
///
/// One queued signal is consumed per dispatch; the callback can read it
/// back through [`last_signal`](Self::last_signal).
pub struct SignalSource {
    fd: OwnedFd,
    last: Cell<Option<c_int>>,
}

impl SignalSource {
    /// Creates a source receiving `signals`.
    pub fn new(signals: &[c_int]) -> io::Result<EventSource> {
        let fd = sys_signalfd(signals)?;
        let raw = fd.as_raw_fd();

        let source = EventSource::new(SignalSource {
            fd,
            last: Cell::new(None),
        });
        source.add_fd(raw, Interest::READABLE);

        debug!(?signals, fd = raw, "signal source created");

        Ok(source)
    }

    /// Number of the signal consumed by the latest dispatch.
    pub fn last_signal(&self) -> Option<c_int> {
        self.last.get()
    }

    /// Convenience for callbacks: the latest signal of the source owning `fd`.
    pub fn signal_of(fd: &EventSourceFd) -> Option<c_int> {
        fd.source()
            .and_then(|source| source.funcs::<SignalSource>().and_then(Self::last_signal))
    }
}

impl SourceFuncs for SignalSource {
    fn check(&self, _source: &EventSource, fd: &EventSourceFd) -> bool {
        fd.ready().is_readable()
    }

    fn dispatch(
        &self,
        _source: &EventSource,
        fd: &EventSourceFd,
        callback: &mut dyn FnMut(&EventSourceFd) -> bool,
    ) -> bool {
        match sys_read_signal(self.fd.as_raw_fd()) {
            Ok(signo) => {
                trace!(signo, "signal received");
                self.last.set(Some(signo));
                callback(fd)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                fd.clear_ready(Interest::READABLE);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to read signalfd");
                fd.clear_ready(Interest::READABLE);
                true
            }
        }
    }
}
