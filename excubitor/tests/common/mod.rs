#![allow(dead_code)]

use excubitor::{EventSource, EventSourceFd, Interest, SourceFuncs};

use std::cell::{Cell, RefCell};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::rc::Rc;

/// Creates a non-blocking pipe, returning `(reader, writer)`.
pub fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
    assert_eq!(rc, 0, "pipe2 failed");

    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

/// Writes one byte to `fd`.
pub fn poke(fd: &OwnedFd) {
    let n = unsafe { libc::write(fd.as_raw_fd(), b"x".as_ptr() as *const _, 1) };
    assert_eq!(n, 1, "write failed");
}

/// Reads everything available from a non-blocking `fd`.
pub fn drain(fd: i32) -> usize {
    let mut buf = [0u8; 256];
    let mut total = 0;

    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            return total;
        }
        total += n as usize;
    }
}

/// Shared, ordered record of what callbacks observed.
pub type Log = Rc<RefCell<Vec<&'static str>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// Callback that drains the descriptor, clears its readiness and
/// records `name`.
pub fn draining(log: &Log, name: &'static str) -> impl FnMut(&EventSourceFd) -> bool + 'static {
    let log = log.clone();

    move |fd| {
        drain(fd.raw_fd());
        fd.clear_ready(Interest::READABLE);
        log.borrow_mut().push(name);
        true
    }
}

/// Callback that records `name` and leaves the descriptor ready for
/// `ticks` dispatches before draining it.
pub fn sticky(log: &Log, name: &'static str, ticks: usize) -> impl FnMut(&EventSourceFd) -> bool + 'static {
    let log = log.clone();
    let mut seen = 0;

    move |fd| {
        seen += 1;
        log.borrow_mut().push(name);
        if seen >= ticks {
            drain(fd.raw_fd());
            fd.clear_ready(Interest::READABLE);
        }
        true
    }
}

/// Counters observed by a [`Recorder`].
#[derive(Clone, Default)]
pub struct Counters {
    pub prepares: Rc<Cell<usize>>,
    pub checks: Rc<Cell<usize>>,
    pub dispatches: Rc<Cell<usize>>,
    pub check_result: Rc<Cell<bool>>,
}

impl Counters {
    pub fn new() -> Self {
        let counters = Self::default();
        counters.check_result.set(true);
        counters
    }
}

/// A variant counting every call the loop makes into it.
pub struct Recorder {
    pub counters: Counters,
}

impl SourceFuncs for Recorder {
    fn prepare(&self, _source: &EventSource) {
        self.counters.prepares.set(self.counters.prepares.get() + 1);
    }

    fn check(&self, _source: &EventSource, _fd: &EventSourceFd) -> bool {
        self.counters.checks.set(self.counters.checks.get() + 1);
        self.counters.check_result.get()
    }

    fn dispatch(
        &self,
        _source: &EventSource,
        fd: &EventSourceFd,
        callback: &mut dyn FnMut(&EventSourceFd) -> bool,
    ) -> bool {
        self.counters
            .dispatches
            .set(self.counters.dispatches.get() + 1);
        callback(fd)
    }
}

/// Creates a counted source watching `fd` for readability.
pub fn counted(fd: &OwnedFd) -> (EventSource, Counters) {
    let counters = Counters::new();
    let source = EventSource::new(Recorder {
        counters: counters.clone(),
    });
    source.add_fd(fd.as_raw_fd(), Interest::READABLE);

    (source, counters)
}
