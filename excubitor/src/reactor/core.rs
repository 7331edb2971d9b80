use super::pending::PendingQueue;
use super::poller::{Event, Poller};
use crate::source::fd::FdInner;
use crate::source::{EventSource, EventSourceFd};
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::io;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, trace, warn};

/// Shared state of an event loop.
///
/// Every collection is mutated only from the thread running the loop,
/// including mutations made by callbacks. No borrow is held while a
/// variant or user callback runs, so callbacks may re-enter any
/// operation on the loop.
pub(crate) struct LoopInner {
    /// The epoll instance, owned exclusively by this loop.
    poller: RefCell<Poller>,

    /// Buffer used to collect events from the poller.
    events: RefCell<Vec<Event>>,

    /// Registered sources, each held by a strong handle.
    sources: RefCell<Vec<EventSource>>,

    /// Descriptors awaiting dispatch.
    pending: RefCell<PendingQueue>,

    /// Poller tokens to the descriptors registered under them.
    tokens: RefCell<Slab<Weak<FdInner>>>,

    /// Cleared by `quit`, observed at the top of each tick.
    pub(crate) running: Cell<bool>,
}

impl LoopInner {
    pub(crate) fn new(poller: Poller, event_capacity: usize) -> Self {
        Self {
            poller: RefCell::new(poller),
            events: RefCell::new(Vec::with_capacity(event_capacity)),
            sources: RefCell::new(Vec::new()),
            pending: RefCell::new(PendingQueue::default()),
            tokens: RefCell::new(Slab::new(64)),
            running: Cell::new(true),
        }
    }

    /// Binds `source` to this loop.
    ///
    /// Takes a strong handle, registers every descriptor with the poller,
    /// then prepares the source. Returns `false` if the source is already
    /// registered with this or another loop.
    pub(crate) fn add_source(self: &Rc<Self>, source: &EventSource) -> bool {
        if source.is_attached() {
            return false;
        }

        source.set_loop(Rc::downgrade(self));
        self.sources.borrow_mut().push(source.clone());

        for fd in source.fds() {
            self.register_fd(&fd);
        }

        debug!(
            priority = source.priority(),
            sources = self.sources.borrow().len(),
            "event source added"
        );

        source.prepare();

        true
    }

    /// Unbinds `source` from this loop.
    ///
    /// Deregisters its descriptors, drops them from the pending queue and
    /// releases the loop's handle. Safe to call from the source's own
    /// callback. Returns `false` if the source is not registered here.
    pub(crate) fn del_source(&self, source: &EventSource) -> bool {
        if !source.is_attached_to(self) {
            return false;
        }

        source.set_loop(Weak::new());

        let handle = {
            let mut sources = self.sources.borrow_mut();
            sources
                .iter()
                .position(|s| s == source)
                .map(|index| sources.swap_remove(index))
        };

        for fd in source.fds() {
            self.deregister_fd(&fd);
            self.purge(&fd);
        }
        source.on_detach();

        debug!(
            priority = source.priority(),
            sources = self.sources.borrow().len(),
            "event source removed"
        );

        // Releasing the handle may destroy the source and run user code.
        drop(handle);

        true
    }

    /// Registers one descriptor with the poller.
    ///
    /// Failure is logged and reported only through the return value.
    pub(crate) fn register_fd(&self, fd: &EventSourceFd) -> bool {
        let token = self.tokens.borrow_mut().insert(fd.downgrade());

        match self
            .poller
            .borrow()
            .register(fd.raw_fd(), token, fd.interest())
        {
            Ok(()) => {
                fd.set_token(Some(token));
                trace!(fd = fd.raw_fd(), token, interest = ?fd.interest(), "fd registered");
                true
            }
            Err(e) => {
                self.tokens.borrow_mut().remove(token);
                warn!(fd = fd.raw_fd(), error = %e, "failed to register fd");
                false
            }
        }
    }

    /// Removes one descriptor from the poller.
    pub(crate) fn deregister_fd(&self, fd: &EventSourceFd) -> bool {
        let Some(token) = fd.token() else {
            return false;
        };

        fd.set_token(None);
        self.tokens.borrow_mut().remove(token);

        match self.poller.borrow().deregister(fd.raw_fd()) {
            Ok(()) => true,
            Err(e) => {
                warn!(fd = fd.raw_fd(), error = %e, "failed to deregister fd");
                false
            }
        }
    }

    /// Drops `fd` from the pending queue and marks it not dispatched.
    pub(crate) fn purge(&self, fd: &EventSourceFd) {
        self.pending.borrow_mut().remove(fd);
        fd.dispatch_finish();
    }

    /// Waits for readiness and queues newly ready descriptors.
    ///
    /// Readiness bits accumulate on the descriptor. A descriptor already
    /// queued is never inserted twice.
    pub(crate) fn poll(&self, timeout: Option<Duration>) -> io::Result<()> {
        let mut events = std::mem::take(&mut *self.events.borrow_mut());

        let result = self.poller.borrow_mut().wait(&mut events, timeout);

        if result.is_ok() {
            let tokens = self.tokens.borrow();
            let mut pending = self.pending.borrow_mut();

            for event in events.iter() {
                let Some(fd) = tokens.get(event.token).and_then(Weak::upgrade) else {
                    continue;
                };
                let fd = EventSourceFd::from_inner(fd);

                fd.mark_ready(event.ready);
                if fd.dispatch_begin() {
                    pending.insert(fd);
                }
            }

            trace!(
                events = events.len(),
                pending = pending.len(),
                "poll returned"
            );
        }

        *self.events.borrow_mut() = events;

        result
    }

    /// Dispatches the most urgent pending descriptor.
    ///
    /// Returns `false` if nothing was pending.
    pub(crate) fn dispatch_next(&self) -> bool {
        let Some(fd) = self.pending.borrow().front() else {
            return false;
        };

        let mut checked = false;
        let mut invalid = None;

        if let Some(source) = fd.source().filter(|s| s.is_attached_to(self)) {
            if source.check(&fd) {
                checked = true;

                let keep = source.dispatch(&fd);

                // The callback may have detached the descriptor, or
                // unregistered or released the source.
                if fd.source().is_some() {
                    if keep {
                        if source.is_attached_to(self) {
                            source.prepare();
                        }
                    } else {
                        fd.clear_ready(fd.ready());
                        invalid = Some(source);
                    }
                }
            }
        }

        let attached = fd.source().is_some_and(|s| s.is_attached_to(self));
        if !checked || !attached || !fd.interest().intersects(fd.ready()) {
            self.purge(&fd);
        }

        if let Some(source) = invalid {
            trace!(fd = fd.raw_fd(), "source invalidated by dispatch");
            self.del_source(&source);
        }

        true
    }

    /// Timeout for the next poll: non-blocking while a backlog remains.
    pub(crate) fn next_timeout(&self) -> Option<Duration> {
        if self.pending.borrow().is_empty() {
            None
        } else {
            Some(Duration::ZERO)
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    pub(crate) fn registered_fds(&self) -> Vec<RawFd> {
        let mut fds: Vec<RawFd> = self
            .tokens
            .borrow()
            .iter()
            .filter_map(|(_, fd)| fd.upgrade())
            .map(|fd| EventSourceFd::from_inner(fd).raw_fd())
            .collect();

        fds.sort_unstable();
        fds
    }
}

impl Drop for LoopInner {
    /// Force-releases every registered source.
    ///
    /// The poller is closed afterwards by its own destructor, so the
    /// descriptors are not deregistered one by one.
    fn drop(&mut self) {
        for fd in self.pending.get_mut().drain() {
            fd.dispatch_finish();
        }

        let sources = std::mem::take(self.sources.get_mut());
        for source in &sources {
            source.set_loop(Weak::new());
            for fd in source.fds() {
                fd.set_token(None);
            }
            source.on_detach();
        }

        debug!(released = sources.len(), "event loop destroyed");
    }
}
