use super::{EventSource, SourceInner};
use crate::reactor::Interest;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

/// One descriptor owned by an [`EventSource`].
///
/// An `EventSourceFd` binds a raw descriptor to the conditions it is
/// subscribed to and accumulates the conditions the poller reported
/// since they were last consumed. Handles are cheap to clone and compare
/// by identity.
///
/// The record holds only a non-owning back-reference to its source: it
/// is used for priority lookup and ownership checks, never to keep the
/// source alive.
#[derive(Clone)]
pub struct EventSourceFd {
    pub(crate) inner: Rc<FdInner>,
}

pub(crate) struct FdInner {
    /// The descriptor. Not owned: the variant that created it closes it.
    fd: RawFd,

    /// Conditions this descriptor is registered for.
    interest: Interest,

    /// Conditions reported by the poller and not consumed yet.
    ready: Cell<Interest>,

    /// `true` while the descriptor sits in a loop's pending queue.
    dispatched: Cell<bool>,

    /// Source this descriptor belongs to, empty once detached.
    owner: RefCell<Weak<SourceInner>>,

    /// Poller token while registered with a loop.
    token: Cell<Option<usize>>,
}

impl EventSourceFd {
    pub(crate) fn new(fd: RawFd, interest: Interest, owner: Weak<SourceInner>) -> Self {
        Self {
            inner: Rc::new(FdInner {
                fd,
                interest,
                ready: Cell::new(Interest::NONE),
                dispatched: Cell::new(false),
                owner: RefCell::new(owner),
                token: Cell::new(None),
            }),
        }
    }

    /// Returns the raw descriptor.
    pub fn raw_fd(&self) -> RawFd {
        self.inner.fd
    }

    /// Returns the conditions this descriptor is subscribed to.
    pub fn interest(&self) -> Interest {
        self.inner.interest
    }

    /// Returns the conditions reported since they were last cleared.
    pub fn ready(&self) -> Interest {
        self.inner.ready.get()
    }

    /// Clears `mask` from the ready conditions.
    ///
    /// Variants call this once they drained a condition, typically after
    /// the descriptor reported `WouldBlock`. A descriptor whose ready
    /// conditions no longer intersect its interest leaves the pending
    /// queue at the end of the current dispatch.
    pub fn clear_ready(&self, mask: Interest) {
        self.inner.ready.set(self.inner.ready.get().difference(mask));
    }

    /// Returns `true` while the descriptor is queued for dispatch.
    pub fn is_dispatched(&self) -> bool {
        self.inner.dispatched.get()
    }

    /// Returns the owning source, if it is still alive and this
    /// descriptor was not detached from it.
    pub fn source(&self) -> Option<EventSource> {
        self.inner
            .owner
            .borrow()
            .upgrade()
            .map(|inner| EventSource { inner })
    }

    pub(crate) fn mark_ready(&self, ready: Interest) {
        self.inner.ready.set(self.inner.ready.get() | ready);
    }

    /// Marks the descriptor as queued. Returns `false` if it already was.
    pub(crate) fn dispatch_begin(&self) -> bool {
        !self.inner.dispatched.replace(true)
    }

    /// Marks the descriptor as no longer queued.
    pub(crate) fn dispatch_finish(&self) {
        self.inner.dispatched.set(false);
    }

    /// Priority of the owning source; detached descriptors sort last.
    pub(crate) fn priority(&self) -> i32 {
        self.inner
            .owner
            .borrow()
            .upgrade()
            .map(|source| source.priority.get())
            .unwrap_or(i32::MAX)
    }

    pub(crate) fn token(&self) -> Option<usize> {
        self.inner.token.get()
    }

    pub(crate) fn set_token(&self, token: Option<usize>) {
        self.inner.token.set(token);
    }

    pub(crate) fn detach(&self) {
        *self.inner.owner.borrow_mut() = Weak::new();
    }

    pub(crate) fn downgrade(&self) -> Weak<FdInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<FdInner>) -> Self {
        Self { inner }
    }
}

impl PartialEq for EventSourceFd {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EventSourceFd {}

impl fmt::Debug for EventSourceFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourceFd")
            .field("fd", &self.inner.fd)
            .field("interest", &self.inner.interest)
            .field("ready", &self.inner.ready.get())
            .field("dispatched", &self.inner.dispatched.get())
            .finish()
    }
}
