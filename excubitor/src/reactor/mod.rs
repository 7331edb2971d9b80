//! The event loop.
//!
//! An [`EventLoop`] owns an edge-triggered epoll instance, the set of
//! registered [`EventSource`]s and a priority-ordered queue of
//! descriptors awaiting dispatch. Each tick of the loop:
//!
//! 1. polls for readiness, blocking only when nothing is pending,
//! 2. queues every newly ready descriptor once, by source priority,
//! 3. checks and dispatches exactly one descriptor, the most urgent.
//!
//! Sources may be added, removed or released from inside their own
//! callbacks; ownership is re-validated after every callback.
//!
//! Dispatching one descriptor per tick means a source that keeps its
//! descriptor ready starves every less urgent source.

mod builder;
mod core;
mod pending;
mod poller;

pub use builder::LoopBuilder;
pub use poller::common::Interest;

pub(crate) use self::core::LoopInner;
pub(crate) use poller::platform;

use self::poller::Poller;
use crate::source::EventSource;
use crate::{Error, Result};

use std::fmt;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, error};

/// A single-threaded reactor.
///
/// Cloning the handle takes a reference; the loop is destroyed when the
/// last handle drops, force-releasing every source still registered and
/// closing the poller.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

/// A non-owning handle to an [`EventLoop`].
///
/// Callbacks stored in sources hold this instead of an [`EventLoop`], so
/// the loop and its sources do not keep each other alive.
#[derive(Clone, Default)]
pub struct WeakEventLoop {
    inner: Weak<LoopInner>,
}

impl EventLoop {
    /// Creates an event loop with the default configuration.
    pub fn new() -> Result<Self> {
        LoopBuilder::new().build()
    }

    pub(crate) fn with_capacity(event_capacity: usize) -> Result<Self> {
        let poller = Poller::new(event_capacity).map_err(Error::PollerCreate)?;

        debug!(event_capacity, "event loop created");

        Ok(Self {
            inner: Rc::new(LoopInner::new(poller, event_capacity)),
        })
    }

    /// Returns a non-owning handle to this loop.
    pub fn downgrade(&self) -> WeakEventLoop {
        WeakEventLoop {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Registers `source` with this loop.
    ///
    /// The loop takes a reference, registers every descriptor of the
    /// source edge-triggered, then calls the source's `prepare`. Returns
    /// `false` without side effects if the source is already registered,
    /// here or with another loop. A descriptor that fails to register is
    /// logged; the source is still added.
    pub fn add_source(&self, source: &EventSource) -> bool {
        self.inner.add_source(source)
    }

    /// Unregisters `source` from this loop.
    ///
    /// Its descriptors are deregistered and dropped from the pending
    /// queue, then the loop releases its reference. Returns `false` if
    /// the source is not registered with this loop.
    ///
    /// Safe to call from within the source's own callback.
    pub fn del_source(&self, source: &EventSource) -> bool {
        self.inner.del_source(source)
    }

    /// Runs the loop until [`quit`](Self::quit) is called.
    ///
    /// An interrupted poll is retried transparently; any other poll
    /// failure stops the loop and is returned. Once `run` returns the
    /// loop may be run again.
    pub fn run(&self) -> Result<()> {
        debug!(sources = self.inner.source_count(), "event loop running");

        let result = loop {
            if !self.inner.running.get() {
                break Ok(());
            }

            if let Err(e) = self.tick(self.inner.next_timeout()) {
                break Err(e);
            }
        };

        self.inner.running.set(true);
        debug!("event loop stopped");

        result
    }

    /// Runs a single tick of the loop.
    ///
    /// Polls without blocking unless `may_block` is set and nothing is
    /// pending, then dispatches at most one descriptor. Returns whether
    /// a pending descriptor was processed.
    pub fn iterate(&self, may_block: bool) -> Result<bool> {
        let timeout = if may_block {
            self.inner.next_timeout()
        } else {
            Some(Duration::ZERO)
        };

        self.tick(timeout)
    }

    fn tick(&self, timeout: Option<Duration>) -> Result<bool> {
        if let Err(e) = self.inner.poll(timeout) {
            error!(error = %e, "poll failed, stopping event loop");
            return Err(Error::Poll(e));
        }

        Ok(self.inner.dispatch_next())
    }

    /// Stops the loop at the end of the current tick.
    ///
    /// An in-flight poll or dispatch is never interrupted. Called while
    /// the loop is not running, it makes the next [`run`](Self::run)
    /// return immediately.
    pub fn quit(&self) {
        self.inner.running.set(false);
    }

    /// Returns `false` once [`quit`](Self::quit) was called and until
    /// [`run`](Self::run) returns.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Number of descriptors awaiting dispatch.
    pub fn pending_len(&self) -> usize {
        self.inner.pending_len()
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.inner.source_count()
    }

    /// Descriptors currently registered with the poller, sorted.
    pub fn registered_fds(&self) -> Vec<RawFd> {
        self.inner.registered_fds()
    }

    /// Number of live handles to this loop.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("sources", &self.inner.source_count())
            .field("pending", &self.inner.pending_len())
            .field("running", &self.inner.running.get())
            .finish()
    }
}

impl WeakEventLoop {
    /// Returns the loop if it is still alive.
    pub fn upgrade(&self) -> Option<EventLoop> {
        self.inner.upgrade().map(|inner| EventLoop { inner })
    }

    /// Stops the loop if it is still alive.
    pub fn quit(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.running.set(false);
        }
    }
}
