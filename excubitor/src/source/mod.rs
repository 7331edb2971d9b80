//! Event sources.
//!
//! An [`EventSource`] is anything that can become ready: it owns one or
//! more descriptors, a priority, a user callback, and a [`SourceFuncs`]
//! implementation supplied by its variant. Sources are reference
//! counted: the creator holds one handle and the loop holds another
//! while the source is registered.
//!
//! Provided variants:
//! - [`IoSource`] for caller-owned descriptors,
//! - [`SignalSource`] for OS signals through `signalfd`,
//! - [`TimerSource`] for `timerfd` based timers.

pub(crate) mod fd;
mod io;
mod signal;
mod timer;

pub use fd::EventSourceFd;
pub use io::IoSource;
pub use signal::SignalSource;
pub use timer::TimerSource;

use crate::reactor::{Interest, LoopInner};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

/// User callback invoked by a variant's [`dispatch`](SourceFuncs::dispatch).
///
/// Returning `false` asks the loop to unregister the source.
pub type Callback = Box<dyn FnMut(&EventSourceFd) -> bool>;

/// Releases user state attached with a callback.
pub type DestroyNotify = Box<dyn FnOnce()>;

/// Operations a source variant supplies to the loop.
///
/// All methods take `&self`: a variant keeps mutable state behind
/// interior mutability, because any callback may re-enter the loop and
/// reach the same source again.
pub trait SourceFuncs: Any {
    /// Called when the source is registered and after every dispatch
    /// that keeps it registered. Must not assume any descriptor is
    /// currently pending.
    fn prepare(&self, source: &EventSource) {
        let _ = source;
    }

    /// Decides whether the readiness reported on `fd` is genuine.
    ///
    /// Returning `false` drops `fd` from the pending queue without
    /// invoking the callback. The source stays registered.
    fn check(&self, source: &EventSource, fd: &EventSourceFd) -> bool;

    /// Called once the source left its loop, through `del_source` or
    /// because the loop was destroyed.
    fn detach(&self, source: &EventSource) {
        let _ = source;
    }

    /// Handles readiness on `fd`, usually by invoking `callback`.
    ///
    /// Returns whether the source should stay registered.
    fn dispatch(
        &self,
        source: &EventSource,
        fd: &EventSourceFd,
        callback: &mut dyn FnMut(&EventSourceFd) -> bool,
    ) -> bool;
}

/// A reference-counted event source.
///
/// Cloning a handle takes a reference, dropping it releases one. When
/// the last handle goes away the destroy notifier passed to
/// [`set_callback`](Self::set_callback) runs, exactly once.
#[derive(Clone)]
pub struct EventSource {
    pub(crate) inner: Rc<SourceInner>,
}

pub(crate) struct SourceInner {
    /// Dispatch priority, lower is more urgent.
    pub(crate) priority: Cell<i32>,

    /// Descriptors owned by this source, in insertion order.
    fds: RefCell<Vec<EventSourceFd>>,

    /// User callback and its destroy notifier.
    callback: RefCell<CallbackSlot>,

    /// Loop this source is registered with, empty when unregistered.
    event_loop: RefCell<Weak<LoopInner>>,

    /// Variant operations.
    funcs: Box<dyn SourceFuncs>,
}

#[derive(Default)]
struct CallbackSlot {
    func: Option<Callback>,
    notify: Option<DestroyNotify>,

    /// Bumped on every `set_callback`, so a callback replaced while it
    /// was running is not put back afterwards.
    generation: u64,
}

impl EventSource {
    /// Wraps a variant into a new, unregistered source with priority 0
    /// and no callback.
    pub fn new<F: SourceFuncs>(funcs: F) -> Self {
        Self {
            inner: Rc::new(SourceInner {
                priority: Cell::new(0),
                fds: RefCell::new(Vec::new()),
                callback: RefCell::new(CallbackSlot::default()),
                event_loop: RefCell::new(Weak::new()),
                funcs: Box::new(funcs),
            }),
        }
    }

    /// Adds a descriptor to this source.
    ///
    /// If the source is registered, the descriptor is registered with
    /// the loop's poller right away; a failure is logged and the
    /// descriptor stays owned but unwatched.
    pub fn add_fd(&self, fd: RawFd, interest: Interest) -> EventSourceFd {
        let source_fd = EventSourceFd::new(fd, interest, Rc::downgrade(&self.inner));
        self.inner.fds.borrow_mut().push(source_fd.clone());

        if let Some(event_loop) = self.loop_inner() {
            event_loop.register_fd(&source_fd);
        }

        source_fd
    }

    /// Removes a descriptor from this source.
    ///
    /// The descriptor is deregistered from the loop, dropped from its
    /// pending queue and detached from this source. Returns `false` if
    /// it does not belong to this source.
    pub fn del_fd(&self, fd: &EventSourceFd) -> bool {
        let removed = {
            let mut fds = self.inner.fds.borrow_mut();
            match fds.iter().position(|f| f == fd) {
                Some(index) => fds.remove(index),
                None => return false,
            }
        };

        if let Some(event_loop) = self.loop_inner() {
            event_loop.deregister_fd(&removed);
            event_loop.purge(&removed);
        }
        removed.detach();

        true
    }

    /// Returns the descriptors owned by this source.
    pub fn fds(&self) -> Vec<EventSourceFd> {
        self.inner.fds.borrow().clone()
    }

    /// Sets the dispatch priority. Lower values are dispatched first.
    ///
    /// Descriptors already queued keep their position; the new value
    /// applies to the next insertion.
    pub fn set_priority(&self, priority: i32) {
        self.inner.priority.set(priority);
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority.get()
    }

    /// Sets the user callback.
    ///
    /// `notify` runs exactly once: when the source is destroyed, or when
    /// this callback is replaced by another `set_callback`.
    ///
    /// Called from inside the running callback, the previous `notify`
    /// runs before `set_callback` returns, while the previous callback is
    /// still executing. State shared between the two must not be assumed
    /// alive after this call.
    pub fn set_callback<F>(&self, func: F, notify: Option<DestroyNotify>)
    where
        F: FnMut(&EventSourceFd) -> bool + 'static,
    {
        let (old_func, old_notify) = {
            let mut slot = self.inner.callback.borrow_mut();
            slot.generation += 1;

            (
                slot.func.replace(Box::new(func)),
                std::mem::replace(&mut slot.notify, notify),
            )
        };

        drop(old_func);
        if let Some(notify) = old_notify {
            notify();
        }
    }

    /// Returns `true` if the source is registered with a loop.
    pub fn is_attached(&self) -> bool {
        self.loop_inner().is_some()
    }

    /// Number of live handles to this source, the loop's included.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Returns the variant of this source if it is a `T`.
    pub fn funcs<T: SourceFuncs>(&self) -> Option<&T> {
        let funcs: &dyn Any = &*self.inner.funcs;
        funcs.downcast_ref::<T>()
    }

    pub(crate) fn loop_inner(&self) -> Option<Rc<LoopInner>> {
        self.inner.event_loop.borrow().upgrade()
    }

    pub(crate) fn is_attached_to(&self, event_loop: &LoopInner) -> bool {
        std::ptr::eq(self.inner.event_loop.borrow().as_ptr(), event_loop)
    }

    pub(crate) fn set_loop(&self, event_loop: Weak<LoopInner>) {
        *self.inner.event_loop.borrow_mut() = event_loop;
    }

    pub(crate) fn prepare(&self) {
        self.inner.funcs.prepare(self);
    }

    pub(crate) fn on_detach(&self) {
        self.inner.funcs.detach(self);
    }

    pub(crate) fn check(&self, fd: &EventSourceFd) -> bool {
        self.inner.funcs.check(self, fd)
    }

    /// Runs the variant's dispatch with the user callback.
    ///
    /// The callback is taken out of its slot for the duration of the
    /// call, so it may replace itself or touch this source freely.
    pub(crate) fn dispatch(&self, fd: &EventSourceFd) -> bool {
        let (func, generation) = {
            let mut slot = self.inner.callback.borrow_mut();
            (slot.func.take(), slot.generation)
        };

        let Some(mut func) = func else {
            return self.inner.funcs.dispatch(self, fd, &mut |_: &EventSourceFd| true);
        };

        let keep = self.inner.funcs.dispatch(self, fd, &mut *func);

        let replaced = {
            let mut slot = self.inner.callback.borrow_mut();
            if slot.generation == generation && slot.func.is_none() {
                slot.func = Some(func);
                None
            } else {
                Some(func)
            }
        };
        drop(replaced);

        keep
    }
}

impl PartialEq for EventSource {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EventSource {}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("priority", &self.inner.priority.get())
            .field("fds", &self.inner.fds.borrow())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl Drop for SourceInner {
    /// Detaches the owned descriptors and releases the callback state.
    fn drop(&mut self) {
        for fd in self.fds.get_mut().drain(..) {
            if fd.is_dispatched() {
                warn!(fd = fd.raw_fd(), "event source destroyed while queued");
            }
            fd.detach();
        }

        let slot = std::mem::take(self.callback.get_mut());
        drop(slot.func);
        if let Some(notify) = slot.notify {
            notify();
        }

        debug!("event source destroyed");
    }
}
