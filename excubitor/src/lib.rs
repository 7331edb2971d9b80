//! # Excubitor
//!
//! **Excubitor** is a minimal single-threaded reactor for Linux, built
//! directly on edge-triggered `epoll`.
//!
//! Independent producers of readiness (descriptors, signals, timers, or
//! any custom variant) are expressed as [`EventSource`]s and share one
//! [`EventLoop`]. The loop offers:
//!
//! - **Strict priority dispatch**: lower priority values first, ties in
//!   arrival order, one descriptor per tick
//! - **Reentrant mutation**: callbacks may add, remove or release
//!   sources, including the one being dispatched
//! - **Shared ownership**: sources are reference counted between their
//!   creator and the loop, with a destroy notifier run exactly once
//! - **Adaptive polling**: the loop sleeps when nothing is pending and
//!   drains its backlog without blocking otherwise
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use excubitor::{EventLoop, SignalSource};
//!
//! let event_loop = EventLoop::new()?;
//!
//! let sigint = SignalSource::new(&[libc::SIGINT])?;
//! sigint.set_priority(3);
//! let handle = event_loop.downgrade();
//! sigint.set_callback(move |_| {
//!     handle.quit();
//!     false
//! }, None);
//! event_loop.add_source(&sigint);
//! drop(sigint);
//!
//! event_loop.run()?;
//! ```
//!
//! ## Modules
//!
//! - [`reactor`]: the event loop and its configuration
//! - [`source`]: the event source abstraction and its variants

pub mod reactor;
pub mod source;

mod error;
mod utils;

pub use error::{Error, Result};
pub use reactor::{EventLoop, Interest, LoopBuilder, WeakEventLoop};
pub use source::{
    Callback, DestroyNotify, EventSource, EventSourceFd, IoSource, SignalSource, SourceFuncs,
    TimerSource,
};
