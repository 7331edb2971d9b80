//! Readiness poller and platform syscalls.
//!
//! The reactor is built on Linux `epoll` in edge-triggered mode. The
//! poller is owned exclusively by one event loop and is only touched
//! from the thread running it.

pub(crate) mod common;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) use epoll::Event;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(target_os = "linux")]
pub(crate) mod unix;

#[cfg(target_os = "linux")]
pub(crate) use unix as platform;

#[cfg(not(target_os = "linux"))]
compile_error!("excubitor requires Linux (epoll, signalfd and timerfd)");
