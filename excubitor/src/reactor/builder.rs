use super::EventLoop;
use crate::Result;

/// Events returned by a single poll unless configured otherwise.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Builder for configuring and creating an event loop.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = LoopBuilder::new()
///     .event_capacity(64)
///     .build()?;
/// ```
pub struct LoopBuilder {
    /// Maximum number of readiness events collected per poll.
    event_capacity: usize,
}

impl LoopBuilder {
    /// Creates a new `LoopBuilder` with default configuration.
    pub fn new() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets how many readiness events a single poll may return.
    ///
    /// Descriptors beyond this count stay ready in the kernel and are
    /// reported by the next poll.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.event_capacity = n;
        self
    }

    /// Builds the event loop, opening its poller.
    ///
    /// Fails with [`Error::PollerCreate`](crate::Error::PollerCreate) if
    /// the poller cannot be opened.
    pub fn build(self) -> Result<EventLoop> {
        EventLoop::with_capacity(self.event_capacity)
    }
}

impl Default for LoopBuilder {
    /// Creates a default `LoopBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
