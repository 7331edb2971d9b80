use std::io;

use thiserror::Error;

/// Fatal reactor errors.
///
/// Only failures that stop the reactor are reported through this type.
/// Per-call failures (registering a descriptor, binding a source to a
/// loop) are reported as `bool` results by the operation itself.
#[derive(Debug, Error)]
pub enum Error {
    /// The readiness poller could not be created.
    #[error("failed to create poller: {0}")]
    PollerCreate(#[source] io::Error),

    /// Waiting for readiness failed for a reason other than interruption.
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
