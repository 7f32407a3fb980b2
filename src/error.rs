//! Error types.
use std::fmt;

/// Errors that can occur while creating a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A capacity of zero was requested.
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// The requested capacity cannot be rounded up to a power of two without overflowing.
    #[error("buffer capacity {requested} is too large")]
    CapacityOverflow {
        /// The capacity that was asked for.
        requested: usize,
    },
}

/// Returned by [`Producer::enqueue`](crate::Producer::enqueue) when the buffer is full.
///
/// Carries the rejected item so the caller can retry, drop it, or escalate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Take back the item that could not be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("buffer is full")
    }
}

impl<T> std::error::Error for Full<T> {}
