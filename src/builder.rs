//! Configuration for new buffers and channels.
use crate::capacity::DEFAULT_CAPACITY;
use crate::channel::{self, Receiver, Sender};
use crate::error::Error;
use crate::spsc::{self, Consumer, Producer};

/// What a channel sender does when the buffer is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait until the receiver frees a slot. Nothing is ever lost.
    Reject,

    /// Discard the oldest element to make room. Sending never waits, which suits telemetry or log streams where the
    /// newest data matters most.
    OverwriteOldest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Reject
    }
}

/// Creates new buffers and channels with configurable properties.
#[derive(Clone, Debug)]
pub struct Builder {
    capacity: usize,
    overflow_policy: OverflowPolicy,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl Builder {
    /// Create a builder with the default capacity of 4096 and the [`Reject`](OverflowPolicy::Reject) policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested capacity. It is rounded up to the next power of two when building.
    pub fn capacity(&mut self, capacity: usize) -> &mut Self {
        self.capacity = capacity;
        self
    }

    /// Set what a channel sender does when the buffer is full.
    ///
    /// Plain buffers ignore this; their producer chooses per call between
    /// [`enqueue`](Producer::enqueue) and [`force_enqueue`](Producer::force_enqueue).
    pub fn overflow_policy(&mut self, policy: OverflowPolicy) -> &mut Self {
        self.overflow_policy = policy;
        self
    }

    /// Build a buffer and return its two halves.
    pub fn build<T: Copy>(&self) -> Result<(Producer<T>, Consumer<T>), Error> {
        spsc::bounded(self.capacity)
    }

    /// Build an async channel and return its two halves.
    ///
    /// A buffer of capacity 1 has no usable slot and a waiting sender would never make progress, so channels are
    /// given at least 2.
    pub fn build_channel<T: Copy>(&self) -> Result<(Sender<T>, Receiver<T>), Error> {
        let capacity = if self.capacity == 1 {
            tracing::debug!("raised channel capacity from 1 to 2");
            2
        } else {
            self.capacity
        };

        let (producer, consumer) = spsc::bounded(capacity)?;
        Ok(channel::from_halves(producer, consumer, self.overflow_policy))
    }
}
