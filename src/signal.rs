//! Wake-up notifications between the two halves of a channel.

use futures_util::task::AtomicWaker;
use std::sync::atomic::*;
use std::task::Waker;

/// Lets each half of a channel put its task to sleep until the other half makes progress or goes away.
#[derive(Default)]
pub(crate) struct Signal {
    sender: AtomicWaker,
    receiver: AtomicWaker,
    sender_closed: AtomicBool,
    receiver_closed: AtomicBool,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register the sending task to be woken once the receiver frees up space or closes.
    pub(crate) fn register_sender(&self, waker: &Waker) {
        self.sender.register(waker);
    }

    /// Register the receiving task to be woken once the sender publishes data or closes.
    pub(crate) fn register_receiver(&self, waker: &Waker) {
        self.receiver.register(waker);
    }

    pub(crate) fn notify_sender(&self) {
        self.sender.wake();
    }

    pub(crate) fn notify_receiver(&self) {
        self.receiver.wake();
    }

    /// Mark the sending half closed and wake the receiver so it can observe the end of the stream.
    pub(crate) fn close_sender(&self) {
        if !self.sender_closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("channel sender closed");
        }
        self.receiver.wake();
    }

    /// Mark the receiving half closed and wake the sender so it stops waiting for space.
    pub(crate) fn close_receiver(&self) {
        if !self.receiver_closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("channel receiver closed");
        }
        self.sender.wake();
    }

    pub(crate) fn is_sender_closed(&self) -> bool {
        self.sender_closed.load(Ordering::Acquire)
    }

    pub(crate) fn is_receiver_closed(&self) -> bool {
        self.receiver_closed.load(Ordering::Acquire)
    }
}
