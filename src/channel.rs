//! Asynchronous channels built on top of a circular buffer.
//!
//! A [`Sender`] and [`Receiver`] wrap the two halves of a buffer and add the waiting the buffer itself never does:
//! the receiver is a [`Stream`] that sleeps while the buffer is empty, and the sender can wait for space. Neither
//! half allocates after construction.
use crate::buffer::Buffer;
use crate::builder::{Builder, OverflowPolicy};
use crate::error::{Error, Full};
use crate::signal::Signal;
use crate::spsc::{Consumer, Producer};
use futures_core::Stream;
use futures_util::future::poll_fn;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Create a new channel with the given capacity and the [`Reject`](OverflowPolicy::Reject) policy.
pub fn bounded<T: Copy>(capacity: usize) -> Result<(Sender<T>, Receiver<T>), Error> {
    Builder::new().capacity(capacity).build_channel()
}

pub(crate) fn from_halves<T>(
    producer: Producer<T>,
    consumer: Consumer<T>,
    overflow_policy: OverflowPolicy,
) -> (Sender<T>, Receiver<T>) {
    let signal = Arc::new(Signal::new());

    (
        Sender {
            producer,
            signal: signal.clone(),
            overflow_policy,
        },
        Receiver {
            consumer,
            signal,
        },
    )
}

/// The other half of the channel has gone away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("channel closed")]
pub struct Closed;

/// Error returned by [`Sender::try_send`].
#[derive(Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrySendError<T> {
    /// The buffer is full.
    #[error("channel is full")]
    Full(T),

    /// The receiver has been dropped.
    #[error("channel closed")]
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Take back the item that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(item) | TrySendError::Closed(item) => item,
        }
    }

    /// Returns `true` if the send failed because the buffer was full.
    pub fn is_full(&self) -> bool {
        match self {
            TrySendError::Full(_) => true,
            TrySendError::Closed(_) => false,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Error returned by [`Sender::send`] when the receiver has been dropped.
#[derive(Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel closed")]
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

/// The sending half of a channel.
pub struct Sender<T> {
    producer: Producer<T>,
    signal: Arc<Signal>,
    overflow_policy: OverflowPolicy,
}

impl<T> Sender<T> {
    /// The policy applied by [`send`](Sender::send) when the buffer is full.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Returns `true` if the receiver has been dropped, or if this sender was closed.
    pub fn is_closed(&self) -> bool {
        self.signal.is_receiver_closed() || self.signal.is_sender_closed()
    }

    /// Close the channel. The receiver can still drain whatever was sent before.
    pub fn close(&mut self) {
        self.signal.close_sender();
    }

    /// Wait until there is room for at least one element.
    ///
    /// Once this returns `Ready(Ok(()))`, the next send will not find the buffer full, since only the receiver can
    /// change that and it only ever frees space.
    pub fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Closed>> {
        if self.is_closed() {
            return Poll::Ready(Err(Closed));
        }

        if !self.producer.is_full() {
            return Poll::Ready(Ok(()));
        }

        self.signal.register_sender(cx.waker());

        // Check again in case the receiver made room before we registered.
        if self.is_closed() {
            Poll::Ready(Err(Closed))
        } else if !self.producer.is_full() {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }
}

impl<T: Copy> Sender<T> {
    /// Send an item without waiting.
    pub fn try_send(&mut self, item: T) -> Result<(), TrySendError<T>> {
        if self.is_closed() {
            return Err(TrySendError::Closed(item));
        }

        match self.producer.enqueue(item) {
            Ok(()) => {
                self.signal.notify_receiver();
                Ok(())
            }
            Err(Full(item)) => Err(TrySendError::Full(item)),
        }
    }

    /// Send an item, discarding the oldest element if the buffer is full.
    ///
    /// Returns `true` if an element was discarded.
    pub fn force_send(&mut self, item: T) -> Result<bool, SendError<T>> {
        if self.is_closed() {
            return Err(SendError(item));
        }

        let discarded = self.producer.force_enqueue(item);
        self.signal.notify_receiver();
        Ok(discarded)
    }

    /// Send an item, applying the channel's [`OverflowPolicy`] if the buffer is full.
    pub async fn send(&mut self, item: T) -> Result<(), SendError<T>> {
        if self.overflow_policy == OverflowPolicy::OverwriteOldest {
            return self.force_send(item).map(|_| ());
        }

        if poll_fn(|cx| self.poll_ready(cx)).await.is_err() {
            return Err(SendError(item));
        }

        self.try_send(item).map_err(|e| SendError(e.into_inner()))
    }

    /// Copy as many elements from `src` as fit, waiting until at least one does.
    ///
    /// Returns the number of elements sent.
    pub fn poll_send_slice(&mut self, cx: &mut Context<'_>, src: &[T]) -> Poll<Result<usize, Closed>> {
        if src.is_empty() {
            return Poll::Ready(Ok(0));
        }

        match self.poll_ready(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }

        let count = self.producer.push_slice(src);
        self.signal.notify_receiver();
        Poll::Ready(Ok(count))
    }
}

impl<T> Buffer for Sender<T> {
    fn len(&self) -> usize {
        self.producer.len()
    }

    fn capacity(&self) -> usize {
        self.producer.capacity()
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.signal.close_sender();
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("producer", &self.producer)
            .field("overflow_policy", &self.overflow_policy)
            .finish()
    }
}

/// The receiving half of a channel.
pub struct Receiver<T> {
    consumer: Consumer<T>,
    signal: Arc<Signal>,
}

impl<T> Receiver<T> {
    /// Returns `true` if the sender has been dropped or closed.
    ///
    /// Elements sent before that may still be waiting to be received.
    pub fn is_closed(&self) -> bool {
        self.signal.is_sender_closed()
    }

    /// Discard every element currently in the channel.
    pub fn clear(&mut self) {
        self.consumer.clear();
        self.signal.notify_sender();
    }
}

impl<T: Copy> Receiver<T> {
    /// Receive an item without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        let item = self.consumer.dequeue();

        if item.is_some() {
            self.signal.notify_sender();
        }

        item
    }

    /// Receive as many elements as are available into `dest`, waiting until at least one is.
    ///
    /// Returns the number of elements received, or 0 once the sender is closed and the channel is drained.
    pub fn poll_recv_slice(&mut self, cx: &mut Context<'_>, dest: &mut [T]) -> Poll<usize> {
        if dest.is_empty() {
            return Poll::Ready(0);
        }

        let count = self.consumer.pop_slice(dest);
        if count > 0 {
            self.signal.notify_sender();
            return Poll::Ready(count);
        }

        self.signal.register_receiver(cx.waker());

        // Look at the closed flag before the buffer: anything sent before the close is visible by then.
        let closed = self.signal.is_sender_closed();

        let count = self.consumer.pop_slice(dest);
        if count > 0 {
            self.signal.notify_sender();
            Poll::Ready(count)
        } else if closed {
            Poll::Ready(0)
        } else {
            Poll::Pending
        }
    }

    /// Receive the next item, waiting until one is available.
    ///
    /// Returns `None` once the sender is closed and the channel is drained.
    pub async fn recv(&mut self) -> Option<T> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if let Some(item) = self.try_recv() {
            return Poll::Ready(Some(item));
        }

        self.signal.register_receiver(cx.waker());

        let closed = self.signal.is_sender_closed();

        match self.try_recv() {
            Some(item) => Poll::Ready(Some(item)),
            None if closed => Poll::Ready(None),
            None => Poll::Pending,
        }
    }
}

impl<T: Copy> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_recv(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.consumer.len(), None)
    }
}

impl<T> Buffer for Receiver<T> {
    fn len(&self) -> usize {
        self.consumer.len()
    }

    fn capacity(&self) -> usize {
        self.consumer.capacity()
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.signal.close_receiver();
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("consumer", &self.consumer)
            .finish()
    }
}
