//! Lock-free single-producer single-consumer circular buffer.
//!
//! A buffer is split into a [`Producer`] and a [`Consumer`] half. Each half can be moved to its own thread, and
//! neither can be cloned, so exactly one thread ever inserts and exactly one thread ever removes.
//!
//! The halves share two cursors. The write cursor is only ever stored by the producer; the read cursor is normally
//! only advanced by the consumer, except when the producer forces an element in and discards the oldest one. Both
//! cursors are counters that only ever move forward, and the slot a cursor refers to is `cursor & mask`.
use crate::buffer::Buffer;
use crate::capacity::{self, Slot};
use crate::error::{Error, Full};
use crossbeam_utils::CachePadded;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{self, AtomicUsize, Ordering};
use std::sync::Arc;

/// Create a new buffer with a given capacity, rounded up to the next power of two.
///
/// At most `capacity - 1` elements can be held at once.
pub fn bounded<T: Copy>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), Error> {
    let capacity = capacity::normalize(capacity).map(|normalized| {
        if normalized != capacity {
            tracing::debug!(requested = capacity, capacity = normalized, "rounded buffer capacity up");
        }
        normalized
    })?;

    Ok(with_capacity(capacity))
}

/// Create a new buffer from a capacity that is already a power of two.
pub(crate) fn with_capacity<T: Copy>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    debug_assert!(capacity.is_power_of_two());

    let inner = Arc::new(Inner::new(capacity));

    tracing::debug!(capacity, "created buffer");

    (
        Producer {
            inner: inner.clone(),
        },
        Consumer {
            inner,
        },
    )
}

/// Producing half of a buffer.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Copy> Producer<T> {
    /// Insert an item at the back of the buffer.
    ///
    /// If the buffer is full the item is handed back in [`Full`] and the buffer is left untouched.
    pub fn enqueue(&mut self, item: T) -> Result<(), Full<T>> {
        let write = self.inner.write.load(Ordering::Relaxed);
        let read = self.inner.read.load(Ordering::Acquire);

        if write.wrapping_sub(read) == self.inner.mask {
            return Err(Full(item));
        }

        unsafe {
            self.inner.write_slot(write, item);
        }

        self.inner.write.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Insert an item at the back of the buffer, discarding the oldest element if the buffer is full.
    ///
    /// Returns `true` if an element was discarded to make room. A buffer with a capacity of 1 has no usable slot, so
    /// there the item itself is discarded.
    pub fn force_enqueue(&mut self, item: T) -> bool {
        if self.inner.mask == 0 {
            tracing::trace!("buffer has no usable slot, dropping item");
            return true;
        }

        let write = self.inner.write.load(Ordering::Relaxed);
        let read = self.inner.read.load(Ordering::Acquire);
        let mut discarded = false;

        if write.wrapping_sub(read) == self.inner.mask {
            // If the exchange fails the consumer has just taken the oldest element, which frees a slot all the same.
            let next = read.wrapping_add(1);
            discarded = self.inner.read.compare_exchange(read, next, Ordering::AcqRel, Ordering::Acquire).is_ok();

            if discarded {
                tracing::trace!(position = read & self.inner.mask, "overwrote oldest element");
            }
        }

        unsafe {
            self.inner.write_slot(write, item);
        }

        self.inner.write.store(write.wrapping_add(1), Ordering::Release);
        discarded
    }

    /// Copy the given elements and insert them into the back of the buffer.
    ///
    /// Returns the number of elements pushed, which is less than `src.len()` if the buffer fills up.
    pub fn push_slice(&mut self, src: &[T]) -> usize {
        let write = self.inner.write.load(Ordering::Relaxed);
        let read = self.inner.read.load(Ordering::Acquire);

        // The read cursor can only have moved forward since we loaded it, so this never overestimates.
        let free = self.inner.mask - write.wrapping_sub(read);
        let count = free.min(src.len());

        for (offset, item) in src[..count].iter().enumerate() {
            unsafe {
                self.inner.write_slot(write.wrapping_add(offset), *item);
            }
        }

        if count > 0 {
            self.inner.write.store(write.wrapping_add(count), Ordering::Release);
        }

        count
    }
}

impl<T> Producer<T> {
    /// Discard every element currently in the buffer.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Returns `true` if the consuming half has been dropped.
    pub fn is_closed(&self) -> bool {
        Inner::is_peer_gone(&self.inner)
    }
}

impl<T> Buffer for Producer<T> {
    #[inline]
    fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Consuming half of a buffer.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Copy> Consumer<T> {
    /// Remove the oldest element from the buffer.
    ///
    /// Returns `None` if the buffer is empty.
    pub fn dequeue(&mut self) -> Option<T> {
        let mut read = self.inner.read.load(Ordering::Relaxed);

        loop {
            let write = self.inner.write.load(Ordering::Acquire);

            if read == write {
                return None;
            }

            let value = unsafe { self.inner.read_slot(read) };

            // Claiming the element validates the copy: if the producer discarded it in the meantime the slot may have
            // been overwritten, so throw the copy away and start over from the new read cursor.
            match self.inner.read.compare_exchange(
                read,
                read.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(unsafe { value.assume_init() }),
                Err(current) => read = current,
            }
        }
    }

    /// Pull elements from the front of the buffer into the given location, up to the length of the destination.
    ///
    /// Returns the number of elements pulled.
    pub fn pop_slice(&mut self, dest: &mut [T]) -> usize {
        let mut pulled = 0;

        for slot in dest.iter_mut() {
            match self.dequeue() {
                Some(value) => *slot = value,
                None => break,
            }
            pulled += 1;
        }

        pulled
    }

    /// Get a copy of the oldest element without removing it.
    pub fn peek(&self) -> Option<T> {
        loop {
            let read = self.inner.read.load(Ordering::Acquire);
            let write = self.inner.write.load(Ordering::Acquire);

            if read == write {
                return None;
            }

            let value = unsafe { self.inner.read_slot(read) };

            atomic::fence(Ordering::Acquire);

            if self.inner.read.load(Ordering::Relaxed) == read {
                return Some(unsafe { value.assume_init() });
            }
        }
    }
}

impl<T> Consumer<T> {
    /// Discard every element currently in the buffer.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Returns `true` if the producing half has been dropped.
    ///
    /// Elements enqueued before the producer went away can still be dequeued.
    pub fn is_closed(&self) -> bool {
        Inner::is_peer_gone(&self.inner)
    }
}

impl<T> Buffer for Consumer<T> {
    #[inline]
    fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Contains the shared data between the producer and consumer.
struct Inner<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
}

// SAFETY: Slots are only written by the single producer at positions the consumer cannot claim yet, and only turned
// into values by the consumer once claimed. Cursors are atomics.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: capacity::allocate(capacity),
            mask: capacity - 1,
            write: CachePadded::new(AtomicUsize::new(0)),
            read: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        // Read first: the write cursor is never behind any read cursor observed earlier.
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);

        occupied(read, write, self.mask)
    }

    /// Returns `true` once the other half has been dropped.
    ///
    /// Everything that half published before going away is visible afterwards.
    fn is_peer_gone(this: &Arc<Self>) -> bool {
        if Arc::strong_count(this) == 1 {
            // Pairs with the release decrement in the peer's `Arc` drop; the count itself is a relaxed load.
            atomic::fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    fn clear(&self) {
        let mut read = self.read.load(Ordering::Relaxed);

        // A forced enqueue may advance the read cursor concurrently, so only ever move it forward from the value we
        // last saw.
        loop {
            let write = self.write.load(Ordering::Acquire);

            match self.read.compare_exchange(read, write, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => {
                    tracing::debug!(discarded = write.wrapping_sub(read), "cleared buffer");
                    return;
                }
                Err(current) => read = current,
            }
        }
    }
}

/// Number of elements between two cursor snapshots.
///
/// The producer may have forced its way past several slots between the two loads, so the distance is capped at the
/// number of usable slots. Even if `write` overflows and becomes less than `read`, subtracting will underflow and
/// result in the correct length.
#[inline]
fn occupied(read: usize, write: usize, mask: usize) -> usize {
    write.wrapping_sub(read).min(mask)
}

impl<T: Copy> Inner<T> {
    /// Store an item in the slot for the given cursor.
    ///
    /// # Safety
    ///
    /// Must only be called by the producer, for a cursor that has not been published yet.
    #[inline]
    unsafe fn write_slot(&self, cursor: usize, item: T) {
        let slot = &self.slots[cursor & self.mask];
        ptr::write_volatile(slot.get(), MaybeUninit::new(item));
    }

    /// Copy the contents of the slot for the given cursor without claiming it.
    ///
    /// # Safety
    ///
    /// Must only be called by the consumer, for a cursor it observed between the read and write cursors. The copy may
    /// be torn if the producer discarded the element concurrently, so it must not be assumed initialized until the
    /// read cursor has been validated.
    #[inline]
    unsafe fn read_slot(&self, cursor: usize) -> MaybeUninit<T> {
        let slot = &self.slots[cursor & self.mask];
        ptr::read_volatile(slot.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_capacity() {
        let buffer = bounded::<u8>(16).unwrap();

        assert_eq!(buffer.0.capacity(), 16);
        assert_eq!(buffer.1.capacity(), 16);
    }

    #[test]
    fn test_capacity_rounds_up() {
        let (producer, consumer) = bounded::<u8>(5).unwrap();

        assert_eq!(producer.capacity(), 8);
        assert_eq!(consumer.capacity(), 8);
        assert_eq!(bounded::<u8>(8).unwrap().0.capacity(), 8);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(bounded::<u8>(0).err(), Some(Error::ZeroCapacity));
    }

    #[test]
    fn test_empty_after_construction() {
        let (producer, consumer) = bounded::<u32>(8).unwrap();

        assert!(producer.is_empty());
        assert!(consumer.is_empty());
        assert!(!producer.is_full());
        assert_eq!(consumer.len(), 0);
        assert_eq!(consumer.usage_ratio(), 0.0);
    }

    #[test]
    fn test_enqueue_then_dequeue() {
        let (mut producer, mut consumer) = bounded(8).unwrap();

        assert!(producer.enqueue(42u64).is_ok());
        assert!(!consumer.is_empty());

        assert_eq!(consumer.dequeue(), Some(42));
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_dequeue_empty() {
        let (_producer, mut consumer) = bounded::<u64>(8).unwrap();

        assert_eq!(consumer.dequeue(), None);
    }

    #[test]
    fn test_full_buffer() {
        let (mut producer, mut consumer) = bounded(8).unwrap();

        for i in 0..7u32 {
            assert!(producer.enqueue(i).is_ok());
        }

        assert!(producer.is_full());
        assert_eq!(producer.len(), 7);
        assert_eq!(producer.enqueue(7), Err(Full(7)));
        assert_eq!(producer.enqueue(8), Err(Full(8)));
        assert_eq!(producer.len(), 7);

        assert_eq!(consumer.dequeue(), Some(0));
        assert!(producer.enqueue(7).is_ok());
    }

    #[test]
    fn test_force_enqueue_discards_oldest() {
        let (mut producer, mut consumer) = bounded(8).unwrap();

        for i in 0..7u32 {
            assert!(producer.enqueue(i).is_ok());
        }

        assert!(producer.force_enqueue(7));
        assert!(producer.is_full());
        assert_eq!(producer.len(), 7);

        let drained: Vec<_> = std::iter::from_fn(|| consumer.dequeue()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_force_enqueue_with_room_does_not_discard() {
        let (mut producer, mut consumer) = bounded(4).unwrap();

        assert!(!producer.force_enqueue(1u8));
        assert!(!producer.force_enqueue(2u8));

        assert_eq!(consumer.dequeue(), Some(1));
        assert_eq!(consumer.dequeue(), Some(2));
    }

    #[test]
    fn test_capacity_one_holds_nothing() {
        let (mut producer, mut consumer) = bounded(1).unwrap();

        assert!(producer.is_full());
        assert!(producer.is_empty());
        assert_eq!(producer.enqueue(1u8), Err(Full(1)));
        assert!(producer.force_enqueue(1u8));
        assert_eq!(consumer.dequeue(), None);
    }

    #[test]
    fn test_wraparound() {
        let (mut producer, mut consumer) = bounded(4).unwrap();

        for round in 0..10u64 {
            for i in 0..3 {
                assert!(producer.enqueue(round * 3 + i).is_ok());
            }
            for i in 0..3 {
                assert_eq!(consumer.dequeue(), Some(round * 3 + i));
            }
        }

        assert!(consumer.is_empty());
    }

    #[test]
    fn test_clear() {
        let (mut producer, mut consumer) = bounded(8).unwrap();

        producer.push_slice(&[1u8, 2, 3, 4, 5]);
        assert_eq!(consumer.len(), 5);

        consumer.clear();
        assert!(consumer.is_empty());
        assert_eq!(producer.len(), 0);
        assert_eq!(consumer.dequeue(), None);

        // Still usable afterwards.
        assert!(producer.enqueue(6).is_ok());
        producer.clear();
        assert_eq!(consumer.dequeue(), None);
    }

    #[test]
    fn test_push_slice_more_than_buffer() {
        let (mut producer, mut consumer) = bounded(4).unwrap();

        assert_eq!(producer.push_slice(b"hello"), 3);
        assert!(producer.is_full());
        assert_eq!(producer.push_slice(b"!"), 0);

        let mut dest = [0; 8];
        assert_eq!(consumer.pop_slice(&mut dest), 3);
        assert_eq!(&dest[..3], b"hel");
    }

    #[test]
    fn test_pop_slice_less_than_buffer() {
        let (mut producer, mut consumer) = bounded(32).unwrap();
        let bytes = b"hello world";
        producer.push_slice(bytes);

        let mut dest = [0; 4];
        assert_eq!(consumer.pop_slice(&mut dest), dest.len());
        assert_eq!(&dest, &bytes[0..4]);
        assert_eq!(consumer.len(), bytes.len() - dest.len());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (mut producer, mut consumer) = bounded(8).unwrap();

        assert_eq!(consumer.peek(), None);

        producer.enqueue('a').unwrap();
        producer.enqueue('b').unwrap();

        assert_eq!(consumer.peek(), Some('a'));
        assert_eq!(consumer.len(), 2);
        assert_eq!(consumer.dequeue(), Some('a'));
        assert_eq!(consumer.peek(), Some('b'));
    }

    #[test]
    fn test_usage_ratio() {
        let (mut producer, consumer) = bounded(8).unwrap();

        producer.push_slice(&[0u16; 2]);
        assert_eq!(consumer.usage_ratio(), 0.25);

        producer.push_slice(&[0u16; 5]);
        assert_eq!(consumer.usage_ratio(), 0.875);
    }

    #[test]
    fn test_closed_halves() {
        let (mut producer, consumer) = bounded(8).unwrap();

        assert!(!producer.is_closed());
        assert!(!consumer.is_closed());

        producer.enqueue(1u8).unwrap();
        drop(producer);
        assert!(consumer.is_closed());

        let (producer, consumer) = bounded::<u8>(8).unwrap();
        drop(consumer);
        assert!(producer.is_closed());
    }

    #[test]
    fn test_drained_after_producer_dropped() {
        let (mut producer, mut consumer) = bounded(8).unwrap();

        producer.push_slice(&[1u8, 2]);
        drop(producer);

        assert_eq!(consumer.dequeue(), Some(1));
        assert_eq!(consumer.dequeue(), Some(2));
        assert_eq!(consumer.dequeue(), None);
    }

    #[test]
    fn test_occupied_caps_overtaken_snapshot() {
        assert_eq!(occupied(0, 0, 7), 0);
        assert_eq!(occupied(2, 9, 7), 7);
        assert_eq!(occupied(usize::max_value(), 2, 7), 3);

        // The producer forced two more elements in between loading the cursors.
        assert_eq!(occupied(0, 9, 7), 7);
        assert_eq!(occupied(0, 17, 7), 7);
    }

    #[test]
    fn test_len_after_forced_overtake() {
        let (mut producer, consumer) = bounded(8).unwrap();

        for i in 0..100u32 {
            producer.force_enqueue(i);
            assert_eq!(consumer.len(), (i as usize + 1).min(7));
        }
        assert!(consumer.is_full());
    }

    #[test]
    fn test_closed_consumer_sees_everything_published() {
        let (mut producer, mut consumer) = bounded(64).unwrap();

        let guard = std::thread::spawn(move || {
            for i in 0..50u32 {
                producer.enqueue(i).unwrap();
            }
        });

        while !consumer.is_closed() {
            std::thread::yield_now();
        }
        guard.join().unwrap();

        assert_eq!(consumer.len(), 50);
        let drained: Vec<_> = std::iter::from_fn(|| consumer.dequeue()).collect();
        assert_eq!(drained, (0..50).collect::<Vec<_>>());
    }

    #[quickcheck]
    fn round_trip_preserves_order(values: Vec<u32>) -> bool {
        let (mut producer, mut consumer) = bounded(values.len() + 1).unwrap();

        for value in &values {
            if producer.enqueue(*value).is_err() {
                return false;
            }
        }

        let drained: Vec<_> = std::iter::from_fn(|| consumer.dequeue()).collect();
        drained == values && consumer.is_empty()
    }

    /// Interleaved operations behave like a bounded FIFO that holds at most `capacity - 1` elements.
    #[quickcheck]
    fn behaves_like_bounded_fifo(capacity: u8, ops: Vec<Option<u16>>) -> bool {
        let (mut producer, mut consumer) = bounded(capacity as usize % 32 + 1).unwrap();
        let limit = producer.capacity() - 1;
        let mut model = std::collections::VecDeque::new();

        for op in ops {
            match op {
                Some(value) => {
                    let accepted = producer.enqueue(value).is_ok();
                    if accepted != (model.len() < limit) {
                        return false;
                    }
                    if accepted {
                        model.push_back(value);
                    }
                }
                None => {
                    if consumer.dequeue() != model.pop_front() {
                        return false;
                    }
                }
            }

            if consumer.len() != model.len() || consumer.len() > limit {
                return false;
            }
            let expected_ratio = model.len() as f64 / consumer.capacity() as f64;
            if consumer.usage_ratio() != expected_ratio || consumer.usage_ratio() >= 1.0 {
                return false;
            }
        }

        true
    }

    /// Forcing every element in keeps exactly the newest `capacity - 1` of them.
    #[quickcheck]
    fn force_enqueue_keeps_newest(values: Vec<u32>) -> bool {
        let (mut producer, mut consumer) = bounded(8).unwrap();

        for value in &values {
            producer.force_enqueue(*value);
        }

        let keep = values.len().min(7);
        let drained: Vec<_> = std::iter::from_fn(|| consumer.dequeue()).collect();
        drained[..] == values[values.len() - keep..]
    }
}
