//! Introspection shared by both halves of a buffer.

/// Base trait that both the producing and consuming half of a buffer implement.
///
/// Every value is a snapshot: by the time it is returned, the other half may already have moved its cursor.
pub trait Buffer {
    /// Returns the number of elements in the buffer.
    fn len(&self) -> usize;

    /// Returns the capacity of the buffer. This is always a power of two.
    ///
    /// One slot is always kept free, so at most `capacity() - 1` elements can be stored at once.
    fn capacity(&self) -> usize;

    /// Returns `true` if the buffer is empty.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a plain enqueue would be rejected.
    #[inline]
    fn is_full(&self) -> bool {
        self.len() == self.capacity() - 1
    }

    /// Returns the fraction of the capacity currently in use.
    ///
    /// Since one slot is always free, this never reaches `1.0`.
    #[inline]
    fn usage_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }
}
