//! Capacity normalization and slot storage allocation.
use crate::error::Error;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

/// Capacity used when none is specified.
pub const DEFAULT_CAPACITY: usize = 4096;

/// A single storage slot. Contents are only initialized once the producer has written to it.
pub(crate) type Slot<T> = UnsafeCell<MaybeUninit<T>>;

/// Round a requested capacity up to the next power of two.
///
/// Powers of two are returned unchanged. Zero is rejected, since a buffer without any slots cannot even hold its
/// sacrificed slot.
pub fn normalize(requested: usize) -> Result<usize, Error> {
    if requested == 0 {
        return Err(Error::ZeroCapacity);
    }

    if requested.is_power_of_two() {
        return Ok(requested);
    }

    requested
        .checked_next_power_of_two()
        .ok_or(Error::CapacityOverflow { requested })
}

/// Allocate `len` uninitialized slots.
///
/// This is the only allocation a buffer ever makes.
pub(crate) fn allocate<T>(len: usize) -> Box<[Slot<T>]> {
    (0..len)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect()
}
