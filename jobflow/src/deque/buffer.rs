use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;

/// A fixed-size, power-of-two backing array for the work-stealing deque.
///
/// Slots are addressed by the deque's logical indices; the physical slot is
/// `index & mask`, so the buffer behaves as a ring. The buffer never drops
/// the values it holds: which slots are live is decided by the deque's
/// `top`/`bottom` indices, and the deque is responsible for dropping them.
pub(crate) struct Buffer<T> {
    /// Slot storage. Written only by the owner thread, read by any thread.
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,

    /// `capacity - 1`, used to map logical indices onto slots.
    mask: usize,
}

impl<T> Buffer<T> {
    /// Allocates a buffer with `capacity` uninitialized slots.
    ///
    /// Allocation failure is fatal: there is no way for a deque to degrade
    /// gracefully when it cannot grow, so the process is aborted.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of slots. Must be a power of two.
    pub(crate) fn alloc(capacity: usize) -> Box<Self> {
        debug_assert!(capacity.is_power_of_two());

        let mut slots = Vec::new();
        if let Err(err) = slots.try_reserve_exact(capacity) {
            super::fatal(format_args!(
                "failed to allocate deque buffer of {capacity} slots: {err}"
            ));
        }
        slots.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        Box::new(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
        })
    }

    /// Number of slots in the buffer.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Moves `value` into the slot for logical `index`.
    ///
    /// # Safety
    ///
    /// Only the owner thread may write, and the slot must not hold a live
    /// value (it would be leaked).
    #[inline]
    pub(crate) unsafe fn write(&self, index: usize, value: MaybeUninit<T>) {
        let slot = self.slots[index & self.mask].get();
        unsafe { ptr::write(slot, value) };
    }

    /// Reads the bits stored in the slot for logical `index`.
    ///
    /// The result is only a valid `T` if the caller has won ownership of
    /// the slot (via the deque's index protocol). A thief reads
    /// speculatively and discards the copy when it loses the race, which is
    /// why the value stays wrapped in `MaybeUninit` and is read volatile.
    ///
    /// # Safety
    ///
    /// The buffer must still be allocated. Retired buffers satisfy this for
    /// the whole lifetime of the deque.
    #[inline]
    pub(crate) unsafe fn read(&self, index: usize) -> MaybeUninit<T> {
        let slot = self.slots[index & self.mask].get();
        unsafe { ptr::read_volatile(slot) }
    }

    /// Copies the logical range `[top, bottom)` into `dst` at the same
    /// logical indices.
    ///
    /// # Safety
    ///
    /// Owner thread only. `dst` must be large enough to hold the range
    /// without wrapping onto itself.
    pub(crate) unsafe fn copy_into(&self, dst: &Buffer<T>, top: usize, bottom: usize) {
        debug_assert!(bottom - top <= dst.capacity());

        for index in top..bottom {
            unsafe { dst.write(index, self.read(index)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_and_wrapping() {
        let buffer = Buffer::<u32>::alloc(4);
        assert_eq!(buffer.capacity(), 4);

        unsafe {
            buffer.write(1, MaybeUninit::new(10));
            buffer.write(6, MaybeUninit::new(60));

            assert_eq!(buffer.read(1).assume_init(), 10);
            assert_eq!(buffer.read(5).assume_init(), 10);
            assert_eq!(buffer.read(2).assume_init(), 60);
        }
    }

    #[test]
    fn copy_preserves_logical_indices() {
        let small = Buffer::<u32>::alloc(4);
        let large = Buffer::<u32>::alloc(8);

        unsafe {
            for index in 5..8 {
                small.write(index, MaybeUninit::new(index as u32));
            }

            small.copy_into(&large, 5, 8);

            for index in 5..8 {
                assert_eq!(large.read(index).assume_init(), index as u32);
            }
        }
    }
}
