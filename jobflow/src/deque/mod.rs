//! Lock-free work-stealing deque.
//!
//! This is a Chase-Lev deque with the memory orderings of Lê et al.,
//! "Correct and Efficient Work-Stealing for Weak Memory Models" (PPoPP '13).
//!
//! The deque is split into two handles:
//! - [`WorkStealingDeque`]: the owner side. It pushes and pops at the
//!   *bottom* (LIFO). It is `Send` but not `Sync`, so only the thread
//!   currently holding it can push or pop.
//! - [`Stealer`]: the thief side. It steals from the *top* (FIFO) and may be
//!   cloned and shared freely between threads.
//!
//! None of the operations block. "No work" is reported as `None` and is
//! ordinary control flow.
//!
//! # Growth
//!
//! When a push finds the buffer full, the owner allocates a buffer twice as
//! large, copies the live range into it and publishes it. The old buffer is
//! *retired*, not freed: a thief may still be reading through a pointer it
//! loaded before the swap. Retired buffers live until the deque itself is
//! dropped. The deque never shrinks.

mod buffer;

use buffer::Buffer;

use crossbeam_utils::CachePadded;

use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering, fence};

/// Capacity used by [`WorkStealingDeque::new`].
pub const DEFAULT_CAPACITY: usize = 256;

/// Minimum capacity of a backing buffer.
const MIN_CAPACITY: usize = 2;

/// Logs a fatal contract violation and aborts the process.
#[cold]
#[inline(never)]
pub(crate) fn fatal(message: fmt::Arguments<'_>) -> ! {
    tracing::error!("work-stealing deque: {message}");
    std::process::abort()
}

/// State shared by the owner and every stealer.
struct Inner<T> {
    /// Index of the oldest item. Only ever incremented, by a CAS in `steal`
    /// or by `pop` when it races for the last item.
    top: CachePadded<AtomicUsize>,

    /// One past the newest item. Written only by the owner.
    bottom: CachePadded<AtomicUsize>,

    /// The current backing buffer. Replaced only by the owner.
    buffer: CachePadded<AtomicPtr<Buffer<T>>>,

    /// Buffers replaced by growth, kept alive until the deque is dropped.
    /// Touched only by the owner.
    retired: UnsafeCell<Vec<Box<Buffer<T>>>>,
}

// The owner/thief protocol below is what makes sharing sound; items only
// ever move between threads, they are never shared.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn len(&self) -> usize {
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Relaxed);
        bottom.saturating_sub(top)
    }

    fn steal(&self) -> Option<T> {
        let top = self.top.load(Ordering::Acquire);

        // `top` must be read before `bottom`: otherwise a pop could slip in
        // between the two loads and both sides would claim the last item.
        fence(Ordering::SeqCst);
        let bottom = self.bottom.load(Ordering::Acquire);

        if top >= bottom {
            return None;
        }

        // The buffer is loaded after `bottom`, never before: the push that
        // published `bottom` also published any buffer the item lives in.
        let buffer = self.buffer.load(Ordering::Acquire);
        let value = unsafe { (*buffer).read(top) };

        if self
            .top
            .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            // Lost to another thief or to the owner. `value` is a stale copy.
            return None;
        }

        Some(unsafe { value.assume_init() })
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let top = *self.top.get_mut();
        let bottom = *self.bottom.get_mut();
        let buffer = *self.buffer.get_mut();

        unsafe {
            for index in top..bottom {
                (*buffer).read(index).assume_init_drop();
            }

            drop(Box::from_raw(buffer));
        }
    }
}

/// The owner side of a work-stealing deque.
///
/// `push` and `pop` operate on the bottom of the deque in LIFO order. Only
/// the holder of this handle may call them; the handle can be moved to
/// another thread but not shared with one.
///
/// Use [`stealer`](Self::stealer) to hand out thief handles.
///
/// # Examples
///
/// ```
/// use jobflow::WorkStealingDeque;
///
/// let deque = WorkStealingDeque::new();
/// let stealer = deque.stealer();
///
/// deque.push(1);
/// deque.push(2);
/// deque.push(3);
///
/// assert_eq!(stealer.steal(), Some(1));
/// assert_eq!(deque.pop(), Some(3));
/// assert_eq!(deque.pop(), Some(2));
/// assert_eq!(deque.pop(), None);
/// ```
pub struct WorkStealingDeque<T> {
    inner: Arc<Inner<T>>,

    /// Keeps the owner handle `!Sync`.
    _owner: PhantomData<Cell<()>>,
}

impl<T> WorkStealingDeque<T> {
    /// Creates a deque with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a deque with at least `capacity` slots.
    ///
    /// The capacity is rounded up to the next power of two, with a minimum
    /// of 2. One slot is always kept free, so a buffer of capacity `n`
    /// holds up to `n - 1` items before it grows.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .unwrap_or_else(|| fatal(format_args!("capacity {capacity} is not representable")));

        let buffer = Box::into_raw(Buffer::alloc(capacity));

        Self {
            inner: Arc::new(Inner {
                top: CachePadded::new(AtomicUsize::new(0)),
                bottom: CachePadded::new(AtomicUsize::new(0)),
                buffer: CachePadded::new(AtomicPtr::new(buffer)),
                retired: UnsafeCell::new(Vec::new()),
            }),
            _owner: PhantomData,
        }
    }

    /// Creates a new thief handle for this deque.
    pub fn stealer(&self) -> Stealer<T> {
        Stealer {
            inner: self.inner.clone(),
        }
    }

    /// Pushes an item onto the bottom of the deque.
    ///
    /// Grows the backing buffer when it is full. Running out of index space
    /// or memory while growing aborts the process.
    pub fn push(&self, item: T) {
        let inner = &*self.inner;

        let bottom = inner.bottom.load(Ordering::Relaxed);
        let top = inner.top.load(Ordering::Acquire);
        let mut buffer = inner.buffer.load(Ordering::Relaxed);

        if bottom == usize::MAX {
            fatal(format_args!("index space exhausted"));
        }

        let capacity = unsafe { (*buffer).capacity() };
        if bottom - top >= capacity - 1 {
            buffer = unsafe { self.grow(top, bottom, capacity) };
        }

        unsafe { (*buffer).write(bottom, MaybeUninit::new(item)) };

        // Publishes the slot write to any thief that acquires `bottom`.
        inner.bottom.store(bottom + 1, Ordering::Release);
    }

    /// Pops the most recently pushed item.
    ///
    /// Returns `None` when the deque is empty, or when a thief won the race
    /// for the last item.
    pub fn pop(&self) -> Option<T> {
        let inner = &*self.inner;

        let bottom = inner.bottom.load(Ordering::Relaxed);

        // A stale `top` is never larger than the real one, so this early
        // exit is safe.
        if inner.top.load(Ordering::Relaxed) >= bottom {
            return None;
        }

        let new_bottom = bottom - 1;
        inner.bottom.store(new_bottom, Ordering::Relaxed);

        // StoreLoad: thieves must see the decrement before we read `top`.
        fence(Ordering::SeqCst);
        let top = inner.top.load(Ordering::Relaxed);

        if top > new_bottom {
            // Emptied by thieves in the meantime.
            inner.bottom.store(bottom, Ordering::Relaxed);
            return None;
        }

        let buffer = inner.buffer.load(Ordering::Relaxed);

        if top < new_bottom {
            return Some(unsafe { (*buffer).read(new_bottom).assume_init() });
        }

        // Last item: race the thieves for it on `top`.
        let won = inner
            .top
            .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();

        // Either way `top == bottom` again.
        inner.bottom.store(bottom, Ordering::Relaxed);

        if won {
            Some(unsafe { (*buffer).read(new_bottom).assume_init() })
        } else {
            None
        }
    }

    /// Steals the oldest item, exactly as a [`Stealer`] would.
    pub fn steal(&self) -> Option<T> {
        self.inner.steal()
    }

    /// Returns `true` if the deque looked empty at the time of the call.
    ///
    /// This is a heuristic under concurrency and must not be used for
    /// correctness decisions.
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Returns the number of items the deque held at the time of the call.
    ///
    /// Like [`is_empty`](Self::is_empty), this is only a snapshot.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns the capacity of the current backing buffer.
    pub fn capacity(&self) -> usize {
        unsafe { (*self.inner.buffer.load(Ordering::Relaxed)).capacity() }
    }

    /// Replaces the buffer with one twice as large and returns it.
    ///
    /// # Safety
    ///
    /// Owner only. `[top, bottom)` must be the live range as seen by `push`.
    #[cold]
    unsafe fn grow(&self, top: usize, bottom: usize, capacity: usize) -> *mut Buffer<T> {
        let inner = &*self.inner;

        let new_capacity = capacity
            .checked_mul(2)
            .unwrap_or_else(|| fatal(format_args!("cannot grow beyond {capacity} slots")));

        let old = inner.buffer.load(Ordering::Relaxed);
        let new = Box::into_raw(Buffer::alloc(new_capacity));

        unsafe {
            (*old).copy_into(&*new, top, bottom);
            (*inner.retired.get()).push(Box::from_raw(old));
        }

        inner.buffer.store(new, Ordering::Release);

        tracing::trace!(from = capacity, to = new_capacity, "work-stealing deque grew");

        new
    }
}

impl<T> Default for WorkStealingDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WorkStealingDeque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkStealingDeque")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// The thief side of a work-stealing deque.
///
/// Steals take the oldest item (FIFO relative to the owner's pushes). A
/// steal that loses a race reports `None`, like an empty deque.
pub struct Stealer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Stealer<T> {
    /// Steals the oldest item from the deque.
    pub fn steal(&self) -> Option<T> {
        self.inner.steal()
    }

    /// Returns `true` if the deque looked empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Returns the number of items the deque held at the time of the call.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> Clone for Stealer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Stealer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stealer").field("len", &self.len()).finish()
    }
}
