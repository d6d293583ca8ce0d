//! Single-producer/single-consumer bounded ring buffer.
//!
//! Two monotonic counters (`produced`, `consumed`) track occupancy;
//! `occupancy = produced − consumed` and the slot index is the counter
//! modulo capacity (implemented as a mask, so capacity is required to be
//! a power of two). Payload writes happen-before the counter increment
//! that publishes them: the producer issues a release fence before
//! bumping `produced`, the consumer an acquire load when reading it, and
//! symmetrically for `consumed`.
//!
//! Unlike the generic multi-pattern disruptor this crate is descended
//! from, this ring exposes only the blocking `get_slot`/`commit`/`push`/
//! `pop` API a single dedicated producer and consumer thread need —
//! there is no wait-strategy pluggability or batch-claim API here; a
//! full buffer is not an error, the producer cooperatively yields and
//! logs once.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{AcqError, Result};

/// Slots stored in a [`RingBuffer`] must be plain, fixed-size, `Copy`
/// data — no owned heap allocations — since the ring overwrites and
/// duplicates slot memory by raw volatile read/write rather than by
/// move or clone.
pub trait RingSlot: Copy + Default + Send + 'static {}
impl<T: Copy + Default + Send + 'static> RingSlot for T {}

/// Resolve a configured `buffer_capacity` to a valid ring capacity: a
/// power of two passes through unchanged, anything else is rounded up
/// to the next power of two, and zero falls back to the crate default.
pub fn round_up_capacity(requested: usize) -> usize {
    if requested == 0 {
        return crate::constants::DEFAULT_RING_BUFFER_CAPACITY;
    }
    requested.next_power_of_two()
}

pub struct RingBuffer<T: RingSlot> {
    buffer: *mut T,
    capacity: usize,
    mask: usize,
    produced: AtomicU64,
    consumed: AtomicU64,
    _heap: Option<Box<[T]>>,
    is_mapped: bool,
}

impl<T: RingSlot> RingBuffer<T> {
    /// Create a heap-backed ring buffer. `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Result<Self> {
        if !capacity.is_power_of_two() || capacity == 0 {
            return Err(AcqError::config("ring buffer capacity must be a nonzero power of 2"));
        }

        let heap: Box<[T]> = (0..capacity).map(|_| T::default()).collect::<Vec<_>>().into_boxed_slice();
        let ptr = heap.as_ptr() as *mut T;

        Ok(Self {
            buffer: ptr,
            capacity,
            mask: capacity - 1,
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            _heap: Some(heap),
            is_mapped: false,
        })
    }

    /// Create an mmap+mlock-backed ring buffer: avoids page faults in the
    /// hot path and keeps the slab resident. Used for the acquisition
    /// ring, which is the one under real-time scheduling pressure.
    pub fn new_locked(capacity: usize) -> Result<Self> {
        if !capacity.is_power_of_two() || capacity == 0 {
            return Err(AcqError::config("ring buffer capacity must be a nonzero power of 2"));
        }

        let bytes = capacity * std::mem::size_of::<T>();
        let ptr = unsafe {
            let p = libc::mmap(
                ptr::null_mut(),
                bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if p == libc::MAP_FAILED {
                return Err(AcqError::system_resource("mmap failed for ring buffer slab"));
            }
            let _ = libc::mlock(p, bytes);
            ptr::write_bytes(p as *mut u8, 0, bytes);
            p as *mut T
        };

        Ok(Self {
            buffer: ptr,
            capacity,
            mask: capacity - 1,
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            _heap: None,
            is_mapped: true,
        })
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Racy occupancy observation. The producer may treat
    /// `capacity - occupancy()` as a lower bound on free space; the
    /// consumer may treat `occupancy()` itself as a lower bound.
    #[inline(always)]
    pub fn occupancy(&self) -> usize {
        let produced = self.produced.load(Ordering::Relaxed);
        let consumed = self.consumed.load(Ordering::Relaxed);
        produced.wrapping_sub(consumed) as usize
    }

    /// Block (cooperatively yielding) until a producer slot is free,
    /// then return a stable mutable reference to it. No visible mutation
    /// of `produced` happens until [`RingBuffer::commit`]. Returns `None`
    /// if `shutdown` becomes true while waiting, in which case the
    /// caller must not call `commit`.
    #[inline(always)]
    pub fn get_slot(&self, shutdown: &AtomicBool) -> Option<&mut T> {
        let mut warned = false;
        loop {
            let produced = self.produced.load(Ordering::Relaxed);
            let consumed = self.consumed.load(Ordering::Acquire);
            let occupancy = produced.wrapping_sub(consumed);

            if occupancy < self.capacity as u64 {
                let idx = (produced as usize) & self.mask;
                return Some(unsafe { &mut *self.buffer.add(idx) });
            }

            if shutdown.load(Ordering::Relaxed) {
                return None;
            }
            if !warned {
                tracing::warn!("ring buffer full, producer stalled");
                warned = true;
            }
            std::thread::yield_now();
        }
    }

    /// Publish the slot returned by the last [`RingBuffer::get_slot`]
    /// call: release fence, then `produced += 1`.
    #[inline(always)]
    pub fn commit(&self) {
        std::sync::atomic::fence(Ordering::Release);
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    /// `get_slot` + copy + `commit`. Returns `false` if shutdown was
    /// observed before a slot became available.
    #[inline(always)]
    pub fn push(&self, value: T, shutdown: &AtomicBool) -> bool {
        match self.get_slot(shutdown) {
            Some(slot) => {
                *slot = value;
                self.commit();
                true
            }
            None => false,
        }
    }

    /// Block (cooperatively yielding) until a consumer slot is available,
    /// copy it out, then release fence + `consumed += 1`. Returns `None`
    /// if `shutdown` becomes true while waiting and the buffer never
    /// became non-empty.
    #[inline(always)]
    pub fn pop(&self, shutdown: &AtomicBool) -> Option<T> {
        let mut warned = false;
        loop {
            let produced = self.produced.load(Ordering::Acquire);
            let consumed = self.consumed.load(Ordering::Relaxed);

            if produced != consumed {
                let idx = (consumed as usize) & self.mask;
                let value = unsafe { ptr::read_volatile(self.buffer.add(idx)) };
                std::sync::atomic::fence(Ordering::Release);
                self.consumed.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }

            if shutdown.load(Ordering::Relaxed) {
                return None;
            }
            if !warned {
                tracing::debug!("ring buffer empty, consumer waiting");
                warned = true;
            }
            std::thread::yield_now();
        }
    }

    /// Non-blocking pop used by the writer's drain loop, which polls
    /// both rings rather than committing to either one.
    #[inline(always)]
    pub fn try_pop(&self) -> Option<T> {
        let produced = self.produced.load(Ordering::Acquire);
        let consumed = self.consumed.load(Ordering::Relaxed);
        if produced == consumed {
            return None;
        }
        let idx = (consumed as usize) & self.mask;
        let value = unsafe { ptr::read_volatile(self.buffer.add(idx)) };
        std::sync::atomic::fence(Ordering::Release);
        self.consumed.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Free the buffer and report residual occupancy so the caller can
    /// log loss. The `Drop` impl below performs the actual munmap; this
    /// method just surfaces the count before the buffer goes out of scope.
    pub fn destroy(self: Arc<Self>) -> usize {
        self.occupancy()
    }
}

impl<T: RingSlot> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        if self.is_mapped && !self.buffer.is_null() {
            let bytes = self.capacity * std::mem::size_of::<T>();
            unsafe {
                libc::munmap(self.buffer as *mut libc::c_void, bytes);
            }
        }
    }
}

unsafe impl<T: RingSlot> Send for RingBuffer<T> {}
unsafe impl<T: RingSlot> Sync for RingBuffer<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Default, PartialEq, Debug)]
    struct Slot {
        value: u64,
    }

    #[test]
    fn test_heap_allocation() {
        let ring = RingBuffer::<Slot>::new(8).unwrap();
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.occupancy(), 0);
    }

    #[test]
    fn test_locked_allocation() {
        let ring = RingBuffer::<Slot>::new_locked(8).unwrap();
        assert_eq!(ring.capacity(), 8);
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(RingBuffer::<Slot>::new(0).is_err());
        assert!(RingBuffer::<Slot>::new(7).is_err());
    }

    #[test]
    fn test_push_pop_round_trip_order() {
        let ring = RingBuffer::<Slot>::new(4).unwrap();
        let shutdown = AtomicBool::new(false);

        for i in 0..3u64 {
            assert!(ring.push(Slot { value: i }, &shutdown));
        }
        assert_eq!(ring.occupancy(), 3);

        for i in 0..3u64 {
            assert_eq!(ring.pop(&shutdown), Some(Slot { value: i }));
        }
        assert_eq!(ring.occupancy(), 0);
    }

    #[test]
    fn test_occupancy_bounds_never_exceed_capacity() {
        let ring = RingBuffer::<Slot>::new(4).unwrap();
        let shutdown = AtomicBool::new(false);

        for i in 0..4u64 {
            assert!(ring.push(Slot { value: i }, &shutdown));
        }
        assert_eq!(ring.occupancy(), ring.capacity());

        // Ring is now full; get_slot must block until shutdown is signaled
        // rather than silently overwrite an uncommitted slot.
        shutdown.store(true, Ordering::Relaxed);
        assert!(ring.get_slot(&shutdown).is_none());
    }

    #[test]
    fn test_pop_returns_none_on_shutdown_while_empty() {
        let ring = RingBuffer::<Slot>::new(4).unwrap();
        let shutdown = AtomicBool::new(true);
        assert_eq!(ring.pop(&shutdown), None);
    }

    #[test]
    fn test_round_up_capacity() {
        assert_eq!(round_up_capacity(128), 128);
        assert_eq!(round_up_capacity(100), 128);
        assert_eq!(round_up_capacity(0), crate::constants::DEFAULT_RING_BUFFER_CAPACITY);
    }

    #[test]
    fn test_try_pop_is_non_blocking() {
        let ring = RingBuffer::<Slot>::new(4).unwrap();
        assert_eq!(ring.try_pop(), None);
        let shutdown = AtomicBool::new(false);
        ring.push(Slot { value: 9 }, &shutdown);
        assert_eq!(ring.try_pop(), Some(Slot { value: 9 }));
        assert_eq!(ring.try_pop(), None);
    }
}
