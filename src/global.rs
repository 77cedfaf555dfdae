//! An opt-in adapter that lets [`Allocator`](crate::Allocator) back
//! `#[global_allocator]`.
//!
//! `Allocator` itself is not `Sync` — its lists are raw-pointer
//! intrusive structures with no internal synchronization, matching
//! the single-threaded design in §5 of the spec. `GlobalHeap` wraps
//! one in a `spin::Mutex` purely so the `GlobalAlloc` trait's `Sync`
//! bound is satisfied; it serializes access rather than redesigning
//! the split/merge engine for concurrent throughput.

use crate::{Allocator, ConstructionError};
use spin::Mutex;
use std::alloc::{GlobalAlloc, Layout};
use std::ptr;

/// Wraps an [`Allocator`] behind a spinlock so it can be installed as
/// `#[global_allocator]`.
///
/// This type cannot satisfy arbitrary alignment requests: the
/// underlying allocator places payloads right after a fixed-size
/// header, so only alignments up to the header's own alignment are
/// honored. Requests for a stricter alignment fail (`alloc` returns
/// null), matching the realignment non-goal in §1.
pub struct GlobalHeap(Mutex<Option<Allocator>>);

impl GlobalHeap {
    /// Creates an uninitialized `GlobalHeap`. The wrapped allocator is
    /// built lazily on first use, so construction failure (an
    /// exhausted or misbehaving program break) surfaces as an
    /// allocation failure rather than a panic at program startup.
    pub const fn new() -> Self {
        Self(Mutex::new(None))
    }

    fn with_allocator<R>(&self, f: impl FnOnce(&mut Allocator) -> R) -> Option<R> {
        let mut guard = self.0.lock();
        if guard.is_none() {
            match Allocator::new() {
                Ok(allocator) => *guard = Some(allocator),
                Err(err) => {
                    log::error!("burrow: global heap construction failed: {err}");
                    return None;
                }
            }
        }
        Some(f(guard.as_mut().expect("just initialized above")))
    }

    /// Tries to build the wrapped allocator eagerly, surfacing
    /// construction failure instead of deferring it to the first
    /// allocation.
    pub fn try_init(&self) -> Result<(), ConstructionError> {
        let mut guard = self.0.lock();
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(Allocator::new()?);
        Ok(())
    }
}

impl Default for GlobalHeap {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for GlobalHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > crate::header::HEADER_ALIGN {
            return ptr::null_mut();
        }
        self.with_allocator(|alloc| alloc.alloc(layout.size()))
            .unwrap_or(ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.with_allocator(|alloc| {
            // A cookie mismatch here aborts the process, matching
            // `Allocator::free`'s documented corruption response; a
            // genuine mmap-unmap failure is logged rather than
            // propagated, since `GlobalAlloc::dealloc` has no error
            // channel.
            if let Err(err) = unsafe { alloc.free(ptr) } {
                log::error!("burrow: global heap release failed: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_dealloc_round_trip() {
        let _guard = crate::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let heap = GlobalHeap::new();
        let layout = Layout::from_size_align(128, 8).unwrap();

        // SAFETY: `layout` is well-formed and `ptr` is deallocated with
        // the same layout it was allocated with.
        unsafe {
            let ptr = heap.alloc(layout);
            assert!(!ptr.is_null());
            heap.dealloc(ptr, layout);
        }
    }

    #[test]
    fn rejects_alignment_stricter_than_the_header() {
        let _guard = crate::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let heap = GlobalHeap::new();
        let layout = Layout::from_size_align(128, crate::header::HEADER_ALIGN * 2).unwrap();

        // SAFETY: `alloc` is sound to call regardless of outcome; a
        // null return means no memory was handed out.
        unsafe {
            assert!(heap.alloc(layout).is_null());
        }
    }
}
