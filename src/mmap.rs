//! The mmap side-channel for oversized requests.
//!
//! Mmap blocks never enter the order table and never coalesce; they
//! live on their own address-ordered list, independent of the arena.

use crate::header::{BlockHeader, HEADER_SIZE};
use crate::{Allocator, ConstructionError, ReleaseError};
use std::ptr::NonNull;

/// Address-ordered list of live mmap blocks. The tail is cached per
/// the design note in §9 of the spec: appends are O(1) instead of
/// walking the whole list on every large allocation.
pub(crate) struct MmapList {
    head: Option<NonNull<BlockHeader>>,
    tail: Option<NonNull<BlockHeader>>,
}

impl MmapList {
    pub(crate) fn new() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    /// Appends `block` to the tail of the list.
    pub(crate) fn push_back(&mut self, mut block: NonNull<BlockHeader>) {
        // SAFETY: `block` is a freshly mapped header owned by this list.
        unsafe {
            block.as_mut().addr_prev = self.tail;
            block.as_mut().addr_next = None;
        }

        match self.tail {
            Some(mut tail) => unsafe { tail.as_mut().addr_next = Some(block) },
            None => self.head = Some(block),
        }
        self.tail = Some(block);
    }

    /// Unlinks `block` from the list, handling head/tail/middle cases.
    pub(crate) fn unlink(&mut self, block: NonNull<BlockHeader>) {
        // SAFETY: `block` is currently linked into this list.
        unsafe {
            let prev = block.as_ref().addr_prev;
            let next = block.as_ref().addr_next;

            match prev {
                Some(mut prev) => prev.as_mut().addr_next = next,
                None => self.head = next,
            }
            match next {
                Some(mut next) => next.as_mut().addr_prev = prev,
                None => self.tail = prev,
            }
        }
    }
}

/// Requests a private anonymous mapping of `size + HEADER_SIZE` bytes
/// and initializes a header for it. The returned block is not yet
/// linked into any list; the caller does that.
pub(crate) fn map_block(
    size: usize,
    cookie: u64,
) -> Result<NonNull<BlockHeader>, ConstructionError> {
    let total = size + HEADER_SIZE;
    // SAFETY: standard anonymous-mapping request; the returned pointer
    // is owned exclusively by the caller once this call returns `Ok`.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            total,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if addr == libc::MAP_FAILED {
        return Err(ConstructionError::MmapAlloc(std::io::Error::last_os_error()));
    }

    // SAFETY: `mmap` succeeded, so `addr` is valid for `total` bytes
    // and not null.
    let at = unsafe { NonNull::new_unchecked(addr as *mut u8) };
    let mut header = unsafe { BlockHeader::write_new(at, size, cookie, None, None) };
    // SAFETY: we just wrote this header and hold the only reference.
    unsafe { header.as_mut().is_free = false };

    Ok(header)
}

/// Unmaps the full `size + HEADER_SIZE` range backing `block`.
///
/// # Safety
/// `block` must already be unlinked from [`MmapList`]: once this
/// returns `Ok`, the memory is gone.
pub(crate) unsafe fn unmap_block(block: NonNull<BlockHeader>) -> Result<(), ReleaseError> {
    let total = block.as_ref().size + HEADER_SIZE;
    let rc = libc::munmap(block.as_ptr() as *mut libc::c_void, total);
    if rc != 0 {
        return Err(ReleaseError::Munmap(std::io::Error::last_os_error()));
    }
    Ok(())
}

impl Allocator {
    /// Runs the mmap allocation path for a request of `size` bytes
    /// (already known to be at or above `MMAP_THRESHOLD`).
    pub(crate) fn alloc_mmap(&mut self, size: usize) -> Result<NonNull<u8>, ConstructionError> {
        let block = map_block(size, self.cookie)?;
        self.mmap_list.push_back(block);

        self.blocks_num += 1;
        self.total_allocated_bytes += size;

        log::info!(
            "burrow: mmap alloc of {} bytes at {:p}",
            size,
            block.as_ptr()
        );

        Ok(BlockHeader::payload_of(block))
    }

    /// Releases an mmap-path block: unlinks it from the mmap list and
    /// unmaps its backing memory.
    ///
    /// # Safety
    /// `block` must be a live mmap block owned by this allocator.
    pub(crate) unsafe fn release_mmap(
        &mut self,
        block: NonNull<BlockHeader>,
    ) -> Result<(), ReleaseError> {
        self.mmap_list.unlink(block);
        let size = block.as_ref().size;

        unmap_block(block)?;

        self.blocks_num -= 1;
        self.total_allocated_bytes -= size;

        log::info!("burrow: mmap release of {} bytes at {:p}", size, block.as_ptr());

        Ok(())
    }
}
