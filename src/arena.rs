//! Arena bootstrap: one-time alignment of the program break and bulk
//! reservation of [`ARENA_SIZE`](crate::ARENA_SIZE) bytes, partitioned
//! into [`INITIAL_BLOCKS`](crate::INITIAL_BLOCKS) top-order blocks.

use crate::header::BlockHeader;
use crate::{ConstructionError, ARENA_ALIGNMENT, ARENA_SIZE, INITIAL_BLOCKS, TOP_ORDER_FOOTPRINT};
use std::ptr::NonNull;

/// Advances the program break with `sbrk`, returning the address it
/// used to sit at, or the OS error if the break could not be moved.
unsafe fn sbrk(increment: isize) -> Result<*mut u8, std::io::Error> {
    let prev = libc::sbrk(increment);
    if prev == usize::MAX as *mut libc::c_void {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(prev as *mut u8)
    }
}

/// Aligns the program break up to the next [`ARENA_ALIGNMENT`]
/// boundary, then reserves [`ARENA_SIZE`] bytes and threads them into
/// [`INITIAL_BLOCKS`] top-order headers.
///
/// Returns the arena base and the head of the address-ordered list
/// threading the whole arena.
pub(crate) fn bootstrap(
    cookie: u64,
) -> Result<(NonNull<u8>, Option<NonNull<BlockHeader>>), ConstructionError> {
    // SAFETY: `sbrk(0)` only queries the current break.
    let current = unsafe { sbrk(0) }.map_err(ConstructionError::BreakQuery)?;
    let misalignment = (current as usize) % ARENA_ALIGNMENT;
    let padding = if misalignment == 0 {
        0
    } else {
        ARENA_ALIGNMENT - misalignment
    };

    // SAFETY: growing the break by a validated, bounded offset.
    unsafe { sbrk(padding as isize) }.map_err(ConstructionError::BreakAlign)?;

    // SAFETY: `ARENA_SIZE` fits in an `isize` on any 64-bit target,
    // which this crate requires (see the compile-time assertion below).
    let base = unsafe { sbrk(ARENA_SIZE as isize) }.map_err(ConstructionError::ArenaReserve)?;
    let base = NonNull::new(base).ok_or(ConstructionError::NullArena)?;

    debug_assert_eq!(base.as_ptr() as usize % ARENA_ALIGNMENT, 0);

    let mut head: Option<NonNull<BlockHeader>> = None;
    let mut prev: Option<NonNull<BlockHeader>> = None;
    let mut offset = 0usize;

    for _ in 0..INITIAL_BLOCKS {
        // SAFETY: `offset` stays within the just-reserved `ARENA_SIZE`
        // range, which is exclusively owned by this allocator.
        let at = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) };
        let payload_size = TOP_ORDER_FOOTPRINT - crate::header::HEADER_SIZE;

        // SAFETY: `at` points `payload_size + HEADER_SIZE` bytes inside
        // the reserved arena, freshly mapped and unused.
        let block = unsafe { BlockHeader::write_new(at, payload_size, cookie, prev, None) };

        if let Some(mut prev) = prev {
            // SAFETY: `prev` was written by the previous loop iteration.
            unsafe { prev.as_mut().addr_next = Some(block) };
        } else {
            head = Some(block);
        }

        prev = Some(block);
        offset += TOP_ORDER_FOOTPRINT;
    }

    Ok((base, head))
}

const _: () = assert!(
    usize::BITS == 64,
    "burrow requires a 64-bit target to reserve the arena via a single sbrk call"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_partitions_the_arena_into_initial_blocks() {
        let _guard = crate::TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let (base, head) = bootstrap(0x1234_5678).expect("arena bootstrap");
        assert_eq!(base.as_ptr() as usize % ARENA_ALIGNMENT, 0);

        let mut count = 0;
        let mut cursor = head;
        let mut prev_addr: Option<usize> = None;
        while let Some(node) = cursor {
            // SAFETY: every node here was just written by `bootstrap`.
            let node_ref = unsafe { node.as_ref() };
            assert!(node_ref.is_free);
            assert_eq!(node_ref.cookie, 0x1234_5678);
            assert_eq!(node_ref.footprint(), TOP_ORDER_FOOTPRINT);
            if let Some(prev) = prev_addr {
                assert_eq!(node.as_ptr() as usize, prev + TOP_ORDER_FOOTPRINT);
            }
            prev_addr = Some(node.as_ptr() as usize);
            count += 1;
            cursor = node_ref.addr_next;
        }
        assert_eq!(count, INITIAL_BLOCKS);
    }
}
