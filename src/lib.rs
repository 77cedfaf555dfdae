//! A buddy-allocation memory allocator.
//!
//! Small and medium requests are served out of a single arena reserved
//! from the program break at construction time and split/merged in
//! powers of two. Requests at or above [`MMAP_THRESHOLD`] bypass the
//! arena entirely and go straight to an anonymous `mmap`.
//!
//! The allocator is not thread-safe: [`Allocator`] owns its state
//! directly and every method that mutates it takes `&mut self`. See
//! [`global`] for a lock-wrapped adapter suitable for
//! `#[global_allocator]`.

#![deny(rust_2018_idioms)]

mod arena;
mod buddy;
mod error;
mod header;
pub mod global;
#[cfg(feature = "logging")]
mod logging;
mod mmap;
mod order_table;

use header::{BlockHeader, HEADER_SIZE};
use order_table::OrderTable;
use std::ptr::NonNull;

pub use error::{ConstructionError, ReleaseError, CORRUPTION_EXIT_CODE};
#[cfg(feature = "logging")]
pub use logging::init_logging;

/// Size (including header) of the smallest buddy block, order 0.
pub const MIN_BLOCK_SIZE: usize = 128 * 1024;

/// Number of buddy orders. Order *k* has footprint
/// `MIN_BLOCK_SIZE << k`.
pub const MAX_ORDER: usize = 11;

/// Number of top-order blocks reserved when the arena is built.
pub const INITIAL_BLOCKS: usize = 32;

/// Footprint of a top-order (order `MAX_ORDER - 1`) block.
pub const TOP_ORDER_FOOTPRINT: usize = MIN_BLOCK_SIZE << (MAX_ORDER - 1);

/// Total size of the pre-allocated arena.
pub const ARENA_SIZE: usize = INITIAL_BLOCKS * TOP_ORDER_FOOTPRINT;

/// Required alignment of the arena base, so that XOR-buddy math holds.
pub const ARENA_ALIGNMENT: usize = ARENA_SIZE;

/// Requests at or above this size bypass the buddy path and go
/// straight to `mmap`. This happens to equal [`TOP_ORDER_FOOTPRINT`]:
/// a payload that large could never fit a buddy block, since the
/// footprint (payload + header) would then exceed the top order.
pub const MMAP_THRESHOLD: usize = TOP_ORDER_FOOTPRINT;

/// Hard upper bound on a single request.
pub const MAX_REQUEST: usize = 100_000_000;

/// The allocator instance: one arena, one mmap side-list, one order
/// table, one cookie.
///
/// Construction reserves [`ARENA_SIZE`] bytes from the program break,
/// so creating more than one `Allocator` in the same process will
/// exhaust address space quickly; most programs want exactly one.
pub struct Allocator {
    arena_base: NonNull<u8>,
    blocks_list: Option<NonNull<BlockHeader>>,
    mmap_list: mmap::MmapList,
    order_table: OrderTable,
    cookie: u64,
    blocks_num: usize,
    free_blocks_num: usize,
    free_bytes_num: usize,
    total_allocated_bytes: usize,
}

// The allocator's internal lists are raw-pointer intrusive structures
// with no synchronization; per §5 of the design this type is
// deliberately not `Send`/`Sync`. `global::GlobalHeap` is the opt-in
// wrapper for callers that need a `Sync` global allocator.

impl Allocator {
    /// Builds a fresh allocator: aligns the program break, reserves the
    /// arena, and partitions it into [`INITIAL_BLOCKS`] top-order free
    /// blocks.
    pub fn new() -> Result<Self, ConstructionError> {
        let cookie: u64 = rand::random();
        let (arena_base, blocks_list) = arena::bootstrap(cookie)?;

        let mut order_table = OrderTable::new();
        let mut free_blocks_num = 0;
        let mut cursor = blocks_list;
        while let Some(block) = cursor {
            // SAFETY: every node on `blocks_list` was just initialized
            // by `arena::bootstrap` and is still live.
            let next = unsafe { block.as_ref().addr_next };
            order_table.insert(MAX_ORDER - 1, block);
            free_blocks_num += 1;
            cursor = next;
        }

        log::info!(
            "burrow: arena constructed at {:p}, {} bytes, {} top-order blocks",
            arena_base.as_ptr(),
            ARENA_SIZE,
            INITIAL_BLOCKS,
        );

        Ok(Self {
            arena_base,
            blocks_list,
            mmap_list: mmap::MmapList::new(),
            order_table,
            cookie,
            blocks_num: INITIAL_BLOCKS,
            free_blocks_num,
            free_bytes_num: INITIAL_BLOCKS * (TOP_ORDER_FOOTPRINT - HEADER_SIZE),
            total_allocated_bytes: INITIAL_BLOCKS * (TOP_ORDER_FOOTPRINT - HEADER_SIZE),
        })
    }

    /// Allocates a block able to hold at least `size` bytes. Returns a
    /// null pointer on rejection (`size` is zero or exceeds
    /// [`MAX_REQUEST`]) or on buddy exhaustion.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 || size > MAX_REQUEST {
            return std::ptr::null_mut();
        }

        if size >= MMAP_THRESHOLD {
            return match self.alloc_mmap(size) {
                Ok(ptr) => ptr.as_ptr(),
                Err(_) => std::ptr::null_mut(),
            };
        }

        self.alloc_buddy(size)
            .map(|ptr| ptr.as_ptr())
            .unwrap_or(std::ptr::null_mut())
    }

    /// Releases a block previously returned by [`Allocator::alloc`].
    /// A null pointer is a no-op; freeing an already-free block is a
    /// silent no-op (double-free tolerance). A cookie mismatch aborts
    /// the process immediately: see [`error`] module docs.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer previously returned by this same
    /// `Allocator`'s `alloc`, not yet freed (other than the tolerated
    /// double-free case above).
    pub unsafe fn free(&mut self, ptr: *mut u8) -> Result<(), ReleaseError> {
        let Some(payload) = NonNull::new(ptr) else {
            return Ok(());
        };

        let header = BlockHeader::header_of(payload);
        let header_ref = header.as_ref();

        if header_ref.cookie != self.cookie {
            log::error!(
                "burrow: cookie mismatch at {:p}, header corrupted, aborting",
                header.as_ptr()
            );
            std::process::exit(error::CORRUPTION_EXIT_CODE);
        }

        if header_ref.is_free {
            return Ok(());
        }

        if header_ref.size >= MMAP_THRESHOLD {
            self.release_mmap(header)
        } else {
            self.release_buddy(header);
            Ok(())
        }
    }

    /// Number of blocks (buddy + mmap) currently free.
    pub fn num_free_blocks(&self) -> usize {
        self.free_blocks_num
    }

    /// Number of payload bytes currently free (buddy blocks only).
    pub fn num_free_bytes(&self) -> usize {
        self.free_bytes_num
    }

    /// Number of blocks (buddy + mmap) currently live, free or not.
    pub fn num_allocated_blocks(&self) -> usize {
        self.blocks_num
    }

    /// Number of payload bytes currently tracked (buddy + mmap), free
    /// or not.
    pub fn num_allocated_bytes(&self) -> usize {
        self.total_allocated_bytes
    }

    /// `size_meta_data() * num_allocated_blocks()`.
    pub fn num_meta_data_bytes(&self) -> usize {
        HEADER_SIZE * self.blocks_num
    }

    /// Size, in bytes, of a single block header.
    pub fn size_meta_data(&self) -> usize {
        HEADER_SIZE
    }
}

/// Guards every test below that touches the program break: each
/// `Allocator::new()` call reserves a fresh `ARENA_SIZE` range via
/// `sbrk`, which is process-wide state. Running those tests
/// concurrently would race on the same break.
#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (std::sync::MutexGuard<'static, ()>, Allocator) {
        let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let alloc = Allocator::new().expect("arena construction");
        (guard, alloc)
    }

    #[test]
    fn rejects_zero_and_oversized_requests() {
        let (_guard, mut alloc) = fresh();
        assert!(alloc.alloc(0).is_null());
        assert!(alloc.alloc(MAX_REQUEST + 1).is_null());
        assert_eq!(alloc.num_allocated_blocks(), INITIAL_BLOCKS);
        assert_eq!(alloc.num_free_blocks(), INITIAL_BLOCKS);
    }

    #[test]
    fn small_allocation_splits_to_order_zero_and_merges_back() {
        let (_guard, mut alloc) = fresh();
        assert_eq!(alloc.num_free_blocks(), INITIAL_BLOCKS);

        let ptr = alloc.alloc(100);
        assert!(!ptr.is_null());
        assert_eq!(alloc.num_allocated_blocks(), INITIAL_BLOCKS + 10);
        assert_eq!(alloc.num_free_blocks(), INITIAL_BLOCKS - 1 + 10);

        // SAFETY: `ptr` was just returned by `alloc` and not yet freed.
        unsafe { alloc.free(ptr).unwrap() };
        assert_eq!(alloc.num_allocated_blocks(), INITIAL_BLOCKS);
        assert_eq!(alloc.num_free_blocks(), INITIAL_BLOCKS);
    }

    #[test]
    fn mmap_path_allocation_and_release() {
        let (_guard, mut alloc) = fresh();
        let bytes_before = alloc.num_allocated_bytes();

        let ptr = alloc.alloc(200_000);
        assert!(!ptr.is_null());
        assert_eq!(alloc.num_allocated_blocks(), INITIAL_BLOCKS + 1);
        assert_eq!(alloc.num_free_blocks(), INITIAL_BLOCKS);
        assert_eq!(alloc.num_allocated_bytes(), bytes_before + 200_000);

        // SAFETY: see above.
        unsafe { alloc.free(ptr).unwrap() };
        assert_eq!(alloc.num_allocated_blocks(), INITIAL_BLOCKS);
        assert_eq!(alloc.num_allocated_bytes(), bytes_before);
    }

    #[test]
    fn exhaustion_fails_on_the_33rd_top_order_allocation() {
        let (_guard, mut alloc) = fresh();
        let request = TOP_ORDER_FOOTPRINT - HEADER_SIZE;

        for _ in 0..INITIAL_BLOCKS {
            assert!(!alloc.alloc(request).is_null());
        }
        assert!(alloc.alloc(request).is_null());
    }

    #[test]
    fn two_small_allocations_fully_recoalesce() {
        let (_guard, mut alloc) = fresh();
        let free_before = alloc.num_free_blocks();

        let p1 = alloc.alloc(100);
        let p2 = alloc.alloc(100);
        assert!(!p1.is_null());
        assert!(!p2.is_null());

        // SAFETY: both pointers came from `alloc` above and are freed
        // exactly once here.
        unsafe {
            alloc.free(p1).unwrap();
            alloc.free(p2).unwrap();
        }
        assert_eq!(alloc.num_free_blocks(), free_before);
    }

    #[test]
    fn double_free_is_a_silent_no_op() {
        let (_guard, mut alloc) = fresh();
        let ptr = alloc.alloc(100);
        assert!(!ptr.is_null());

        // SAFETY: freeing an already-free block is documented as a
        // tolerated no-op, not undefined behavior.
        unsafe {
            alloc.free(ptr).unwrap();
            alloc.free(ptr).unwrap();
        }
    }

    #[test]
    fn metadata_accounting_tracks_live_block_count() {
        let (_guard, mut alloc) = fresh();
        let ptr = alloc.alloc(100);
        assert!(!ptr.is_null());
        assert_eq!(
            alloc.num_meta_data_bytes(),
            alloc.size_meta_data() * alloc.num_allocated_blocks()
        );
        unsafe { alloc.free(ptr).unwrap() };
    }
}
