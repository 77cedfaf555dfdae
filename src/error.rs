//! Typed errors for the allocator's recoverable failure modes.
//!
//! Header corruption is *not* represented here: per the design, a
//! cookie mismatch observed on `free` terminates the process
//! immediately rather than returning a value to the caller.

/// Exit status used when a cookie mismatch is detected on `free`.
/// Chosen to be recognizable in a process exit code, not to encode any
/// particular diagnostic information.
pub const CORRUPTION_EXIT_CODE: i32 = 0xEF;

/// The allocator could not be constructed: the arena could not be
/// reserved from the program break.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    /// Querying the current program break failed.
    #[error("failed to query the program break: {0}")]
    BreakQuery(#[source] std::io::Error),
    /// Padding the program break up to the arena alignment failed.
    #[error("failed to align the program break: {0}")]
    BreakAlign(#[source] std::io::Error),
    /// Reserving the arena itself failed.
    #[error("failed to reserve the arena: {0}")]
    ArenaReserve(#[source] std::io::Error),
    /// The program break returned a null base after a successful
    /// reservation; the platform's `sbrk` is not behaving as expected.
    #[error("program break returned a null arena base")]
    NullArena,
    /// A single oversized request could not be satisfied by `mmap`.
    #[error("mmap failed while allocating a large block: {0}")]
    MmapAlloc(#[source] std::io::Error),
}

/// A block could not be fully released.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// `munmap` failed while releasing a large block. The block has
    /// already been unlinked from the mmap list by this point, so the
    /// mapping is leaked rather than double-freed.
    #[error("munmap failed while releasing a large block: {0}")]
    Munmap(#[source] std::io::Error),
}
