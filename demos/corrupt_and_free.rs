//! Helper binary for the corruption test in `tests/corruption.rs`.
//!
//! Allocates one block, stomps the cookie word immediately preceding
//! its payload, and calls `free`. Must never return: `free` detects
//! the mismatch and exits the process first.

use burrow::Allocator;

fn main() {
    let mut alloc = Allocator::new().expect("arena construction");
    let ptr = alloc.alloc(64);
    assert!(!ptr.is_null());

    // The cookie is the header's first field, `size_meta_data()` bytes
    // before the payload.
    let header_size = alloc.size_meta_data();

    // SAFETY: `ptr` is a live allocation at least `header_size` bytes
    // into the arena; stepping back by `header_size` lands exactly on
    // the start of its own header.
    unsafe {
        let cookie = ptr.sub(header_size) as *mut u64;
        cookie.write(!cookie.read());
        alloc.free(ptr).ok();
    }

    eprintln!("corruption was not detected");
    std::process::exit(1);
}
