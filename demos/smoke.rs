//! Manual smoke test: construct an allocator, drive it through a small
//! mixed workload, and print the accounting counters at each step.
//!
//! Not part of the test suite; useful for eyeballing behavior under a
//! real program break and real `mmap` calls, which `cargo test` cannot
//! fully exercise in isolation from other tests sharing the process.

use burrow::Allocator;

fn report(label: &str, alloc: &Allocator) {
    println!(
        "{label}: blocks={} free_blocks={} bytes={} free_bytes={}",
        alloc.num_allocated_blocks(),
        alloc.num_free_blocks(),
        alloc.num_allocated_bytes(),
        alloc.num_free_bytes(),
    );
}

fn main() {
    #[cfg(feature = "logging")]
    let _ = burrow::init_logging();

    let mut alloc = Allocator::new().expect("arena construction");
    report("after construction", &alloc);

    let small = alloc.alloc(100);
    assert!(!small.is_null());
    report("after alloc(100)", &alloc);

    let large = alloc.alloc(200_000);
    assert!(!large.is_null());
    report("after alloc(200_000)", &alloc);

    unsafe {
        alloc.free(small).expect("free small");
        alloc.free(large).expect("free large");
    }
    report("after freeing both", &alloc);
}
