#![allow(dead_code)]

use std::alloc::{alloc_zeroed, Layout};

pub const PAGE: usize = 4096;
pub const MIB: usize = 1024 * 1024;

/// Leak a zeroed region of `size` bytes aligned to `align` and return its
/// address. The allocator only does arithmetic on it; tests that write into
/// blocks need it to be real.
pub fn arena(size: usize, align: usize) -> usize {
    let layout = Layout::from_size_align(size, align).unwrap();
    let ptr = unsafe { alloc_zeroed(layout) };
    assert!(!ptr.is_null(), "could not reserve {size} bytes for the arena");
    ptr as usize
}
