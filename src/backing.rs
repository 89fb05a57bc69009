//! Storage for the allocator's own metadata (tree and leaf index).

use core_alloc::alloc::{alloc_zeroed, Layout};
use core::ptr::NonNull;

/// Supplies raw memory for metadata at init time. Nothing is ever handed
/// back.
///
/// # Safety
/// Memory returned by `allocate` must be valid for reads and writes of
/// `bytes` bytes, aligned to `align`, not aliased by anything else, and must
/// stay valid for the rest of the program.
pub unsafe trait BackingAllocator {
    fn allocate(&mut self, bytes: usize, align: usize) -> Option<NonNull<u8>>;
}

unsafe impl<B: BackingAllocator + ?Sized> BackingAllocator for &mut B {
    fn allocate(&mut self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        (**self).allocate(bytes, align)
    }
}

/// Bump allocator over a fixed boot arena.
pub struct BumpBacking {
    start: usize,
    end: usize,
    next: usize,
}

impl BumpBacking {
    pub fn new(arena: &'static mut [u8]) -> Self {
        let start = arena.as_mut_ptr() as usize;
        Self {
            start,
            end: start + arena.len(),
            next: start,
        }
    }

    /// Bytes handed out so far, alignment padding included.
    pub fn used(&self) -> usize {
        self.next - self.start
    }

    pub fn remaining(&self) -> usize {
        self.end - self.next
    }
}

unsafe impl BackingAllocator for BumpBacking {
    fn allocate(&mut self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        let alloc_start = self.next.checked_next_multiple_of(align)?;
        let alloc_end = alloc_start.checked_add(bytes)?;
        if alloc_end > self.end {
            return None;
        }
        self.next = alloc_end;
        NonNull::new(alloc_start as *mut u8)
    }
}

/// Takes zeroed memory from the global heap and leaks it.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapBacking;

unsafe impl BackingAllocator for HeapBacking {
    fn allocate(&mut self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(bytes.max(1), align).ok()?;
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }
}
