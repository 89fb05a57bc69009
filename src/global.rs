//! A process-wide instance that can be created in a `static` before memory
//! is known and brought up once during boot.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use log::error;
use spin::Once;

use crate::backing::BackingAllocator;
use crate::config::Config;
use crate::error::InitError;
use crate::Nbbs;

pub struct GlobalNbbs {
    inner: Once<Nbbs>,
}

impl GlobalNbbs {
    pub const fn new() -> Self {
        Self { inner: Once::new() }
    }

    /// Bring the allocator up. Must finish before any other core allocates.
    /// A failed init can be retried; a successful one cannot be repeated.
    pub fn init<B: BackingAllocator>(
        &self,
        base: usize,
        size: usize,
        config: Config,
        backing: B,
    ) -> Result<&Nbbs, InitError> {
        let mut fresh = false;
        let nbbs = self.inner.try_call_once(|| {
            fresh = true;
            Nbbs::with_config(base, size, config, backing)
        })?;
        if !fresh {
            return Err(InitError::AlreadyInitialized);
        }
        Ok(nbbs)
    }

    /// `None` until `init` has succeeded.
    pub fn get(&self) -> Option<&Nbbs> {
        self.inner.get()
    }
}

impl Default for GlobalNbbs {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for GlobalNbbs {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match self.get().map(|nbbs| nbbs.alloc_layout(layout)) {
            Some(Ok(addr)) => addr as *mut u8,
            _ => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(nbbs) = self.get() else {
            error!("nbbs: dealloc of {:p} before init", ptr);
            return;
        };
        if let Err(err) = nbbs.free(ptr as usize) {
            error!("nbbs: dealloc: {}", err);
        }
    }
}
