//! Non-blocking buddy system.
//!
//! A lock-free physical memory allocator for power-of-two blocks, after
//! "A Non-blocking Buddy System for Scalable Memory Allocation on Multi-core
//! Machines" (Marotta, Ianni, Scarselli, Pellegrini, Quaglia).
//!
//! The managed region is described by an implicit binary tree with one
//! status byte per node. Allocation claims a node with a CAS and then marks
//! every ancestor up to `base_level`; freeing first flags the path as
//! coalescing, clears the node, then unmarks ancestors as long as buddies
//! are free. No locks are taken anywhere; the only retry across a full scan
//! happens when a concurrent free bumped the release counter.
//!
//! The allocator never touches the memory it manages, only the tree and the
//! leaf index obtained from a [`BackingAllocator`] at construction.

#![no_std]

extern crate alloc as core_alloc;

mod allocate;
pub mod backing;
pub mod config;
mod error;
pub mod global;
mod release;
mod stats;
mod status;
mod tree;

use core::fmt;
use core::mem::align_of;
use core::ptr;
use core::slice;
use core::sync::atomic::{AtomicU8, AtomicUsize};

use log::{info, warn};

pub use backing::{BackingAllocator, BumpBacking, HeapBacking};
pub use config::{Config, Geometry, IndexEntry};
pub use error::{AllocError, FreeError, InitError};
pub use global::GlobalNbbs;
pub use stats::InvariantViolation;
pub use status::Status;

/// One allocation counter per order; orders never exceed the tree depth.
const ORDERS: usize = config::MAX_DEPTH + 1;

/// A non-blocking buddy allocator over one contiguous region.
///
/// Every method takes `&self`; the value can be shared between cores as is.
pub struct Nbbs {
    base: usize,
    geo: Geometry,
    tree: &'static [AtomicU8],
    index: &'static [IndexEntry],
    release_count: AtomicUsize,
    allocated: [AtomicUsize; ORDERS],
}

impl Nbbs {
    /// Manage `size` bytes at `base` with 4 KiB granules and 2 MiB blocks at
    /// most.
    pub fn new<B: BackingAllocator>(
        base: usize,
        size: usize,
        backing: B,
    ) -> Result<Self, InitError> {
        Self::with_config(base, size, Config::default(), backing)
    }

    pub fn with_config<B: BackingAllocator>(
        base: usize,
        size: usize,
        config: Config,
        mut backing: B,
    ) -> Result<Self, InitError> {
        if base == 0 {
            return Err(InitError::NullBase);
        }
        let geo = Geometry::new(size, &config)?;
        if base % geo.min_size != 0 {
            return Err(InitError::Misaligned { base, align: geo.min_size });
        }
        if base.checked_add(geo.total_memory - 1).is_none() {
            return Err(InitError::Overflow { base, size });
        }

        let tree_bytes = geo.tree_bytes();
        let index_bytes = geo.index_bytes();
        let tree = backing
            .allocate(tree_bytes, align_of::<AtomicU8>())
            .ok_or(InitError::Backing { what: "tree", bytes: tree_bytes })?;
        let index = backing
            .allocate(index_bytes, align_of::<IndexEntry>())
            .ok_or(InitError::Backing { what: "leaf index", bytes: index_bytes })?;

        // SAFETY: the backing allocator hands out exclusive, 'static memory of
        // the requested size and alignment. Zero is a valid bit pattern for
        // both atomic types.
        let (tree, index) = unsafe {
            ptr::write_bytes(tree.as_ptr(), 0, tree_bytes);
            ptr::write_bytes(index.as_ptr(), 0, index_bytes);
            (
                slice::from_raw_parts(tree.as_ptr() as *const AtomicU8, geo.tree_nodes()),
                slice::from_raw_parts(index.as_ptr() as *const IndexEntry, geo.leaves()),
            )
        };

        let last = base + (geo.total_memory - 1);
        if size > geo.total_memory {
            warn!(
                "nbbs: {:#x} bytes past {:#x} are not managed",
                size - geo.total_memory,
                last
            );
        }
        info!(
            "nbbs: {:#x}..={:#x}, depth {}, base level {}, blocks {}..={} bytes, metadata {} bytes",
            base,
            last,
            geo.depth,
            geo.base_level,
            geo.min_size,
            geo.max_size,
            tree_bytes + index_bytes
        );

        const COUNTER_INIT_VALUE: AtomicUsize = AtomicUsize::new(0);
        Ok(Self {
            base,
            geo,
            tree,
            index,
            release_count: AtomicUsize::new(0),
            allocated: [COUNTER_INIT_VALUE; ORDERS],
        })
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }
}

impl fmt::Debug for Nbbs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nbbs")
            .field("base", &format_args!("{:#x}", self.base))
            .field("geometry", &self.geo)
            .field("used_memory", &self.used_memory())
            .field("release_count", &self.release_count())
            .finish()
    }
}
