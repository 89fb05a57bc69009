//! Allocator tunables and the tree geometry derived from them.

use core::mem::size_of;
use core::sync::atomic::AtomicU32;

use static_assertions::assert_eq_size;

use crate::error::InitError;
use crate::tree::exp2;

/// Smallest allocatable granule: one 4 KiB page.
pub const DEFAULT_MIN_SIZE: usize = 4096;

/// Largest block is `2^DEFAULT_MAX_ORDER` granules (2 MiB with 4 KiB pages).
pub const DEFAULT_MAX_ORDER: u32 = 9;

/// Node ids are stored as `u32` in the leaf index, so the deepest leaf id
/// `2^(depth+1) - 1` has to fit.
pub const MAX_DEPTH: usize = 31;

/// One leaf-index entry per granule.
pub type IndexEntry = AtomicU32;

assert_eq_size!(IndexEntry, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Granule size in bytes. Must be a power of two.
    pub min_size: usize,
    /// Largest block is `2^max_order` granules, clamped to the region.
    pub max_order: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            max_order: DEFAULT_MAX_ORDER,
        }
    }
}

/// Shape of the tree for a region of a given size.
///
/// Computed without touching memory, so it can be used to size the boot
/// arena that will later hold the tree and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub min_size: usize,
    /// Leaves live at this level.
    pub depth: usize,
    /// Nodes above this level are never touched.
    pub base_level: usize,
    /// `depth - base_level`.
    pub max_order: usize,
    pub max_size: usize,
    /// Bytes covered by the tree: `2^depth` granules.
    pub total_memory: usize,
}

impl Geometry {
    pub fn new(size: usize, config: &Config) -> Result<Self, InitError> {
        let min_size = config.min_size;
        if min_size == 0 || !min_size.is_power_of_two() {
            return Err(InitError::MinSize(min_size));
        }
        if size < min_size {
            return Err(InitError::TooSmall { size, min_size });
        }

        let depth = (size / min_size).ilog2() as usize;
        if depth > MAX_DEPTH {
            return Err(InitError::TooLarge { depth });
        }
        let base_level = depth.saturating_sub(config.max_order as usize);
        let max_order = depth - base_level;

        Ok(Self {
            min_size,
            depth,
            base_level,
            max_order,
            max_size: exp2(max_order) * min_size,
            total_memory: exp2(depth) * min_size,
        })
    }

    /// Number of granules, which is also the number of index entries.
    pub const fn leaves(&self) -> usize {
        exp2(self.depth)
    }

    /// Ids run over `[1, 2^(depth+1))`; slot 0 is allocated but unused.
    pub const fn tree_nodes(&self) -> usize {
        exp2(self.depth + 1)
    }

    pub const fn tree_bytes(&self) -> usize {
        self.tree_nodes()
    }

    pub const fn index_bytes(&self) -> usize {
        self.leaves() * size_of::<IndexEntry>()
    }

    pub const fn block_size(&self, order: usize) -> Option<usize> {
        if order > self.max_order {
            return None;
        }
        Some(exp2(order) * self.min_size)
    }

    /// Order of the smallest block that can hold `size` bytes, or `None` if
    /// that exceeds `max_size`. Zero behaves like `min_size`.
    pub fn order_for(&self, size: usize) -> Option<usize> {
        if size > self.max_size {
            return None;
        }
        let granules = size.div_ceil(self.min_size).max(1);
        Some(granules.next_power_of_two().trailing_zeros() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn kernel_arena_geometry() {
        // 64 MiB of 4 KiB pages with max order 9
        let geo = Geometry::new(64 * MIB, &Config::default()).unwrap();
        assert_eq!(geo.depth, 14);
        assert_eq!(geo.base_level, 5);
        assert_eq!(geo.max_order, 9);
        assert_eq!(geo.max_size, 2 * MIB);
        assert_eq!(geo.total_memory, 64 * MIB);
        assert_eq!(geo.tree_bytes(), 32 * 1024);
        assert_eq!(geo.index_bytes(), 64 * 1024);
    }

    #[test]
    fn single_page_region() {
        let geo = Geometry::new(DEFAULT_MIN_SIZE, &Config::default()).unwrap();
        assert_eq!(geo.depth, 0);
        assert_eq!(geo.base_level, 0);
        assert_eq!(geo.max_order, 0);
        assert_eq!(geo.max_size, DEFAULT_MIN_SIZE);
    }

    #[test]
    fn unmanaged_tail_is_dropped() {
        let geo = Geometry::new(3 * DEFAULT_MIN_SIZE, &Config::default()).unwrap();
        assert_eq!(geo.depth, 1);
        assert_eq!(geo.total_memory, 2 * DEFAULT_MIN_SIZE);
    }

    #[test]
    fn rejects_bad_arguments() {
        let config = Config::default();
        assert_eq!(
            Geometry::new(0, &config),
            Err(InitError::TooSmall { size: 0, min_size: 4096 })
        );
        assert_eq!(
            Geometry::new(4095, &config),
            Err(InitError::TooSmall { size: 4095, min_size: 4096 })
        );
        let odd = Config { min_size: 3000, ..config };
        assert_eq!(Geometry::new(1 << 20, &odd), Err(InitError::MinSize(3000)));
    }

    #[test]
    fn order_for_sizes() {
        let geo = Geometry::new(64 * MIB, &Config::default()).unwrap();
        assert_eq!(geo.order_for(0), Some(0));
        assert_eq!(geo.order_for(1), Some(0));
        assert_eq!(geo.order_for(4096), Some(0));
        assert_eq!(geo.order_for(4097), Some(1));
        assert_eq!(geo.order_for(3 * 4096), Some(2));
        assert_eq!(geo.order_for(2 * MIB), Some(9));
        assert_eq!(geo.order_for(2 * MIB + 1), None);
        assert_eq!(geo.block_size(9), Some(2 * MIB));
        assert_eq!(geo.block_size(10), None);
    }
}
