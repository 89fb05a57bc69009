//! Read-only counters and diagnostics. Values are snapshots; under
//! concurrent use they may be stale by the time they are returned.

use core::sync::atomic::Ordering;

use thiserror::Error;

use crate::status::{self, Status};
use crate::tree::{exp2, lchild, level};
use crate::Nbbs;

impl Nbbs {
    pub fn min_size(&self) -> usize {
        self.geo.min_size
    }

    pub fn max_order(&self) -> usize {
        self.geo.max_order
    }

    pub fn depth(&self) -> usize {
        self.geo.depth
    }

    pub fn base_level(&self) -> usize {
        self.geo.base_level
    }

    pub fn max_size(&self) -> usize {
        self.geo.max_size
    }

    pub fn tree_bytes(&self) -> usize {
        self.geo.tree_bytes()
    }

    pub fn index_bytes(&self) -> usize {
        self.geo.index_bytes()
    }

    /// Number of successful frees so far.
    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    pub fn total_memory(&self) -> usize {
        self.geo.total_memory
    }

    pub fn used_memory(&self) -> usize {
        (0..=self.geo.max_order)
            .map(|order| {
                self.allocated[order].load(Ordering::SeqCst) * (self.geo.min_size << order)
            })
            .sum()
    }

    pub fn block_size(&self, order: usize) -> Option<usize> {
        self.geo.block_size(order)
    }

    /// How many blocks of `order` fit the region when nothing else is
    /// allocated.
    pub fn total_blocks(&self, order: usize) -> Option<usize> {
        self.block_size(order).map(|size| self.geo.total_memory / size)
    }

    pub fn used_blocks(&self, order: usize) -> Option<usize> {
        (order <= self.geo.max_order).then(|| self.allocated[order].load(Ordering::SeqCst))
    }

    /// Copy the status bytes of every node at `order` into `buf`, leftmost
    /// block first. Returns the number of bytes written, or `None` if the
    /// order is out of range or `buf` is too short.
    pub fn occupancy_map(&self, buf: &mut [u8], order: usize) -> Option<usize> {
        if order > self.geo.max_order {
            return None;
        }
        let lvl = self.geo.depth - order;
        let nodes = &self.tree[exp2(lvl)..exp2(lvl + 1)];
        let out = buf.get_mut(..nodes.len())?;
        for (dst, node) in out.iter_mut().zip(nodes) {
            *dst = node.load(Ordering::Relaxed);
        }
        Some(nodes.len())
    }

    /// Walk the whole tree and check that the occupancy flags agree with
    /// each other. Only meaningful while no alloc or free is in flight.
    ///
    /// Coalescing flags are ignored: a free that raced with an allocation
    /// in the same subtree can leave one behind, and the next release on
    /// that path clears it.
    pub fn check_invariant(&self) -> Result<(), InvariantViolation> {
        let depth = self.geo.depth;
        let coal = (Status::COAL_LEFT | Status::COAL_RIGHT).bits();
        let occupancy_of = |n: usize| self.tree[n].load(Ordering::SeqCst) & !coal;
        let violation = |node: usize, reason: &'static str| InvariantViolation {
            node,
            status: Status::from_bits_retain(self.tree[node].load(Ordering::SeqCst)),
            reason,
        };

        for n in 1..exp2(self.geo.base_level) {
            if occupancy_of(n) != 0 {
                return Err(violation(n, "node above base level is in use"));
            }
        }

        for n in exp2(self.geo.base_level)..self.geo.tree_nodes() {
            let v = occupancy_of(n);
            let allocated = v & Status::OCC.bits() != 0;
            if allocated && v != Status::BUSY.bits() {
                return Err(violation(n, "allocated node is not fully busy"));
            }
            if level(n) == depth {
                if v != 0 && !allocated {
                    return Err(violation(n, "leaf tracks children"));
                }
                continue;
            }

            let left = lchild(n);
            for child in [left, left + 1] {
                let c = occupancy_of(child);
                if allocated {
                    if c != 0 {
                        return Err(violation(n, "allocated node has a non-empty subtree"));
                    }
                } else if status::is_free(c) == status::is_occ_child(v, child) {
                    return Err(violation(n, "occupancy flag disagrees with child"));
                }
            }
        }

        Ok(())
    }
}

/// First node found in a state the allocator can never leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("node {node} ({status:?}): {reason}")]
pub struct InvariantViolation {
    pub node: usize,
    pub status: Status,
    pub reason: &'static str,
}
