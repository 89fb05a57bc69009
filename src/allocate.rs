use core::alloc::Layout;
use core::sync::atomic::Ordering;

use log::{debug, trace};

use crate::error::AllocError;
use crate::status::{self, Status};
use crate::tree::{exp2, first_leaf, level, parent, skip_past};
use crate::Nbbs;

impl Nbbs {
    /// Allocate the smallest block that holds `size` bytes and return its
    /// address. The block is aligned to its own size relative to the base.
    pub fn alloc(&self, size: usize) -> Result<usize, AllocError> {
        let order = self.geo.order_for(size).ok_or(AllocError::TooLarge {
            size,
            max_size: self.geo.max_size,
        })?;
        let req_level = self.geo.depth - order;
        let start_from = exp2(req_level);
        let until_to = exp2(req_level + 1);

        loop {
            let ts = self.release_count.load(Ordering::SeqCst);

            let mut i = start_from;
            while i < until_to {
                if !status::is_free(self.tree[i].load(Ordering::SeqCst)) {
                    i += 1;
                    continue;
                }
                match self.try_alloc(i) {
                    Ok(()) => return Ok(self.commit(i, order)),
                    Err(failed_at) => {
                        let next = skip_past(i, failed_at);
                        trace!(
                            "nbbs: claim of node {} failed at {}, resuming at {}",
                            i,
                            failed_at,
                            next
                        );
                        i = next;
                    }
                }
            }

            if self.release_count.load(Ordering::SeqCst) == ts {
                debug!("nbbs: order {} exhausted", order);
                return Err(AllocError::OutOfMemory { size });
            }
            debug!("nbbs: blocks released during scan of order {}, rescanning", order);
        }
    }

    /// Allocate for a `Layout`. Alignments up to the granule size always
    /// hold; larger ones hold when the base address is aligned to them.
    pub fn alloc_layout(&self, layout: Layout) -> Result<usize, AllocError> {
        let align = layout.align();
        if align > self.geo.min_size && self.base % align != 0 {
            return Err(AllocError::Alignment { align });
        }
        self.alloc(layout.size().max(align))
    }

    /// Claim `n` and mark it in every ancestor down to `base_level`. On a
    /// conflict with an allocated ancestor the claim is rolled back and that
    /// ancestor is returned.
    fn try_alloc(&self, n: usize) -> Result<(), usize> {
        if self.cas_tree_value(n, 0, Status::BUSY.bits()).is_err() {
            return Err(n);
        }

        let mut current = n;
        while level(current) > self.geo.base_level {
            let child = current;
            current = parent(current);
            let mut cur_val = self.tree[current].load(Ordering::SeqCst);
            loop {
                if cur_val & Status::OCC.bits() != 0 {
                    self.freenode(n, level(child));
                    return Err(current);
                }
                let new_val = status::mark(status::clean_coal(cur_val, child), child);
                match self.cas_tree_value(current, cur_val, new_val) {
                    Ok(_) => break,
                    Err(actual) => cur_val = actual,
                }
            }
        }

        Ok(())
    }

    /// Record a successful claim and turn the node into an address.
    fn commit(&self, n: usize, order: usize) -> usize {
        let leaf = first_leaf(n, self.geo.depth);
        let _stale = self.index[leaf].swap(n as u32, Ordering::SeqCst);
        debug_assert_eq!(_stale, 0, "index entry for leaf {leaf} still owned");
        self.allocated[order].fetch_add(1, Ordering::SeqCst);
        trace!("nbbs: claimed node {} (order {}, leaf {})", n, order, leaf);
        self.base + leaf * self.geo.min_size
    }

    pub(crate) fn cas_tree_value(&self, i: usize, cur_val: u8, new_val: u8) -> Result<u8, u8> {
        self.tree[i].compare_exchange(cur_val, new_val, Ordering::SeqCst, Ordering::SeqCst)
    }
}
