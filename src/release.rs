use core::sync::atomic::Ordering;

use log::{debug, warn};

use crate::error::FreeError;
use crate::status;
use crate::tree::{level, parent};
use crate::Nbbs;

impl Nbbs {
    /// Return the block starting at `addr`. Freeing address 0 does nothing.
    ///
    /// The leaf index entry is taken with a CAS before the tree is touched,
    /// so two frees of the same block cannot both succeed. A stale address
    /// whose block has since been handed out again is not detected.
    pub fn free(&self, addr: usize) -> Result<(), FreeError> {
        if addr == 0 {
            return Ok(());
        }

        let offset = addr
            .checked_sub(self.base)
            .filter(|&offset| offset < self.geo.total_memory)
            .ok_or(FreeError::OutOfRange { addr })?;
        if offset % self.geo.min_size != 0 {
            warn!("nbbs: free of unaligned address {:#x}", addr);
            return Err(FreeError::Misaligned { addr });
        }

        let leaf = offset / self.geo.min_size;
        let node = self.index[leaf].load(Ordering::SeqCst);
        if node == 0
            || self.index[leaf]
                .compare_exchange(node, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            warn!("nbbs: free of {:#x} which is not allocated", addr);
            return Err(FreeError::NotAllocated { addr });
        }

        let node = node as usize;
        if !self.freenode(node, self.geo.base_level) {
            warn!("nbbs: node {} for {:#x} was already free", node, addr);
            return Err(FreeError::NotAllocated { addr });
        }

        self.release_count.fetch_add(1, Ordering::SeqCst);
        self.allocated[self.geo.depth - level(node)].fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    /// Release `n` and merge upwards no further than `upper_bound`. Returns
    /// false if `n` was already free.
    pub(crate) fn freenode(&self, n: usize, upper_bound: usize) -> bool {
        // racy: only catches frees that are not concurrent with each other
        if status::is_free(self.tree[n].load(Ordering::SeqCst)) {
            return false;
        }

        // flag the path as coalescing; stop below an ancestor whose other
        // half stays allocated, nothing above it can merge
        let mut runner = n;
        while level(runner) > upper_bound {
            let current = parent(runner);
            let set_coal = |v| Some(status::set_coal(v, runner));
            let old_val = self.tree[current]
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, set_coal)
                .unwrap_or_else(|v| v);
            if status::is_occ_buddy(old_val, runner) && !status::is_coal_buddy(old_val, runner) {
                break;
            }
            runner = current;
        }

        self.tree[n].store(0, Ordering::SeqCst);
        if level(n) != upper_bound {
            self.unmark(n, upper_bound);
        }
        true
    }

    /// Clear the occupancy of `n` in its ancestors for as long as the
    /// coalescing flag we set is still there and the buddy is free.
    fn unmark(&self, n: usize, upper_bound: usize) {
        let mut current = n;
        loop {
            let child = current;
            current = parent(current);
            let mut cur_val = self.tree[current].load(Ordering::SeqCst);
            let new_val = loop {
                if !status::is_coal(cur_val, child) {
                    // an allocation re-marked this subtree in the meantime
                    return;
                }
                let new_val = status::unmark(cur_val, child);
                match self.cas_tree_value(current, cur_val, new_val) {
                    Ok(_) => break new_val,
                    Err(actual) => cur_val = actual,
                }
            };
            if level(current) <= upper_bound || status::is_occ_buddy(new_val, child) {
                break;
            }
            debug!("nbbs: node {} coalesced", current);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use crate::{Config, FreeError, HeapBacking, Nbbs};

    const PAGE: usize = 4096;
    const BASE: usize = 0x10_0000;

    fn small(pages: usize) -> Nbbs {
        let config = Config { min_size: PAGE, max_order: 16 };
        Nbbs::with_config(BASE, pages * PAGE, config, HeapBacking).unwrap()
    }

    #[test]
    fn null_free_is_noop() {
        let nbbs = small(4);
        assert_eq!(nbbs.free(0), Ok(()));
        assert_eq!(nbbs.release_count(), 0);
    }

    #[test]
    fn rejects_foreign_addresses() {
        let nbbs = small(4);
        let addr = nbbs.alloc(PAGE).unwrap();
        assert_eq!(nbbs.free(BASE - PAGE), Err(FreeError::OutOfRange { addr: BASE - PAGE }));
        assert_eq!(
            nbbs.free(BASE + 4 * PAGE),
            Err(FreeError::OutOfRange { addr: BASE + 4 * PAGE })
        );
        assert_eq!(nbbs.free(addr + 1), Err(FreeError::Misaligned { addr: addr + 1 }));
        // interior page of nothing
        assert_eq!(
            nbbs.free(BASE + 3 * PAGE),
            Err(FreeError::NotAllocated { addr: BASE + 3 * PAGE })
        );
        assert_eq!(nbbs.used_blocks(0), Some(1));
    }

    #[test]
    fn double_free_is_rejected() {
        let nbbs = small(8);
        let addr = nbbs.alloc(2 * PAGE).unwrap();
        assert_eq!(nbbs.free(addr), Ok(()));
        assert_eq!(nbbs.free(addr), Err(FreeError::NotAllocated { addr }));
        assert_eq!(nbbs.release_count(), 1);
        assert_eq!(nbbs.used_blocks(1), Some(0));
        assert_eq!(nbbs.check_invariant(), Ok(()));
    }

    #[test]
    fn interior_address_of_block_is_not_a_block() {
        let nbbs = small(8);
        let addr = nbbs.alloc(4 * PAGE).unwrap();
        assert_eq!(
            nbbs.free(addr + PAGE),
            Err(FreeError::NotAllocated { addr: addr + PAGE })
        );
        assert_eq!(nbbs.free(addr), Ok(()));
    }

    #[test]
    fn full_merge_restores_empty_tree() {
        let nbbs = small(16);
        let pages: Vec<usize> = (0..16).map(|_| nbbs.alloc(PAGE).unwrap()).collect();
        // free in an order that completes pairs late
        for &addr in pages.iter().step_by(2).chain(pages.iter().skip(1).step_by(2)) {
            nbbs.free(addr).unwrap();
            assert_eq!(nbbs.check_invariant(), Ok(()));
        }
        let mut map = [0u8; 16];
        for order in 0..=4 {
            let n = nbbs.occupancy_map(&mut map, order).unwrap();
            assert!(map[..n].iter().all(|&b| b == 0));
        }
        assert_eq!(nbbs.alloc(16 * PAGE), Ok(BASE));
    }

    #[test]
    fn rollback_leaves_no_marks() {
        // a page request that runs into an allocated ancestor must undo its
        // marks on the way back
        let nbbs = small(8);
        let big = nbbs.alloc(4 * PAGE).unwrap();
        let page = nbbs.alloc(PAGE).unwrap();
        assert_eq!(page, BASE + 4 * PAGE);
        assert_eq!(nbbs.check_invariant(), Ok(()));
        nbbs.free(big).unwrap();
        nbbs.free(page).unwrap();
        assert_eq!(nbbs.check_invariant(), Ok(()));
        assert_eq!(nbbs.alloc(8 * PAGE), Ok(BASE));
    }
}
