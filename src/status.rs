//! Per-node status byte.
//!
//! ```text
//!  7       5          4            3            2          1          0
//! +---------+----------+------------+------------+----------+----------+
//! | ignored | occupied |    left    |   right    |   left   |   right  |
//! |         |          | coalescent | coalescent | occupied | occupied |
//! +---------+----------+------------+------------+----------+----------+
//! ```
//!
//! Every helper that takes a `child` uses only its parity: even ids are left
//! children, odd ids are right children.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

bitflags! {
    /// Status flags of one tree node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const OCC_RIGHT  = 0x01;
        const OCC_LEFT   = 0x02;
        const COAL_RIGHT = 0x04;
        const COAL_LEFT  = 0x08;
        /// The node itself is the allocated block.
        const OCC        = 0x10;
        const BUSY       = Self::OCC.bits() | Self::OCC_LEFT.bits() | Self::OCC_RIGHT.bits();
    }
}

const_assert_eq!(Status::BUSY.bits(), 0x13);
const_assert_eq!(Status::OCC_LEFT.bits() >> 1, Status::OCC_RIGHT.bits());
const_assert_eq!(Status::COAL_LEFT.bits() >> 1, Status::COAL_RIGHT.bits());

const fn side(child: usize) -> u32 {
    (child % 2) as u32
}

/// Sets the occupancy bit for `child`.
#[inline]
pub(crate) const fn mark(v: u8, child: usize) -> u8 {
    v | (Status::OCC_LEFT.bits() >> side(child))
}

/// Clears both the occupancy and the coalescing bit for `child`.
#[inline]
pub(crate) const fn unmark(v: u8, child: usize) -> u8 {
    v & !((Status::OCC_LEFT.bits() | Status::COAL_LEFT.bits()) >> side(child))
}

#[inline]
pub(crate) const fn set_coal(v: u8, child: usize) -> u8 {
    v | (Status::COAL_LEFT.bits() >> side(child))
}

#[inline]
pub(crate) const fn clean_coal(v: u8, child: usize) -> u8 {
    v & !(Status::COAL_LEFT.bits() >> side(child))
}

#[inline]
pub(crate) const fn is_coal(v: u8, child: usize) -> bool {
    v & (Status::COAL_LEFT.bits() >> side(child)) != 0
}

/// Is the sibling of `child` occupied?
#[inline]
pub(crate) const fn is_occ_buddy(v: u8, child: usize) -> bool {
    v & (Status::OCC_RIGHT.bits() << side(child)) != 0
}

/// Is the sibling of `child` coalescing?
#[inline]
pub(crate) const fn is_coal_buddy(v: u8, child: usize) -> bool {
    v & (Status::COAL_RIGHT.bits() << side(child)) != 0
}

/// Is the occupancy bit for `child` itself set?
#[inline]
pub(crate) const fn is_occ_child(v: u8, child: usize) -> bool {
    v & (Status::OCC_LEFT.bits() >> side(child)) != 0
}

#[inline]
pub(crate) const fn is_free(v: u8) -> bool {
    v & Status::BUSY.bits() == 0
}
