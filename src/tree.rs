//! Implicit binary tree addressing. The root is node 1, the children of `n`
//! are `2n` and `2n + 1`, and levels grow towards the leaves.

#[inline]
pub(crate) const fn level(n: usize) -> usize {
    usize::ilog2(n) as usize
}

#[inline]
pub(crate) const fn parent(n: usize) -> usize {
    n >> 1
}

#[inline]
pub(crate) const fn lchild(n: usize) -> usize {
    n << 1
}

#[inline]
pub(crate) const fn exp2(n: usize) -> usize {
    1 << n
}

/// Id of the leftmost leaf under `n` in a tree whose leaves sit at `depth`.
#[inline]
pub(crate) const fn leftmost(n: usize, depth: usize) -> usize {
    n << (depth - level(n))
}

/// Leaf number (0-based granule offset) of the first granule covered by `n`.
#[inline]
pub(crate) const fn first_leaf(n: usize, depth: usize) -> usize {
    leftmost(n, depth) - exp2(depth)
}

/// Next node worth scanning at `level(n)` after a claim on `n` failed at
/// `failed_at` (`n` itself or one of its ancestors): the first node to the
/// right of the subtree rooted at `failed_at`.
#[inline]
pub(crate) const fn skip_past(n: usize, failed_at: usize) -> usize {
    (failed_at + 1) << (level(n) - level(failed_at))
}
