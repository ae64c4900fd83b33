use num_traits::Float;

use core::cmp::Ordering;

/// Sorts a scratch copy of a window in ascending order.
///
/// Incomparable pairs (NaN) are treated as equal, matching the ordering the
/// window primitives use everywhere else.
///
/// # Arguments
///
/// * `buf` - The scratch buffer to sort in place
#[inline]
pub fn sort_scratch<T: PartialOrd>(buf: &mut [T]) {
    buf.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Returns the median of an already sorted window copy.
///
/// An odd number of elements yields the middle element; an even number the
/// average of the two middle elements.
///
/// # Arguments
///
/// * `sorted` - The sorted window contents, must be nonempty
///
/// # Returns
///
/// * `T` - The window median
#[inline]
pub fn median_of_sorted<T: Float>(sorted: &[T]) -> T {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        let _2 = T::one() + T::one();
        (sorted[mid - 1] + sorted[mid]) / _2
    }
}

/// Returns the 1-indexed nearest-rank position for percentile `p` over
/// `count` elements: `ceil(p / 100 * count)` clamped to `[1, count]`.
///
/// The ceiling, 1-indexing and clamping together pin the boundary behavior:
/// any `p` at or below 0 resolves to the minimum, `p = 100` to the maximum.
///
/// # Arguments
///
/// * `p` - The percentile in `[0, 100]`
/// * `count` - The number of elements ranked, must be nonzero
///
/// # Returns
///
/// * `usize` - The 1-indexed rank
#[inline]
pub fn nearest_rank(p: f64, count: usize) -> usize {
    debug_assert!(count > 0, "nearest_rank over an empty set");
    let raw = Float::ceil(p / 100.0 * count as f64) as usize;
    raw.clamp(1, count)
}
