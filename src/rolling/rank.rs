use num_traits::Float;
use ordered_float::PrimitiveFloat;

use alloc::vec::Vec;

use crate::helper::{nearest_rank, sort_scratch};
use crate::pool::{BufferPool, PooledBuffer};
use crate::utils::Treap;

use super::LINEAR_WINDOW_MAX;

#[derive(Debug)]
enum Mode<T: Default + Copy> {
    /// Small windows: copy, sort, index into the sorted scratch
    Linear {
        window: PooledBuffer<T>,
        scratch: Vec<T>,
    },
    /// Large windows: order-statistic treap, O(log length) per operation
    Tree {
        window: PooledBuffer<T>,
        tree: Treap<T>,
    },
}

/// Windowed order statistics over the last `length` fed values: rank counts,
/// rank selection and nearest-rank percentiles.
///
/// Generalizes the rolling median to arbitrary ranks. Windows up to
/// [`LINEAR_WINDOW_MAX`] sort a scratch copy on demand; longer windows keep
/// the window mirrored in an order-statistic treap and answer every query in
/// O(log length) expected time.
///
/// Percentiles use the nearest-rank convention - `ceil(p / 100 * n)`,
/// 1-indexed, clamped to `[1, n]` - so 0 resolves to the window minimum and
/// 100 to the maximum.
#[derive(Debug)]
pub struct RollingRank<T: Default + Copy> {
    mode: Mode<T>,
    length: usize,
}

impl<T> RollingRank<T>
where
    T: Float + PrimitiveFloat + Default,
{
    /// Creates a rolling rank tracker over a window of `length` steps,
    /// renting backing storage from `pool`.
    ///
    /// A length below 1 is clamped to 1.
    ///
    /// # Arguments
    ///
    /// * `pool` - The buffer pool backing the window storage
    /// * `length` - The window length
    ///
    /// # Returns
    ///
    /// * `Self` - The rolling rank tracker
    pub fn new(pool: &BufferPool<T>, length: usize) -> Self {
        let length = length.max(1);
        if length <= LINEAR_WINDOW_MAX {
            Self::linear(pool, length)
        } else {
            Self::tree(pool, length)
        }
    }

    fn linear(pool: &BufferPool<T>, length: usize) -> Self {
        Self {
            mode: Mode::Linear {
                window: PooledBuffer::new(pool, length),
                scratch: vec![T::zero(); length],
            },
            length,
        }
    }

    fn tree(pool: &BufferPool<T>, length: usize) -> Self {
        Self {
            mode: Mode::Tree {
                window: PooledBuffer::new(pool, length),
                tree: Treap::new(length),
            },
            length,
        }
    }

    /// Returns the window length
    ///
    /// # Returns
    ///
    /// * `usize` - The window length
    #[inline]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Returns the number of live values, at most the window length
    ///
    /// # Returns
    ///
    /// * `usize` - The number of live values
    pub fn len(&self) -> usize {
        match &self.mode {
            Mode::Linear { window, .. } => window.len(),
            Mode::Tree { window, .. } => window.len(),
        }
    }

    /// Feeds the next value of the stream, sliding the window forward by one
    /// step.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to feed
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The rolling rank tracker
    pub fn next(&mut self, value: T) -> &mut Self {
        match &mut self.mode {
            Mode::Linear { window, .. } => {
                let _evicted = window.push(value);
            }
            Mode::Tree { window, tree } => {
                if let Some(old) = window.push(value) {
                    let removed = tree.remove(old);
                    debug_assert!(removed, "evicted value missing from the tree");
                }
                let inserted = tree.insert(value);
                debug_assert!(inserted, "tree arena exhausted");
            }
        }
        self
    }

    /// Counts live window values strictly less than `value`.
    ///
    /// # Arguments
    ///
    /// * `value` - The probe value
    ///
    /// # Returns
    ///
    /// * `usize` - The number of live values strictly less than the probe
    pub fn count_less_than(&self, value: T) -> usize {
        match &self.mode {
            Mode::Linear { window, .. } => window.iter().filter(|&&v| v < value).count(),
            Mode::Tree { tree, .. } => tree.count_less_than(value),
        }
    }

    /// Counts live window values less than or equal to `value`.
    ///
    /// # Arguments
    ///
    /// * `value` - The probe value
    ///
    /// # Returns
    ///
    /// * `usize` - The number of live values less than or equal to the probe
    pub fn count_less_or_equal(&self, value: T) -> usize {
        match &self.mode {
            Mode::Linear { window, .. } => window.iter().filter(|&&v| v <= value).count(),
            Mode::Tree { tree, .. } => tree.count_less_or_equal(value),
        }
    }

    /// Returns the `rank`-th smallest live value, 1-indexed and clamped to
    /// `[1, len]`, or zero on an empty window.
    ///
    /// # Arguments
    ///
    /// * `rank` - The 1-indexed rank to select
    ///
    /// # Returns
    ///
    /// * `T` - The selected value, or zero when the window is empty
    pub fn select_by_rank(&mut self, rank: usize) -> T {
        let n = self.len();
        if n == 0 {
            return T::zero();
        }
        match &mut self.mode {
            Mode::Linear { window, scratch } => {
                window.copy_to(&mut scratch[..n]);
                sort_scratch(&mut scratch[..n]);
                scratch[rank.clamp(1, n) - 1]
            }
            Mode::Tree { tree, .. } => tree.select_by_rank(rank).unwrap_or_else(T::zero),
        }
    }

    /// Returns the nearest-rank percentile `p` (in percent), or zero on an
    /// empty window.
    ///
    /// The rank is `ceil(p / 100 * len)` clamped to `[1, len]`, which pins
    /// the boundaries: any `p` at or below 0 yields the minimum, 100 the
    /// maximum.
    ///
    /// # Arguments
    ///
    /// * `p` - The percentile in `[0, 100]`
    ///
    /// # Returns
    ///
    /// * `T` - The value at the nearest rank, or zero when the window is empty
    pub fn percentile_nearest_rank(&mut self, p: f64) -> T {
        let n = self.len();
        if n == 0 {
            return T::zero();
        }
        self.select_by_rank(nearest_rank(p, n))
    }

    /// Restores the tracker to its freshly constructed state.
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The rolling rank tracker
    pub fn reset(&mut self) -> &mut Self {
        match &mut self.mode {
            Mode::Linear { window, .. } => window.clear(),
            Mode::Tree { window, tree } => {
                window.clear();
                tree.clear();
            }
        }
        self
    }

    /// Returns pooled storage to the pool; further feeding panics.
    pub fn release(&mut self) {
        match &mut self.mode {
            Mode::Linear { window, .. } => window.release(),
            Mode::Tree { window, tree } => {
                window.release();
                tree.clear();
            }
        }
    }
}
