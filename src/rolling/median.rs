use ahash::RandomState;
use hashbrown::HashMap;
use num_traits::Float;
use ordered_float::{OrderedFloat, PrimitiveFloat};

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;
use core::cmp::Reverse;

use crate::helper::{median_of_sorted, sort_scratch};
use crate::pool::{BufferPool, PooledBuffer};

use super::LINEAR_WINDOW_MAX;

/// Values logically removed from a heap but not yet physically popped,
/// keyed by value with a multiplicity count
type PendingRemovals<T> = HashMap<OrderedFloat<T>, usize, RandomState>;

/// The two-heap median state: a max-heap of the lower half and a min-heap of
/// the upper half, each with its own delayed-deletion map.
///
/// Arbitrary removal is not a heap operation, so evicted window values are
/// only *recorded* as gone and discarded when they surface at a heap top
/// (lazy deletion). `lower_len` / `upper_len` track logical sizes - live
/// elements only - and after every feed satisfy
/// `lower_len == upper_len || lower_len == upper_len + 1`.
#[derive(Debug)]
struct TwoHeaps<T: Default + Copy> {
    /// Eviction tracking for the sliding window
    window: PooledBuffer<T>,
    /// Max-heap of the lower half (values <= median)
    lower: BinaryHeap<OrderedFloat<T>>,
    /// Min-heap of the upper half (values > median)
    upper: BinaryHeap<Reverse<OrderedFloat<T>>>,
    lower_gone: PendingRemovals<T>,
    upper_gone: PendingRemovals<T>,
    /// Live elements logically in the lower heap
    lower_len: usize,
    /// Live elements logically in the upper heap
    upper_len: usize,
}

impl<T> TwoHeaps<T>
where
    T: Float + PrimitiveFloat + Default,
{
    fn new(pool: &BufferPool<T>, length: usize) -> Self {
        Self {
            window: PooledBuffer::new(pool, length),
            lower: BinaryHeap::with_capacity(length),
            upper: BinaryHeap::with_capacity(length),
            lower_gone: HashMap::with_capacity_and_hasher(length, RandomState::default()),
            upper_gone: HashMap::with_capacity_and_hasher(length, RandomState::default()),
            lower_len: 0,
            upper_len: 0,
        }
    }

    /// Routes the value into a heap, retires whatever the window evicts, and
    /// rebalances.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to feed
    fn next(&mut self, value: T) {
        let v = OrderedFloat(value);
        self.prune_lower();
        match self.lower.peek() {
            Some(&top) if v > top => {
                self.upper.push(Reverse(v));
                self.upper_len += 1;
            }
            _ => {
                self.lower.push(v);
                self.lower_len += 1;
            }
        }

        if let Some(old) = self.window.push(value) {
            self.retire(OrderedFloat(old));
        }
        self.rebalance();

        debug_assert!(
            self.lower_len == self.upper_len || self.lower_len == self.upper_len + 1,
            "heap balance invariant broken: {} vs {}",
            self.lower_len,
            self.upper_len
        );
    }

    /// Records an evicted value as logically gone from the heap that holds
    /// it. The live top of the lower heap decides ownership: anything at or
    /// below it has a physical instance in the lower heap.
    ///
    /// # Arguments
    ///
    /// * `old` - The value the window just evicted
    fn retire(&mut self, old: OrderedFloat<T>) {
        self.prune_lower();
        let in_lower = matches!(self.lower.peek(), Some(&top) if old <= top);
        if in_lower {
            *self.lower_gone.entry(old).or_insert(0) += 1;
            self.lower_len -= 1;
        } else {
            *self.upper_gone.entry(old).or_insert(0) += 1;
            self.upper_len -= 1;
        }
        self.prune_lower();
        self.prune_upper();
    }

    /// Restores the size invariant by moving live heap tops across.
    fn rebalance(&mut self) {
        while self.lower_len > self.upper_len + 1 {
            self.prune_lower();
            match self.lower.pop() {
                Some(v) => {
                    self.upper.push(Reverse(v));
                    self.lower_len -= 1;
                    self.upper_len += 1;
                }
                None => break,
            }
        }
        while self.lower_len < self.upper_len {
            self.prune_upper();
            match self.upper.pop() {
                Some(Reverse(v)) => {
                    self.lower.push(v);
                    self.upper_len -= 1;
                    self.lower_len += 1;
                }
                None => break,
            }
        }
        self.prune_lower();
        self.prune_upper();
    }

    /// Pops pending deletions off the lower heap's top.
    fn prune_lower(&mut self) {
        while let Some(top) = self.lower.peek().copied() {
            if !self.lower_gone.contains_key(&top) {
                break;
            }
            self.lower.pop();
            if let Some(n) = self.lower_gone.get_mut(&top) {
                *n -= 1;
                if *n == 0 {
                    self.lower_gone.remove(&top);
                }
            }
        }
    }

    /// Pops pending deletions off the upper heap's top.
    fn prune_upper(&mut self) {
        while let Some(Reverse(top)) = self.upper.peek().copied() {
            if !self.upper_gone.contains_key(&top) {
                break;
            }
            self.upper.pop();
            if let Some(n) = self.upper_gone.get_mut(&top) {
                *n -= 1;
                if *n == 0 {
                    self.upper_gone.remove(&top);
                }
            }
        }
    }

    /// Returns the current median from the pruned heap tops.
    ///
    /// # Returns
    ///
    /// * `T` - The window median, or zero when both heaps are empty
    fn median(&mut self) -> T {
        self.prune_lower();
        self.prune_upper();

        let total = self.lower_len + self.upper_len;
        if total == 0 {
            return T::zero();
        }

        let lower_top = self.lower.peek().map(|v| v.0);
        if total % 2 == 1 {
            lower_top.unwrap_or_else(T::zero)
        } else {
            let upper_top = self.upper.peek().map(|r| r.0.0);
            match lower_top.zip(upper_top) {
                Some((a, b)) => {
                    let _2 = T::one() + T::one();
                    (a + b) / _2
                }
                None => T::zero(),
            }
        }
    }

    fn reset(&mut self) {
        self.window.clear();
        self.lower.clear();
        self.upper.clear();
        self.lower_gone.clear();
        self.upper_gone.clear();
        self.lower_len = 0;
        self.upper_len = 0;
    }
}

#[derive(Debug)]
enum Mode<T: Default + Copy> {
    /// Small windows: copy, sort, read the middle
    Linear {
        window: PooledBuffer<T>,
        scratch: Vec<T>,
    },
    /// Large windows: two heaps with lazy deletion
    Heaps(TwoHeaps<T>),
}

/// Exact windowed median over the last `length` fed values.
///
/// Windows up to [`LINEAR_WINDOW_MAX`] sort a scratch copy of the pooled
/// circular buffer on demand; longer windows run the classic two-heap layout
/// with lazy deletion, O(log length) per step. Both modes apply the same
/// odd/even rule: the middle element, or the average of the two middle
/// elements.
#[derive(Debug)]
pub struct RollingMedian<T: Default + Copy> {
    mode: Mode<T>,
    length: usize,
}

impl<T> RollingMedian<T>
where
    T: Float + PrimitiveFloat + Default,
{
    /// Creates a rolling median over a window of `length` steps, renting
    /// backing storage from `pool`.
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
    /// * `Self` - The rolling median
    pub fn new(pool: &BufferPool<T>, length: usize) -> Self {
        let length = length.max(1);
        if length <= LINEAR_WINDOW_MAX {
            Self::linear(pool, length)
        } else {
            Self::heaps(pool, length)
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

    fn heaps(pool: &BufferPool<T>, length: usize) -> Self {
        Self {
            mode: Mode::Heaps(TwoHeaps::new(pool, length)),
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
            Mode::Heaps(heaps) => heaps.window.len(),
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
    /// * `&mut Self` - The rolling median
    pub fn next(&mut self, value: T) -> &mut Self {
        match &mut self.mode {
            Mode::Linear { window, .. } => {
                let _evicted = window.push(value);
            }
            Mode::Heaps(heaps) => heaps.next(value),
        }
        self
    }

    /// Returns the current window median, or zero on an empty window.
    ///
    /// Odd live counts yield the middle element; even counts the average of
    /// the two middle elements.
    ///
    /// # Returns
    ///
    /// * `T` - The window median, or zero when the window is empty
    pub fn median(&mut self) -> T {
        if self.len() == 0 {
            return T::zero();
        }
        match &mut self.mode {
            Mode::Linear { window, scratch } => {
                let n = window.len();
                window.copy_to(&mut scratch[..n]);
                sort_scratch(&mut scratch[..n]);
                median_of_sorted(&scratch[..n])
            }
            Mode::Heaps(heaps) => heaps.median(),
        }
    }

    /// Restores the median to its freshly constructed state.
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The rolling median
    pub fn reset(&mut self) -> &mut Self {
        match &mut self.mode {
            Mode::Linear { window, .. } => window.clear(),
            Mode::Heaps(heaps) => heaps.reset(),
        }
        self
    }

    /// Returns pooled storage to the pool; further feeding panics.
    pub fn release(&mut self) {
        match &mut self.mode {
            Mode::Linear { window, .. } => window.release(),
            Mode::Heaps(heaps) => heaps.window.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use assert_approx_eq::assert_approx_eq;

    fn naive_median(window: &[f64]) -> f64 {
        let mut sorted = window.to_vec();
        sort_scratch(&mut sorted);
        median_of_sorted(&sorted)
    }

    fn feed_and_collect(median: &mut RollingMedian<f64>, input: &[f64]) -> Vec<f64> {
        input
            .iter()
            .map(|&v| {
                median.next(v);
                median.median()
            })
            .collect()
    }

    #[test]
    fn test_empty_window_is_zero() {
        let pool = BufferPool::new();
        let mut small = RollingMedian::<f64>::new(&pool, 5);
        let mut large = RollingMedian::<f64>::new(&pool, 64);
        assert_eq!(small.median(), 0.0);
        assert_eq!(large.median(), 0.0);
    }

    #[test]
    fn test_reference_sequence() {
        let pool = BufferPool::new();
        let mut median = RollingMedian::new(&pool, 3);
        let input = [5.0, 1.0, 4.0, 2.0, 8.0, 3.0];
        let out = feed_and_collect(&mut median, &input);
        assert_eq!(out, vec![5.0, 3.0, 4.0, 2.0, 4.0, 3.0]);
    }

    #[test]
    fn test_odd_even_averaging_rule() {
        let pool = BufferPool::new();
        let mut median = RollingMedian::new(&pool, 4);
        median.next(1.0).next(3.0);
        assert_eq!(median.median(), 2.0);
        median.next(2.0);
        assert_eq!(median.median(), 2.0);
        median.next(4.0);
        assert_eq!(median.median(), 2.5);
    }

    #[test]
    fn test_modes_agree_at_every_step() {
        let pool = BufferPool::new();
        let input = [
            5.0, 1.0, 4.0, 4.0, 2.0, 8.0, 3.0, -1.0, 4.0, 0.0, 9.5, 9.5, -7.25, 2.0, 2.0, 6.125,
            3.0, -1.0, 8.0, 4.0,
        ];
        for length in [1, 2, 3, 5, 8, 13] {
            let mut linear = RollingMedian::linear(&pool, length);
            let mut heaps = RollingMedian::heaps(&pool, length);
            let a = feed_and_collect(&mut linear, &input);
            let b = feed_and_collect(&mut heaps, &input);
            assert_eq!(a, b, "modes diverged for length {length}");
        }
    }

    #[test]
    fn test_against_naive_recompute() {
        let pool = BufferPool::new();
        // Pseudo-random walk with repeated values to stress duplicate
        // handling in the delayed-deletion maps
        let mut input = Vec::new();
        let mut x: i64 = 7;
        for _ in 0..200 {
            x = (x * 1103515245 + 12345) % 1000;
            input.push((x % 50) as f64 / 4.0);
        }

        for length in [1, 4, 32, 33, 50] {
            let mut median = RollingMedian::new(&pool, length);
            for (i, &v) in input.iter().enumerate() {
                median.next(v);
                let lo = (i + 1).saturating_sub(length);
                assert_approx_eq!(median.median(), naive_median(&input[lo..=i]), 1e-12);
            }
        }
    }

    #[test]
    fn test_threshold_boundary_continuity() {
        // Fed no more than 32 values, windows of 32 and 33 cover the same
        // elements, so linear and heap modes must answer identically.
        let pool = BufferPool::new();
        let mut at_threshold = RollingMedian::new(&pool, LINEAR_WINDOW_MAX);
        let mut above_threshold = RollingMedian::new(&pool, LINEAR_WINDOW_MAX + 1);

        let input: Vec<f64> = (0..32).map(|i| ((i * 53) % 23) as f64 - 11.0).collect();
        let a = feed_and_collect(&mut at_threshold, &input);
        let b = feed_and_collect(&mut above_threshold, &input);
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_equal_values() {
        let pool = BufferPool::new();
        let mut median = RollingMedian::new(&pool, 40);
        for _ in 0..100 {
            median.next(7.0);
            assert_eq!(median.median(), 7.0);
        }
    }

    #[test]
    fn test_monotonic_streams() {
        let pool = BufferPool::new();
        let mut rising = RollingMedian::new(&pool, 33);
        let mut falling = RollingMedian::new(&pool, 33);
        for i in 0..120 {
            rising.next(i as f64);
            falling.next(-(i as f64));
        }
        // Window holds 87..=119 rising, middle is 103
        assert_eq!(rising.median(), 103.0);
        assert_eq!(falling.median(), -103.0);
    }

    #[test]
    fn test_reset() {
        let pool = BufferPool::new();
        let mut median = RollingMedian::new(&pool, 40);
        for v in [9.0, 2.0, 5.0] {
            median.next(v);
        }
        median.reset();
        assert_eq!(median.len(), 0);
        assert_eq!(median.median(), 0.0);

        median.next(1.0).next(2.0);
        assert_eq!(median.median(), 1.5);
    }

    #[test]
    #[should_panic(expected = "used after release")]
    fn test_feed_after_release_panics() {
        let pool = BufferPool::new();
        let mut median = RollingMedian::<f64>::new(&pool, 40);
        median.release();
        median.next(1.0);
    }
}
