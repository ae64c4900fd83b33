use num_traits::Float;

use crate::pool::{BufferPool, PooledBuffer};
use crate::utils::{Max, Min, MonotonicQueue};

use super::LINEAR_WINDOW_MAX;

#[derive(Debug)]
enum Mode<T: Default + Copy> {
    /// Small windows: rescanning a handful of elements beats deque
    /// bookkeeping and allocates nothing beyond the pooled block.
    Linear {
        window: PooledBuffer<T>,
        min: T,
        max: T,
    },
    /// Large windows: one monotonic deque per extremum, O(1) amortized.
    Deque {
        min: MonotonicQueue<T, Min>,
        max: MonotonicQueue<T, Max>,
    },
}

/// Windowed minimum and maximum over the last `length` fed values.
///
/// The operating mode is picked once at construction: windows up to
/// [`LINEAR_WINDOW_MAX`] rescan a pooled circular buffer on every step,
/// longer windows maintain two monotonic deques. Both modes answer
/// identically; the split is purely a performance choice.
#[derive(Debug)]
pub struct RollingExtrema<T: Default + Copy> {
    mode: Mode<T>,
    length: usize,
    steps: usize,
}

impl<T: Float + Default> RollingExtrema<T> {
    /// Creates a rolling extrema tracker over a window of `length` steps,
    /// renting any backing storage from `pool`.
    ///
    /// A length below 1 is clamped to 1.
    ///
    /// # Arguments
    ///
    /// * `pool` - The buffer pool backing linear-mode window storage
    /// * `length` - The window length
    ///
    /// # Returns
    ///
    /// * `Self` - The rolling extrema tracker
    pub fn new(pool: &BufferPool<T>, length: usize) -> Self {
        let length = length.max(1);
        if length <= LINEAR_WINDOW_MAX {
            Self::linear(pool, length)
        } else {
            Self::deque(length)
        }
    }

    fn linear(pool: &BufferPool<T>, length: usize) -> Self {
        Self {
            mode: Mode::Linear {
                window: PooledBuffer::new(pool, length),
                min: T::zero(),
                max: T::zero(),
            },
            length,
            steps: 0,
        }
    }

    fn deque(length: usize) -> Self {
        Self {
            mode: Mode::Deque {
                min: MonotonicQueue::new(length),
                max: MonotonicQueue::new(length),
            },
            length,
            steps: 0,
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
            Mode::Deque { .. } => self.steps.min(self.length),
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
    /// * `&mut Self` - The rolling extrema tracker
    pub fn next(&mut self, value: T) -> &mut Self {
        match &mut self.mode {
            Mode::Linear { window, min, max } => {
                let _evicted = window.push(value);
                let mut lo = value;
                let mut hi = value;
                for &v in window.iter() {
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
                *min = lo;
                *max = hi;
            }
            Mode::Deque { min, max } => {
                min.push(value);
                max.push(value);
            }
        }
        self.steps += 1;
        self
    }

    /// Returns the window minimum, or zero before any value has been fed.
    ///
    /// # Returns
    ///
    /// * `T` - The window minimum
    pub fn min(&self) -> T {
        match &self.mode {
            Mode::Linear { window, min, .. } => {
                if window.len() == 0 {
                    T::zero()
                } else {
                    *min
                }
            }
            Mode::Deque { min, .. } => min.front().unwrap_or_else(T::zero),
        }
    }

    /// Returns the window maximum, or zero before any value has been fed.
    ///
    /// # Returns
    ///
    /// * `T` - The window maximum
    pub fn max(&self) -> T {
        match &self.mode {
            Mode::Linear { window, max, .. } => {
                if window.len() == 0 {
                    T::zero()
                } else {
                    *max
                }
            }
            Mode::Deque { max, .. } => max.front().unwrap_or_else(T::zero),
        }
    }

    /// Restores the tracker to its freshly constructed state.
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The rolling extrema tracker
    pub fn reset(&mut self) -> &mut Self {
        match &mut self.mode {
            Mode::Linear { window, min, max } => {
                window.clear();
                *min = T::zero();
                *max = T::zero();
            }
            Mode::Deque { min, max } => {
                min.reset();
                max.reset();
            }
        }
        self.steps = 0;
        self
    }

    /// Returns pooled storage to the pool; further feeding panics.
    ///
    /// Deque-mode trackers hold no pooled storage, for them this is a no-op.
    pub fn release(&mut self) {
        if let Mode::Linear { window, .. } = &mut self.mode {
            window.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn feed_and_collect(tracker: &mut RollingExtrema<f64>, input: &[f64]) -> Vec<(f64, f64)> {
        input
            .iter()
            .map(|&v| {
                tracker.next(v);
                (tracker.min(), tracker.max())
            })
            .collect()
    }

    #[test]
    fn test_empty_window_is_zero() {
        let pool = BufferPool::new();
        let linear = RollingExtrema::<f64>::new(&pool, 3);
        let deque = RollingExtrema::<f64>::new(&pool, 64);
        assert_eq!((linear.min(), linear.max()), (0.0, 0.0));
        assert_eq!((deque.min(), deque.max()), (0.0, 0.0));
    }

    #[test]
    fn test_mode_split_at_threshold() {
        let pool = BufferPool::new();
        let small = RollingExtrema::<f64>::new(&pool, LINEAR_WINDOW_MAX);
        let large = RollingExtrema::<f64>::new(&pool, LINEAR_WINDOW_MAX + 1);
        assert!(matches!(small.mode, Mode::Linear { .. }));
        assert!(matches!(large.mode, Mode::Deque { .. }));
    }

    #[test]
    fn test_reference_sequence() {
        let pool = BufferPool::new();
        let mut tracker = RollingExtrema::new(&pool, 3);
        let input = [5.0, 1.0, 4.0, 2.0, 8.0, 3.0];
        let max: Vec<f64> = input
            .iter()
            .map(|&v| {
                tracker.next(v);
                tracker.max()
            })
            .collect();
        assert_eq!(max, vec![5.0, 5.0, 5.0, 4.0, 8.0, 8.0]);
    }

    #[test]
    fn test_modes_agree_at_every_step() {
        let pool = BufferPool::new();
        let input = [
            2.5, -1.0, 7.0, 7.0, 3.3, -9.2, 0.0, 4.1, 4.1, -1.0, 12.6, 5.5, 5.5, -3.3, 8.8,
        ];
        for length in [1, 2, 3, 5, 8] {
            let mut linear = RollingExtrema::linear(&pool, length);
            let mut deque = RollingExtrema::deque(length);
            let a = feed_and_collect(&mut linear, &input);
            let b = feed_and_collect(&mut deque, &input);
            assert_eq!(a, b, "modes diverged for length {length}");
        }
    }

    #[test]
    fn test_against_naive_window_scan() {
        let pool = BufferPool::new();
        let input = [
            2.5, -1.0, 7.0, 7.0, 3.3, -9.2, 0.0, 4.1, 4.1, -1.0, 12.6, 5.5, 5.5, -3.3, 8.8,
        ];
        for length in [1, 2, 4, 40] {
            let mut tracker = RollingExtrema::new(&pool, length);
            for (i, &v) in input.iter().enumerate() {
                tracker.next(v);
                let lo = (i + 1).saturating_sub(length);
                let naive_min = input[lo..=i].iter().copied().fold(f64::INFINITY, f64::min);
                let naive_max = input[lo..=i]
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                assert_eq!(tracker.min(), naive_min, "min, length {length} step {i}");
                assert_eq!(tracker.max(), naive_max, "max, length {length} step {i}");
            }
        }
    }

    #[test]
    fn test_threshold_boundary_continuity() {
        // Fed no more than 32 values, windows of 32 and 33 cover the same
        // elements, so the two modes must answer identically throughout.
        let pool = BufferPool::new();
        let mut at_threshold = RollingExtrema::new(&pool, LINEAR_WINDOW_MAX);
        let mut above_threshold = RollingExtrema::new(&pool, LINEAR_WINDOW_MAX + 1);

        let input: Vec<f64> = (0..32).map(|i| ((i * 37) % 19) as f64 - 9.0).collect();
        let a = feed_and_collect(&mut at_threshold, &input);
        let b = feed_and_collect(&mut above_threshold, &input);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reset() {
        let pool = BufferPool::new();
        let mut tracker = RollingExtrema::new(&pool, 3);
        tracker.next(5.0).next(1.0);
        tracker.reset();
        assert_eq!(tracker.len(), 0);
        assert_eq!(tracker.min(), 0.0);
        tracker.next(2.0);
        assert_eq!((tracker.min(), tracker.max()), (2.0, 2.0));
    }

    #[test]
    #[should_panic(expected = "used after release")]
    fn test_feed_after_release_panics() {
        let pool = BufferPool::new();
        let mut tracker = RollingExtrema::new(&pool, 3);
        tracker.release();
        tracker.next(1.0);
    }
}
