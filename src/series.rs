use ahash::RandomState;
use hashbrown::HashMap;
use num_traits::Float;

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;

use core::cell::{Cell, RefCell};

/// The OHLCV-derived series kinds the cache can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    /// `(high + low) / 2`
    Midpoint,
    /// `(high + low + close) / 3`
    Typical,
    /// `(open + high + low + close) / 4`
    FullTypical,
    /// `(high + low + 2 * close) / 4`
    WeightedClose,
    /// `(open + close) / 2`
    AveragePrice,
    /// `max(high - low, |high - prev close|, |low - prev close|)`, with the
    /// previous close taken as zero on the first bar
    TrueRange,
}

impl DerivedKind {
    const COUNT: usize = 6;

    const fn slot(self) -> usize {
        match self {
            Self::Midpoint => 0,
            Self::Typical => 1,
            Self::FullTypical => 2,
            Self::WeightedClose => 3,
            Self::AveragePrice => 4,
            Self::TrueRange => 5,
        }
    }
}

/// An owning price series: fixed-length open/high/low/close arrays plus the
/// per-owner caching knobs the derived-series cache consults.
///
/// Wrap it in an [`Rc`] to share it across indicators; the cache itself only
/// ever holds weak handles, so dropping the last `Rc` reclaims the series no
/// matter what has been cached against it.
#[derive(Debug)]
pub struct PriceSeries<T> {
    open: Box<[T]>,
    high: Box<[T]>,
    low: Box<[T]>,
    close: Box<[T]>,
    /// Caller-supplied replacement input; while set, derived series are
    /// computed fresh on every request and never cached
    override_input: RefCell<Option<Rc<[T]>>>,
    /// Per-owner cache opt-out
    cache_enabled: Cell<bool>,
    /// Bumped whenever the override input is set, replaced or cleared;
    /// lets the cache detect shape changes without holding the owner
    input_epoch: Cell<u64>,
}

impl<T: Float> PriceSeries<T> {
    /// Creates a series from equal-length open/high/low/close arrays.
    ///
    /// Panics if the four arrays differ in length.
    ///
    /// # Arguments
    ///
    /// * `open` - The open prices
    /// * `high` - The high prices
    /// * `low` - The low prices
    /// * `close` - The close prices
    ///
    /// # Returns
    ///
    /// * `Self` - The price series
    pub fn new(open: Vec<T>, high: Vec<T>, low: Vec<T>, close: Vec<T>) -> Self {
        assert!(
            open.len() == high.len() && high.len() == low.len() && low.len() == close.len(),
            "open/high/low/close arrays must have equal length"
        );
        Self {
            open: open.into_boxed_slice(),
            high: high.into_boxed_slice(),
            low: low.into_boxed_slice(),
            close: close.into_boxed_slice(),
            override_input: RefCell::new(None),
            cache_enabled: Cell::new(true),
            input_epoch: Cell::new(0),
        }
    }

    /// Returns the number of bars
    ///
    /// # Returns
    ///
    /// * `usize` - The number of bars
    #[inline]
    pub fn count(&self) -> usize {
        self.open.len()
    }

    /// Returns the open prices
    ///
    /// # Returns
    ///
    /// * `&[T]` - The open prices
    #[inline]
    pub fn open(&self) -> &[T] {
        &self.open
    }

    /// Returns the high prices
    ///
    /// # Returns
    ///
    /// * `&[T]` - The high prices
    #[inline]
    pub fn high(&self) -> &[T] {
        &self.high
    }

    /// Returns the low prices
    ///
    /// # Returns
    ///
    /// * `&[T]` - The low prices
    #[inline]
    pub fn low(&self) -> &[T] {
        &self.low
    }

    /// Returns the close prices
    ///
    /// # Returns
    ///
    /// * `&[T]` - The close prices
    #[inline]
    pub fn close(&self) -> &[T] {
        &self.close
    }

    /// Replaces the override input, bumping the input epoch.
    ///
    /// While an override is active every derived-series request bypasses the
    /// cache.
    ///
    /// # Arguments
    ///
    /// * `input` - The replacement input series
    pub fn set_override_input(&self, input: Rc<[T]>) {
        *self.override_input.borrow_mut() = Some(input);
        self.input_epoch.set(self.input_epoch.get() + 1);
    }

    /// Clears the override input, bumping the input epoch.
    pub fn clear_override_input(&self) {
        *self.override_input.borrow_mut() = None;
        self.input_epoch.set(self.input_epoch.get() + 1);
    }

    /// Returns true while an override input is active
    ///
    /// # Returns
    ///
    /// * `bool` - True while an override input is active
    #[inline]
    pub fn has_override_input(&self) -> bool {
        self.override_input.borrow().is_some()
    }

    /// Returns the active override input, if any
    ///
    /// # Returns
    ///
    /// * `Option<Rc<[T]>>` - The active override input, if any
    pub fn override_input(&self) -> Option<Rc<[T]>> {
        self.override_input.borrow().clone()
    }

    /// Enables or disables derived-series caching for this owner.
    ///
    /// # Arguments
    ///
    /// * `enabled` - True to allow the cache to store entries for this owner
    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache_enabled.set(enabled);
    }

    /// Returns true if derived-series caching is enabled for this owner
    ///
    /// # Returns
    ///
    /// * `bool` - True if caching is enabled
    #[inline]
    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled.get()
    }

    #[inline]
    fn input_epoch(&self) -> u64 {
        self.input_epoch.get()
    }

    /// Computes one derived series in a single pass over the bars.
    ///
    /// # Arguments
    ///
    /// * `kind` - The derived series to compute
    ///
    /// # Returns
    ///
    /// * `Rc<[T]>` - The computed series, one value per bar
    fn compute(&self, kind: DerivedKind) -> Rc<[T]> {
        let n = self.count();
        let mut out = Vec::with_capacity(n);
        let (o, h, l, c) = (self.open(), self.high(), self.low(), self.close());

        let _2 = T::one() + T::one();
        let _3 = _2 + T::one();
        let _4 = _3 + T::one();

        match kind {
            DerivedKind::Midpoint => {
                for i in 0..n {
                    out.push((h[i] + l[i]) / _2);
                }
            }
            DerivedKind::Typical => {
                for i in 0..n {
                    out.push((h[i] + l[i] + c[i]) / _3);
                }
            }
            DerivedKind::FullTypical => {
                for i in 0..n {
                    out.push((o[i] + h[i] + l[i] + c[i]) / _4);
                }
            }
            DerivedKind::WeightedClose => {
                for i in 0..n {
                    out.push((h[i] + l[i] + c[i] + c[i]) / _4);
                }
            }
            DerivedKind::AveragePrice => {
                for i in 0..n {
                    out.push((o[i] + c[i]) / _2);
                }
            }
            DerivedKind::TrueRange => {
                let mut prev_close = T::zero();
                for i in 0..n {
                    let range = h[i] - l[i];
                    let tr = range
                        .max((h[i] - prev_close).abs())
                        .max((l[i] - prev_close).abs());
                    out.push(tr);
                    prev_close = c[i];
                }
            }
        }
        Rc::from(out)
    }
}

/// One owner's cached derived series plus the state needed to validate them
#[derive(Debug)]
struct CacheSlot<T> {
    /// Weak handle so the cache never keeps the owner alive
    owner: Weak<PriceSeries<T>>,
    /// Input epoch the entries were computed at
    epoch: u64,
    entries: [Option<Rc<[T]>>; DerivedKind::COUNT],
}

/// A memoization cache for OHLCV-derived series, keyed by owner identity.
///
/// Many indicators consume the same derived input (typical price, true
/// range, ...) of the same series; this cache computes each `(owner, kind)`
/// series once and hands out cheap `Rc` clones afterwards.
///
/// Entries associate with their owner through a [`Weak`] handle plus the
/// owner's pointer identity, so the cache never extends an owner's lifetime:
/// once the last strong handle drops, the slot is dead and is evicted on the
/// next touch (or via [`purge_stale`](DerivedCache::purge_stale)). A request
/// bypasses the cache entirely while the owner has caching disabled or holds
/// an active override input, and a bumped input epoch invalidates whatever
/// was cached before the override changed.
///
/// The cache is a cheap cloneable handle; clones share the same table.
#[derive(Debug)]
pub struct DerivedCache<T> {
    table: Rc<RefCell<HashMap<usize, CacheSlot<T>, RandomState>>>,
}

impl<T> Clone for DerivedCache<T> {
    fn clone(&self) -> Self {
        Self {
            table: Rc::clone(&self.table),
        }
    }
}

impl<T> Default for DerivedCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DerivedCache<T> {
    /// Creates an empty cache.
    ///
    /// # Returns
    ///
    /// * `Self` - The derived-series cache
    pub fn new() -> Self {
        Self {
            table: Rc::new(RefCell::new(HashMap::with_hasher(RandomState::new()))),
        }
    }

    /// Returns the number of owners with live cached entries
    ///
    /// # Returns
    ///
    /// * `usize` - The number of owner slots in the table
    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    /// Drops every slot whose owner has been reclaimed.
    pub fn purge_stale(&self) {
        self.table
            .borrow_mut()
            .retain(|_, slot| slot.owner.strong_count() > 0);
    }
}

impl<T: Float> DerivedCache<T> {
    /// Returns the derived series of `kind` for `owner`, computing and
    /// caching it on first request.
    ///
    /// Computes without caching while the owner has caching disabled or an
    /// override input active.
    ///
    /// # Arguments
    ///
    /// * `owner` - The price series the derived series belongs to
    /// * `kind` - The derived series to produce
    ///
    /// # Returns
    ///
    /// * `Rc<[T]>` - The derived series, one value per bar
    pub fn get(&self, owner: &Rc<PriceSeries<T>>, kind: DerivedKind) -> Rc<[T]> {
        if !owner.cache_enabled() || owner.has_override_input() {
            return owner.compute(kind);
        }

        let key = Rc::as_ptr(owner) as usize;
        let epoch = owner.input_epoch();
        let mut table = self.table.borrow_mut();

        let valid = table.get(&key).is_some_and(|slot| {
            slot.epoch == epoch
                && slot
                    .owner
                    .upgrade()
                    .is_some_and(|live| Rc::ptr_eq(&live, owner))
        });
        if !valid {
            table.insert(
                key,
                CacheSlot {
                    owner: Rc::downgrade(owner),
                    epoch,
                    entries: Default::default(),
                },
            );
        }

        // Slot was just validated or inserted
        match table.get_mut(&key) {
            Some(slot) => {
                if let Some(hit) = &slot.entries[kind.slot()] {
                    return Rc::clone(hit);
                }
                let computed = owner.compute(kind);
                slot.entries[kind.slot()] = Some(Rc::clone(&computed));
                computed
            }
            None => owner.compute(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn sample_series() -> Rc<PriceSeries<f64>> {
        Rc::new(PriceSeries::new(
            vec![10.0, 11.0, 12.0],
            vec![12.0, 13.0, 15.0],
            vec![9.0, 10.0, 11.0],
            vec![11.0, 12.0, 14.0],
        ))
    }

    #[test]
    #[should_panic(expected = "equal length")]
    fn test_mismatched_arrays_panic() {
        PriceSeries::new(vec![1.0], vec![1.0, 2.0], vec![1.0], vec![1.0]);
    }

    #[test]
    fn test_formulas() {
        let cache = DerivedCache::new();
        let series = sample_series();

        let midpoint = cache.get(&series, DerivedKind::Midpoint);
        assert_eq!(&midpoint[..], &[10.5, 11.5, 13.0]);

        let typical = cache.get(&series, DerivedKind::Typical);
        for (got, want) in typical.iter().zip([32.0 / 3.0, 35.0 / 3.0, 40.0 / 3.0]) {
            assert_approx_eq!(got, want, 1e-12);
        }

        let full = cache.get(&series, DerivedKind::FullTypical);
        assert_eq!(&full[..], &[10.5, 11.5, 13.0]);

        let weighted = cache.get(&series, DerivedKind::WeightedClose);
        assert_eq!(&weighted[..], &[10.75, 11.75, 13.5]);

        let average = cache.get(&series, DerivedKind::AveragePrice);
        assert_eq!(&average[..], &[10.5, 11.5, 13.0]);
    }

    #[test]
    fn test_true_range_uses_zero_seed_close() {
        let cache = DerivedCache::new();
        let series = sample_series();

        let tr = cache.get(&series, DerivedKind::TrueRange);
        // First bar: prev close is zero, |high - 0| dominates
        assert_eq!(tr[0], 12.0);
        // Second bar: max(13-10, |13-11|, |10-11|) = 3
        assert_eq!(tr[1], 3.0);
        // Third bar: max(15-11, |15-12|, |11-12|) = 4
        assert_eq!(tr[2], 4.0);
    }

    #[test]
    fn test_repeated_gets_share_one_computation() {
        let cache = DerivedCache::new();
        let series = sample_series();

        let a = cache.get(&series, DerivedKind::Typical);
        let b = cache.get(&series, DerivedKind::Typical);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_opt_out_bypasses() {
        let cache = DerivedCache::new();
        let series = sample_series();
        series.set_cache_enabled(false);

        let a = cache.get(&series, DerivedKind::Typical);
        let b = cache.get(&series, DerivedKind::Typical);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(&a[..], &b[..]);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_override_input_bypasses_and_invalidates() {
        let cache = DerivedCache::new();
        let series = sample_series();

        let cached = cache.get(&series, DerivedKind::Midpoint);
        assert_eq!(cache.len(), 1);

        series.set_override_input(Rc::from(vec![1.0, 2.0, 3.0]));
        assert!(series.has_override_input());
        let bypassed = cache.get(&series, DerivedKind::Midpoint);
        assert!(!Rc::ptr_eq(&cached, &bypassed));

        // Clearing the override bumps the epoch again: the old entry is
        // stale and must be recomputed, not resurrected
        series.clear_override_input();
        let fresh = cache.get(&series, DerivedKind::Midpoint);
        assert!(!Rc::ptr_eq(&cached, &fresh));
        assert_eq!(&cached[..], &fresh[..]);

        // And from here on the recomputed entry is served again
        let again = cache.get(&series, DerivedKind::Midpoint);
        assert!(Rc::ptr_eq(&fresh, &again));
    }

    #[test]
    fn test_cache_does_not_keep_owner_alive() {
        let cache = DerivedCache::new();
        let series = sample_series();
        let _ = cache.get(&series, DerivedKind::Typical);
        assert_eq!(cache.len(), 1);

        let weak = Rc::downgrade(&series);
        drop(series);
        assert!(weak.upgrade().is_none(), "cache kept the owner alive");

        cache.purge_stale();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_dead_slot_is_evicted_on_reuse() {
        let cache = DerivedCache::new();

        let first = sample_series();
        let _ = cache.get(&first, DerivedKind::Midpoint);
        drop(first);

        // A new owner may land on the same table key if the allocator reuses
        // the address; the weak-handle check forces a fresh slot either way
        let second = sample_series();
        let series = cache.get(&second, DerivedKind::Midpoint);
        assert_eq!(&series[..], &[10.5, 11.5, 13.0]);
    }

    #[test]
    fn test_shared_handles_share_the_table() {
        let cache = DerivedCache::new();
        let clone = cache.clone();
        let series = sample_series();

        let a = cache.get(&series, DerivedKind::WeightedClose);
        let b = clone.get(&series, DerivedKind::WeightedClose);
        assert!(Rc::ptr_eq(&a, &b));
    }
}
