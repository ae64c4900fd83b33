/// Window length at or below which the dual-moded primitives pick their
/// linear implementation: for this few elements a straight rescan or
/// scratch-sort beats deque, heap, or tree bookkeeping and avoids their
/// allocations.
///
/// The split is a tunable performance parameter, not a semantic one - both
/// modes of every primitive answer identically at any setting.
pub const LINEAR_WINDOW_MAX: usize = 32;

mod sum;
pub use sum::RollingSum;

mod extrema;
pub use extrema::RollingExtrema;

mod median;
pub use median::RollingMedian;

mod rank;
pub use rank::RollingRank;
