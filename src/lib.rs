#![doc = include_str!("../README.md")]
#![no_std]
#![deny(
    unsafe_code,
    unused_imports,
    unused_variables,
    unused_must_use,
    missing_docs,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented
)]
#![allow(clippy::just_underscores_and_digits, clippy::len_without_is_empty)]

#[macro_use]
extern crate alloc;

pub(crate) type Kbn<T> = compensated_summation::KahanBabuskaNeumaier<T>;

mod utils;
pub use utils::Treap;
pub(crate) use utils::helper;

mod pool;
pub use pool::{BufferPool, PooledBuffer};

mod rolling;
pub use rolling::{LINEAR_WINDOW_MAX, RollingExtrema, RollingMedian, RollingRank, RollingSum};

mod series;
pub use series::{DerivedCache, DerivedKind, PriceSeries};
