#![warn(missing_docs)]
//! gfxtest Statistics Engine
//!
//! Incremental sample collection for benchmark and test loops:
//! - Fixed-capacity accumulator of integer or float samples
//! - Welford one-pass mean and variance, with Bessel's correction toggle
//! - Order-statistic estimators: quartiles, median, IQR, trimean, IQM
//! - Serializable summaries for reports

mod accumulator;
mod percentiles;
mod summary;

pub use accumulator::{Stats, StatsError};
pub use percentiles::{compute_percentile, interpolate_sorted};
pub use summary::Summary;
