//! Sample Accumulator
//!
//! Fixed-capacity collector of unsigned-integer or floating-point samples.
//!
//! - Mean and variance use Welford's one-pass update, always in `f64`
//! - Min/max are tracked at push time, exact `u64` values are kept while the
//!   storage is integer
//! - Quartiles, median, IQR, IQM and trimean read a lazily sorted copy
//!
//! Derived values are cached and the caches are dropped on every push.
//! Changing the population flag only drops the mean/variance cache.

use crate::percentiles::interpolate_sorted;
use crate::summary::Summary;
use std::cell::OnceCell;
use thiserror::Error;

/// Errors returned when pushing samples
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// The accumulator already holds `capacity` samples.
    ///
    /// This is a precondition violation of the caller: the capacity is fixed
    /// at construction and pushing past it never succeeds later.
    #[error("sample capacity exceeded ({capacity} samples)")]
    CapacityExceeded {
        /// Capacity given at construction
        capacity: usize,
    },
    /// NaN or infinity pushed as a float sample
    #[error("non-finite sample: {0}")]
    NonFinite(f64),
}

#[derive(Debug, Clone)]
enum Samples {
    Integer(Vec<u64>),
    Float(Vec<f64>),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Samples::Integer(values) => values.len(),
            Samples::Float(values) => values.len(),
        }
    }

    fn to_f64(&self) -> Vec<f64> {
        match self {
            Samples::Integer(values) => values.iter().map(|&v| v as f64).collect(),
            Samples::Float(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Moments {
    mean: f64,
    variance: f64,
}

/// Streaming sample accumulator
///
/// # Examples
///
/// ```
/// # use gfxtest_stats::Stats;
/// let mut stats = Stats::with_capacity(5);
/// stats.push_array(&[2, 4, 6, 8, 10]).unwrap();
/// assert_eq!(stats.mean(), 6.0);
/// assert_eq!(stats.median(), 6.0);
/// ```
#[derive(Debug, Clone)]
pub struct Stats {
    samples: Samples,
    capacity: usize,
    is_population: bool,
    min: f64,
    max: f64,
    min_u64: u64,
    max_u64: u64,
    moments: OnceCell<Moments>,
    sorted: OnceCell<Vec<f64>>,
}

impl Stats {
    /// Create an accumulator holding up to `capacity` samples.
    ///
    /// Storage starts as integer and switches to float on the first
    /// [`push_float`](Self::push_float).
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new_with(Samples::Integer(Vec::with_capacity(capacity)), capacity)
    }

    /// Create an accumulator whose storage is float from the start.
    pub fn with_float_capacity(capacity: usize) -> Self {
        Self::new_with(Samples::Float(Vec::with_capacity(capacity)), capacity)
    }

    fn new_with(samples: Samples, capacity: usize) -> Self {
        Self {
            samples,
            capacity,
            is_population: false,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            min_u64: u64::MAX,
            max_u64: 0,
            moments: OnceCell::new(),
            sorted: OnceCell::new(),
        }
    }

    /// Number of samples pushed so far
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample was pushed yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity fixed at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the samples are stored as floats
    pub fn is_float(&self) -> bool {
        matches!(self.samples, Samples::Float(_))
    }

    /// Samples in push order, converted to `f64`
    pub fn values(&self) -> Vec<f64> {
        self.samples.to_f64()
    }

    /// Append an integer sample.
    pub fn push(&mut self, value: u64) -> Result<(), StatsError> {
        self.check_room(1)?;
        match &mut self.samples {
            Samples::Integer(values) => values.push(value),
            Samples::Float(values) => values.push(value as f64),
        }
        self.min_u64 = self.min_u64.min(value);
        self.max_u64 = self.max_u64.max(value);
        self.track(value as f64);
        Ok(())
    }

    /// Append a floating-point sample.
    ///
    /// Integer samples already stored are converted to float first.
    pub fn push_float(&mut self, value: f64) -> Result<(), StatsError> {
        if !value.is_finite() {
            return Err(StatsError::NonFinite(value));
        }
        self.check_room(1)?;

        if let Samples::Integer(values) = &self.samples {
            let mut promoted = Vec::with_capacity(self.capacity);
            promoted.extend(values.iter().map(|&v| v as f64));
            self.samples = Samples::Float(promoted);
        }
        if let Samples::Float(values) = &mut self.samples {
            values.push(value);
        }
        self.track(value);
        Ok(())
    }

    /// Append every value of `values`; nothing is stored if they do not all fit.
    pub fn push_array(&mut self, values: &[u64]) -> Result<(), StatsError> {
        self.check_room(values.len())?;
        for &value in values {
            self.push(value)?;
        }
        Ok(())
    }

    /// Float counterpart of [`push_array`](Self::push_array).
    pub fn push_float_array(&mut self, values: &[f64]) -> Result<(), StatsError> {
        self.check_room(values.len())?;
        if let Some(&bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(StatsError::NonFinite(bad));
        }
        for &value in values {
            self.push_float(value)?;
        }
        Ok(())
    }

    fn check_room(&self, additional: usize) -> Result<(), StatsError> {
        if self.len() + additional > self.capacity {
            return Err(StatsError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn track(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.moments.take();
        self.sorted.take();
    }

    /// Switch between population (`M2 / n`) and sample (`M2 / (n - 1)`)
    /// variance.
    pub fn set_population(&mut self, full_population: bool) {
        if self.is_population == full_population {
            return;
        }
        self.is_population = full_population;
        self.moments.take();
    }

    /// Whether the samples are treated as the full population
    pub fn is_population(&self) -> bool {
        self.is_population
    }

    /// Whether mean/variance are currently cached
    pub fn moments_cached(&self) -> bool {
        self.moments.get().is_some()
    }

    /// Whether the sorted view is currently cached
    pub fn sorted_cached(&self) -> bool {
        self.sorted.get().is_some()
    }

    fn moments(&self) -> Moments {
        *self.moments.get_or_init(|| {
            let mut mean = 0.0;
            let mut m2 = 0.0;
            let mut welford = |i: usize, x: f64| {
                let delta = x - mean;
                mean += delta / (i + 1) as f64;
                m2 += delta * (x - mean);
            };
            match &self.samples {
                Samples::Integer(values) => {
                    values.iter().enumerate().for_each(|(i, &v)| welford(i, v as f64))
                }
                Samples::Float(values) => {
                    values.iter().enumerate().for_each(|(i, &v)| welford(i, v))
                }
            }

            let n = self.len();
            let variance = if n == 0 {
                0.0
            } else if !self.is_population && n > 1 {
                m2 / (n - 1) as f64
            } else {
                m2 / n as f64
            };

            Moments { mean, variance }
        })
    }

    fn sorted(&self) -> &[f64] {
        self.sorted.get_or_init(|| {
            let mut sorted = self.samples.to_f64();
            sorted.sort_by(f64::total_cmp);
            sorted
        })
    }

    /// Arithmetic mean (0.0 when empty)
    pub fn mean(&self) -> f64 {
        self.moments().mean
    }

    /// Sample or population variance depending on [`is_population`](Self::is_population)
    pub fn variance(&self) -> f64 {
        self.moments().variance
    }

    /// Square root of the variance
    pub fn std_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Smallest sample (0.0 when empty)
    pub fn min(&self) -> f64 {
        if self.is_empty() { 0.0 } else { self.min }
    }

    /// Largest sample (0.0 when empty)
    pub fn max(&self) -> f64 {
        if self.is_empty() { 0.0 } else { self.max }
    }

    /// `max - min`
    pub fn range(&self) -> f64 {
        self.max() - self.min()
    }

    /// Exact smallest sample, while the storage is integer
    pub fn min_u64(&self) -> Option<u64> {
        match &self.samples {
            Samples::Integer(values) if !values.is_empty() => Some(self.min_u64),
            _ => None,
        }
    }

    /// Exact largest sample, while the storage is integer
    pub fn max_u64(&self) -> Option<u64> {
        match &self.samples {
            Samples::Integer(values) if !values.is_empty() => Some(self.max_u64),
            _ => None,
        }
    }

    /// First quartile, median and third quartile
    pub fn quartiles(&self) -> (f64, f64, f64) {
        let sorted = self.sorted();
        (
            interpolate_sorted(sorted, 0.25),
            interpolate_sorted(sorted, 0.50),
            interpolate_sorted(sorted, 0.75),
        )
    }

    /// Value at `percentile` (0 to 100) of the sorted samples
    pub fn percentile(&self, percentile: f64) -> f64 {
        interpolate_sorted(self.sorted(), percentile / 100.0)
    }

    /// Second quartile
    pub fn median(&self) -> f64 {
        self.quartiles().1
    }

    /// Interquartile range, `q3 - q1`
    pub fn iqr(&self) -> f64 {
        let (q1, _, q3) = self.quartiles();
        q3 - q1
    }

    /// Tukey's trimean, `(q1 + 2 * q2 + q3) / 4`
    pub fn trimean(&self) -> f64 {
        let (q1, q2, q3) = self.quartiles();
        (q1 + 2.0 * q2 + q3) / 4.0
    }

    /// Interquartile mean.
    ///
    /// Sorted sample `i` covers `[i, i + 1)`; it is weighted by its overlap with
    /// the central half `[n / 4, 3n / 4)`.
    pub fn iqm(&self) -> f64 {
        let sorted = self.sorted();
        if sorted.is_empty() {
            return 0.0;
        }

        let n = sorted.len() as f64;
        let (lower, upper) = (n / 4.0, 3.0 * n / 4.0);
        let total: f64 = sorted
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                let start = (i as f64).max(lower);
                let end = ((i + 1) as f64).min(upper);
                (end - start).max(0.0) * value
            })
            .sum();

        total / (upper - lower)
    }

    /// Snapshot of every estimator
    pub fn summary(&self) -> Summary {
        let (q1, median, q3) = self.quartiles();
        Summary {
            count: self.len(),
            population: self.is_population,
            min: self.min(),
            max: self.max(),
            range: self.range(),
            mean: self.mean(),
            variance: self.variance(),
            std_dev: self.std_deviation(),
            q1,
            median,
            q3,
            iqr: q3 - q1,
            iqm: self.iqm(),
            trimean: (q1 + 2.0 * median + q3) / 4.0,
        }
    }
}
