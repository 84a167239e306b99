//! Summary Statistics
//!
//! A plain snapshot of every estimator an accumulator exposes, suitable for
//! serialization into reports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptive statistics of one sample set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of samples
    pub count: usize,
    /// Whether variance was computed as population variance
    pub population: bool,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// `max - min`
    pub range: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Variance (sample or population)
    pub variance: f64,
    /// Standard deviation
    pub std_dev: f64,
    /// First quartile
    pub q1: f64,
    /// Second quartile
    pub median: f64,
    /// Third quartile
    pub q3: f64,
    /// Interquartile range
    pub iqr: f64,
    /// Interquartile mean
    pub iqm: f64,
    /// Tukey's trimean
    pub trimean: f64,
}

impl Summary {
    /// Coefficient of variation in percent (0.0 when the mean is zero)
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            (self.std_dev / self.mean) * 100.0
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "samples: {}", self.count)?;
        writeln!(
            f,
            "min: {:.6}  max: {:.6}  range: {:.6}",
            self.min, self.max, self.range
        )?;
        writeln!(
            f,
            "mean: {:.6}  std_dev: {:.6}  cv: {:.2}%",
            self.mean,
            self.std_dev,
            self.coefficient_of_variation()
        )?;
        writeln!(
            f,
            "q1: {:.6}  median: {:.6}  q3: {:.6}  iqr: {:.6}",
            self.q1, self.median, self.q3, self.iqr
        )?;
        write!(f, "trimean: {:.6}  iqm: {:.6}", self.trimean, self.iqm)
    }
}
