//! Percentile Computation
//!
//! Order statistics use R's type 7 definition: the value at fraction `p` is the
//! linear interpolation between the two order statistics bracketing rank
//! `p * (n - 1)`.

/// Interpolate the value at `fraction` (0.0 to 1.0) of an ascending slice.
///
/// Returns 0.0 for an empty slice.
pub fn interpolate_sorted(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    if sorted.len() == 1 {
        return sorted[0];
    }

    let n = sorted.len();
    let fraction = fraction.clamp(0.0, 1.0);

    // Linear interpolation between nearest ranks
    let rank = fraction * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let weight = rank - lower_idx as f64;

    sorted[lower_idx] + weight * (sorted[upper_idx] - sorted[lower_idx])
}

/// Compute a single percentile (0 to 100) from unsorted samples
///
/// # Examples
///
/// ```
/// # use gfxtest_stats::compute_percentile;
/// let samples = vec![5.0, 1.0, 4.0, 2.0, 3.0];
/// assert_eq!(compute_percentile(&samples, 50.0), 3.0);
/// assert_eq!(compute_percentile(&samples, 25.0), 2.0);
/// ```
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    interpolate_sorted(&sorted, percentile / 100.0)
}
