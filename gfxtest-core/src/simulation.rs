//! Simulation Helpers
//!
//! Tests running on a pre-silicon simulator are orders of magnitude slower
//! than on hardware. These helpers let a test detect that and shrink or skip
//! its workload.

use crate::outcome::TestResult;

/// Environment variable set when running on a simulator
pub const SIMULATION_ENV: &str = "INTEL_SIMULATION";

/// Read `name` as a boolean: any non-zero integer prefix is true.
///
/// Returns `default` when the variable is unset.
pub fn check_boolean_env_var(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_leading_int(&value) != 0,
        Err(_) => default,
    }
}

// Leading optional sign and digits, 0 when there are none.
fn parse_leading_int(value: &str) -> i64 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let magnitude = digits[..end]
        .bytes()
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    if negative { -magnitude } else { magnitude }
}

/// Whether the test runs on a simulator
pub fn is_running_in_simulation() -> bool {
    check_boolean_env_var(SIMULATION_ENV, false)
}

/// Skip the current subtest when running on a simulator.
///
/// ```ignore
/// run.subtest("stress", |_| {
///     skip_on_simulation()?;
///     // ...
///     Ok(())
/// });
/// ```
pub fn skip_on_simulation() -> TestResult {
    crate::gt_skip_on!(is_running_in_simulation());
    Ok(())
}

/// `quick` on a simulator, `slow` on hardware.
pub fn slow_quick<T>(slow: T, quick: T) -> T {
    if is_running_in_simulation() { quick } else { slow }
}
