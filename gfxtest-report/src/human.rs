//! Human-readable Output
//!
//! Terminal rendering of a run report: one line per subtest with its
//! status, duration and failure detail, then the run summary and the
//! distribution of subtest durations.

use crate::report::{RunReport, SubtestOutcome};

/// Format a report for terminal display
pub fn format_human_report(report: &RunReport) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!(
        "gfxtest results: {} ({})\n",
        report.meta.binary,
        report.meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    let width = report
        .subtests
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(20);

    for subtest in &report.subtests {
        output.push_str(&format!(
            "  {:<7}  {:<width$}  {:>10}\n",
            subtest.outcome.label(),
            subtest.name,
            format_duration_ms(subtest.duration_ms),
            width = width
        ));

        if subtest.outcome != SubtestOutcome::Success {
            if let Some(code) = subtest.exit_code {
                output.push_str(&format!("           exit code: {}\n", code));
            }
            if let Some(message) = &subtest.message {
                for line in message.lines() {
                    output.push_str(&format!("           {}\n", line));
                }
            }
        }
    }

    output.push('\n');
    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "  {}  (exit {})\n",
        report.summary, report.summary.exit_code
    ));
    output.push_str(&format!(
        "  Duration: {}\n",
        format_duration_ms(report.summary.total_duration_ms)
    ));
    if let Some(duration) = &report.summary.duration {
        output.push_str(&format!(
            "  Per subtest: median {}  trimean {}  max {}\n",
            format_duration_ms(duration.median),
            format_duration_ms(duration.trimean),
            format_duration_ms(duration.max)
        ));
    }

    output
}

/// Format milliseconds with an adaptive unit
pub fn format_duration_ms(ms: f64) -> String {
    if ms >= 60_000.0 {
        format!("{:.2} min", ms / 60_000.0)
    } else if ms >= 1_000.0 {
        format!("{:.2} s", ms / 1_000.0)
    } else if ms >= 1.0 {
        format!("{:.2} ms", ms)
    } else {
        format!("{:.2} us", ms * 1_000.0)
    }
}
