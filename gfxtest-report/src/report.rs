//! Report Data Structures

use chrono::{DateTime, Utc};
use gfxtest_stats::{Stats, Summary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current JSON schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Complete record of one test binary run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Where and when the run happened
    pub meta: ReportMeta,
    /// Subtests in execution order
    pub subtests: Vec<SubtestRecord>,
    /// Totals derived from `subtests`
    pub summary: RunSummary,
}

impl RunReport {
    /// Assemble a report, deriving the summary from the records
    pub fn new(meta: ReportMeta, subtests: Vec<SubtestRecord>, exit_code: i32) -> Self {
        let summary = RunSummary::from_records(&subtests, exit_code);
        Self {
            meta,
            subtests,
            summary,
        }
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Layout version of this document, see [`SCHEMA_VERSION`]
    pub schema_version: u32,
    /// Name of the test binary
    pub binary: String,
    /// Harness version
    pub version: String,
    /// When the report was assembled
    pub timestamp: DateTime<Utc>,
    /// Host the run executed on
    pub system: SystemInfo,
}

impl ReportMeta {
    /// Metadata for `binary` stamped with the current time
    pub fn collect(binary: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            binary: binary.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system: SystemInfo::collect(),
        }
    }
}

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system family, e.g. `linux`
    pub os: String,
    /// CPU architecture, e.g. `x86_64`
    pub arch: String,
    /// Kernel release (Linux only)
    pub kernel: Option<String>,
}

impl SystemInfo {
    /// Describe the running system
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            kernel: kernel_release(),
        }
    }
}

/// Kernel release from /proc (Linux only)
fn kernel_release() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .ok()
            .map(|s| s.trim().to_string())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Terminal outcome of one subtest invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtestOutcome {
    /// Body returned normally
    Success,
    /// A requirement was not met
    Skip,
    /// An assertion or explicit failure
    Fail,
    /// The run watchdog fired
    Timeout,
}

impl SubtestOutcome {
    /// Status word printed after `Subtest <name>:`
    pub fn label(self) -> &'static str {
        match self {
            SubtestOutcome::Success => "SUCCESS",
            SubtestOutcome::Skip => "SKIP",
            SubtestOutcome::Fail => "FAIL",
            SubtestOutcome::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for SubtestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One executed subtest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtestRecord {
    /// Subtest name as given to `subtest`
    pub name: String,
    /// How the subtest ended
    pub outcome: SubtestOutcome,
    /// Wall time of the body, zero if it never started
    pub duration_ms: f64,
    /// Exit code for failures
    pub exit_code: Option<i32>,
    /// Skip reason or failure report
    pub message: Option<String>,
}

/// Aggregate over all subtest records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of records
    pub total: usize,
    /// Records with [`SubtestOutcome::Success`]
    pub passed: usize,
    /// Records with [`SubtestOutcome::Skip`]
    pub skipped: usize,
    /// Failed or timed out records
    pub failed: usize,
    /// Process exit code of the run
    pub exit_code: i32,
    /// Sum of all subtest durations
    pub total_duration_ms: f64,
    /// Distribution of subtest durations in milliseconds
    pub duration: Option<Summary>,
}

impl RunSummary {
    /// Count outcomes and summarize durations
    pub fn from_records(records: &[SubtestRecord], exit_code: i32) -> Self {
        let mut summary = RunSummary {
            total: records.len(),
            exit_code,
            ..Default::default()
        };

        let mut durations = Stats::with_float_capacity(records.len());
        for record in records {
            match record.outcome {
                SubtestOutcome::Success => summary.passed += 1,
                SubtestOutcome::Skip => summary.skipped += 1,
                SubtestOutcome::Fail | SubtestOutcome::Timeout => summary.failed += 1,
            }
            summary.total_duration_ms += record.duration_ms;
            // Capacity matches the record count and durations are finite
            let _ = durations.push_float(record.duration_ms);
        }

        if !durations.is_empty() {
            summary.duration = Some(durations.summary());
        }
        summary
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Summary: {} passed, {} skipped, {} failed",
            self.passed, self.skipped, self.failed
        )
    }
}
