#![warn(missing_docs)]
//! gfxtest Report - Run Records and Output
//!
//! Captures the outcome of every subtest a test binary executed and renders
//! it as:
//! - JSON (machine-readable, consumed by external runners)
//! - Human-readable terminal output

mod human;
mod json;
mod report;

pub use human::{format_duration_ms, format_human_report};
pub use json::{generate_json_report, load_json_report, write_json_report};
pub use report::{
    ReportMeta, RunReport, RunSummary, SCHEMA_VERSION, SubtestOutcome, SubtestRecord, SystemInfo,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON with full schema
    Json,
    /// Human-readable terminal output
    #[default]
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("TEXT".parse::<OutputFormat>(), Ok(OutputFormat::Human));
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
