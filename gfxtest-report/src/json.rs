//! JSON Output

use crate::report::RunReport;
use std::path::Path;

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Write the JSON report to `path`, creating parent directories.
pub fn write_json_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, generate_json_report(report)?)?;
    Ok(())
}

/// Load a report previously written by [`write_json_report`].
pub fn load_json_report(path: &Path) -> anyhow::Result<RunReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReportMeta, SubtestOutcome, SubtestRecord};

    #[test]
    fn test_report_written_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");

        let records = vec![SubtestRecord {
            name: "basic".to_string(),
            outcome: SubtestOutcome::Fail,
            duration_ms: 3.5,
            exit_code: Some(99),
            message: Some("Failed assertion: x == 1".to_string()),
        }];
        let report = RunReport::new(ReportMeta::collect("gem_basic"), records, 99);
        write_json_report(&report, &path).unwrap();

        let loaded = load_json_report(&path).unwrap();
        assert_eq!(loaded.meta.binary, "gem_basic");
        assert_eq!(loaded.subtests[0].outcome, SubtestOutcome::Fail);
        assert_eq!(loaded.summary.failed, 1);
        assert_eq!(loaded.summary.exit_code, 99);
    }

    #[test]
    fn test_outcome_serialized_lowercase() {
        let report = RunReport::new(ReportMeta::collect("t"), Vec::new(), 0);
        let json = generate_json_report(&report).unwrap();
        assert!(json.contains("\"schema_version\": 1"));

        let value = serde_json::to_value(SubtestOutcome::Skip).unwrap();
        assert_eq!(value, "skip");
    }
}
