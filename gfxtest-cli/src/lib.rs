#![warn(missing_docs)]
//! gfxtest CLI Library
//!
//! Companion tools for gfxtest binaries:
//! - `gfxtest stats`: robust statistics over files of numbers
//! - `gfxtest report`: render a `--results` JSON report
//! - `gfxtest init`: print a default `gfxtest.toml`
//!
//! # Example
//!
//! ```text
//! $ gfxtest stats frame_times.txt
//! frame_times.txt: 16.683250
//! $ cat frame_times.txt | gfxtest stats
//! 16.683250
//! $ gfxtest report target/gfxtest/results.json
//! ```

mod stats;

pub use stats::{
    FileStats, Sample, analyze_file, analyze_files, analyze_reader, analyze_text, collect_stats,
    format_summary, format_trimean, parse_sample, parse_samples,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use gfxtest_core::GfxtestConfig;
use gfxtest_report::{OutputFormat, format_human_report, generate_json_report, load_json_report};
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;

/// gfxtest CLI arguments
#[derive(Parser, Debug)]
#[command(name = "gfxtest")]
#[command(author, version, about = "gfxtest - tools for GPU validation test runs")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of threads for parallel file processing
    /// 0 = use all available cores (default), 1 = single-threaded
    #[arg(long, short = 'j', default_value = "0", global = true)]
    pub threads: usize,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trimean (or full summary) of the numbers in each file
    Stats {
        /// Files of whitespace or comma separated numbers (standard input if none)
        files: Vec<PathBuf>,

        /// Print every estimator instead of the trimean
        #[arg(long)]
        summary: bool,

        /// Output format: human, json
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },
    /// Render a JSON run report written with `--results`
    Report {
        /// Report file
        file: PathBuf,

        /// Output format: human, json
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },
    /// Print a default gfxtest.toml
    Init,
}

/// Run the gfxtest CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the gfxtest CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        "gfxtest=debug"
    } else {
        "gfxtest=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    if cli.threads > 0 {
        ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    match cli.command {
        Commands::Stats {
            files,
            summary,
            format,
        } => run_stats(&files, summary, format),
        Commands::Report { file, format } => run_report(&file, format),
        Commands::Init => {
            print!("{}", GfxtestConfig::default_toml());
            Ok(())
        }
    }
}

fn run_stats(files: &[PathBuf], summary: bool, format: OutputFormat) -> anyhow::Result<()> {
    if files.is_empty() {
        let stats = analyze_reader(std::io::stdin().lock())?;
        print_stats(std::slice::from_ref(&stats), summary, format)?;
        return Ok(());
    }

    let results = analyze_files(files);

    let mut analyzed = Vec::with_capacity(results.len());
    let mut failures = 0;
    for result in results {
        match result {
            Ok(stats) => analyzed.push(stats),
            Err(e) => {
                eprintln!("gfxtest: {e:#}");
                failures += 1;
            }
        }
    }

    print_stats(&analyzed, summary, format)?;

    if failures > 0 {
        anyhow::bail!("{failures} of {} files could not be analyzed", files.len());
    }
    Ok(())
}

fn print_stats(analyzed: &[FileStats], summary: bool, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(analyzed)?);
        }
        OutputFormat::Human => {
            for stats in analyzed {
                if summary {
                    println!("{}", format_summary(stats));
                } else {
                    println!("{}", format_trimean(stats));
                }
            }
        }
    }
    Ok(())
}

fn run_report(file: &std::path::Path, format: OutputFormat) -> anyhow::Result<()> {
    let report = load_json_report(file)
        .with_context(|| format!("failed to load report {}", file.display()))?;
    tracing::debug!(
        "report of {} with {} subtests",
        report.meta.binary,
        report.subtests.len()
    );
    match format {
        OutputFormat::Json => println!("{}", generate_json_report(&report)?),
        OutputFormat::Human => print!("{}", format_human_report(&report)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfxtest_report::{ReportMeta, RunReport, SubtestOutcome, SubtestRecord, write_json_report};

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["gfxtest", "stats", "--summary", "a.txt", "b.txt"]).unwrap();
        match cli.command {
            Commands::Stats {
                files,
                summary,
                format,
            } => {
                assert_eq!(files.len(), 2);
                assert!(summary);
                assert_eq!(format, OutputFormat::Human);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["gfxtest", "-v", "report", "r.json", "--format", "json"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Report {
                format: OutputFormat::Json,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["gfxtest", "stats"]).unwrap();
        assert!(matches!(cli.command, Commands::Stats { files, .. } if files.is_empty()));
        assert!(Cli::try_parse_from(["gfxtest", "stats", "--format", "html", "a.txt"]).is_err());
    }

    #[test]
    fn test_stats_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "1,2,3").unwrap();
        let missing = dir.path().join("missing.txt");

        assert!(run_stats(std::slice::from_ref(&good), false, OutputFormat::Human).is_ok());
        let err = run_stats(&[good, missing], true, OutputFormat::Json).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 files could not be analyzed");
    }

    #[test]
    fn test_report_renders_saved_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let records = vec![SubtestRecord {
            name: "basic".to_string(),
            outcome: SubtestOutcome::Success,
            duration_ms: 12.0,
            exit_code: None,
            message: None,
        }];
        let report = RunReport::new(ReportMeta::collect("gem_basic"), records, 0);
        write_json_report(&report, &path).unwrap();

        assert!(run_report(&path, OutputFormat::Human).is_ok());
        assert!(run_report(&path, OutputFormat::Json).is_ok());
        assert!(run_report(&dir.path().join("nope.json"), OutputFormat::Human).is_err());
    }
}
