//! Sample File Statistics
//!
//! Reads numbers from text files (or standard input) and summarizes them
//! with [`Stats`]. Values are separated by whitespace or commas. Integers
//! follow C literal rules: `0x` prefix for hex, a leading `0` for octal,
//! decimal otherwise. Anything else must be a finite float.

use anyhow::{Context, bail};
use gfxtest_stats::{Stats, Summary};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};

/// One parsed value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Integer, decimal, octal or hex
    Integer(u64),
    /// Anything else that parses as a finite float
    Float(f64),
}

/// Parse a single token.
pub fn parse_sample(token: &str) -> anyhow::Result<Sample> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        let value = u64::from_str_radix(hex, 16)
            .with_context(|| format!("invalid hex value {token:?}"))?;
        return Ok(Sample::Integer(value));
    }
    if let Some(octal) = token.strip_prefix('0') {
        if !octal.is_empty() && octal.bytes().all(|b| b.is_ascii_digit()) {
            let value = u64::from_str_radix(octal, 8)
                .with_context(|| format!("invalid octal value {token:?}"))?;
            return Ok(Sample::Integer(value));
        }
    }
    if let Ok(value) = token.parse::<u64>() {
        return Ok(Sample::Integer(value));
    }
    let value: f64 = token
        .parse()
        .with_context(|| format!("invalid number {token:?}"))?;
    if !value.is_finite() {
        bail!("non-finite value {token:?}");
    }
    Ok(Sample::Float(value))
}

/// Parse every value in `text`.
pub fn parse_samples(text: &str) -> anyhow::Result<Vec<Sample>> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(parse_sample)
        .collect()
}

/// Accumulate `samples`, switching to float storage only if needed.
pub fn collect_stats(samples: &[Sample]) -> anyhow::Result<Stats> {
    let mut stats = Stats::with_capacity(samples.len());
    for sample in samples {
        match *sample {
            Sample::Integer(value) => stats.push(value)?,
            Sample::Float(value) => stats.push_float(value)?,
        }
    }
    Ok(stats)
}

/// Summary of one input file
#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    /// Path as given on the command line, `None` for standard input
    pub file: Option<PathBuf>,
    /// Estimators over the file's values
    pub summary: Summary,
}

/// Summarize already-read input. `source` names it in messages.
pub fn analyze_text(source: &str, text: &str) -> anyhow::Result<Summary> {
    let samples = parse_samples(text).with_context(|| format!("failed to parse {source}"))?;
    if samples.is_empty() {
        bail!("{source} contains no values");
    }
    let stats = collect_stats(&samples)?;
    tracing::debug!("{source}: {} samples", stats.len());
    Ok(stats.summary())
}

/// Read and summarize one file.
pub fn analyze_file(path: &Path) -> anyhow::Result<FileStats> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(FileStats {
        file: Some(path.to_path_buf()),
        summary: analyze_text(&path.display().to_string(), &text)?,
    })
}

/// Read and summarize everything on `reader` (standard input for the CLI).
pub fn analyze_reader(reader: impl Read) -> anyhow::Result<FileStats> {
    let text = std::io::read_to_string(reader).context("failed to read standard input")?;
    Ok(FileStats {
        file: None,
        summary: analyze_text("standard input", &text)?,
    })
}

/// Summarize every file in parallel, keeping input order.
pub fn analyze_files(paths: &[PathBuf]) -> Vec<anyhow::Result<FileStats>> {
    paths.par_iter().map(|path| analyze_file(path)).collect()
}

/// One line per file: `name: trimean`, or the bare trimean for standard input.
pub fn format_trimean(stats: &FileStats) -> String {
    match &stats.file {
        Some(file) => format!("{}: {:.6}", file.display(), stats.summary.trimean),
        None => format!("{:.6}", stats.summary.trimean),
    }
}

/// Full summary block for one file. Standard input gets no header.
pub fn format_summary(stats: &FileStats) -> String {
    let Some(file) = &stats.file else {
        return stats.summary.to_string().trim_end().to_string();
    };
    let body = stats
        .summary
        .to_string()
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}:\n{body}", file.display())
}
