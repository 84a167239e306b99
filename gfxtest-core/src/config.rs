//! Configuration loading from gfxtest.toml
//!
//! Harness defaults can be set in a `gfxtest.toml` file. The file named by
//! `GFXTEST_CONFIG` wins; otherwise it is discovered by walking up from the
//! current directory. Command-line options override the file.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the discovered configuration file
pub const CONFIG_FILE_NAME: &str = "gfxtest.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "GFXTEST_CONFIG";

/// gfxtest configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GfxtestConfig {
    /// Harness behaviour
    #[serde(default)]
    pub harness: HarnessConfig,
    /// Report output
    #[serde(default)]
    pub output: OutputConfig,
}

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Default log level: "debug", "info", "warn" or "none"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Global timeout for the whole test binary (e.g., "30s", "2m", "0s" disables)
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Log subtest start and end to /dev/kmsg
    #[serde(default = "default_true")]
    pub kmsg: bool,
    /// Make the test process the preferred OOM-killer victim
    #[serde(default = "default_true")]
    pub oom_adjust: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            timeout: default_timeout(),
            kmsg: true,
            oom_adjust: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout() -> String {
    "0s".to_string()
}
fn default_true() -> bool {
    true
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Write a JSON run report here after every run
    #[serde(default)]
    pub results: Option<String>,
}

impl GfxtestConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Locate the configuration file: `GFXTEST_CONFIG`, then the nearest
    /// `gfxtest.toml` above the current directory.
    pub fn locate() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            if !explicit.is_empty() {
                return Some(PathBuf::from(explicit));
            }
        }
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Discover and load the configuration, falling back to defaults.
    ///
    /// A file that exists but does not parse is reported on stderr and
    /// ignored.
    pub fn discover() -> Self {
        let Some(path) = Self::locate() else {
            return Self::default();
        };
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("gfxtest: warning: ignoring configuration: {e:#}");
                Self::default()
            }
        }
    }

    /// Configured global timeout, `None` when disabled
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        let timeout = Self::parse_duration(&self.harness.timeout)
            .context("invalid harness.timeout")?;
        Ok((!timeout.is_zero()).then_some(timeout))
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# gfxtest configuration

[harness]
# Log level: debug, info, warn, none (IGT_LOG_LEVEL and --debug override)
log_level = "info"
# Global timeout for a test binary, "0s" disables it
timeout = "0s"
# Log subtest progress to /dev/kmsg
kmsg = true
# Make test processes the preferred OOM-killer victim
oom_adjust = true

[output]
# Write a JSON run report after every run (uncomment to enable)
# results = "target/gfxtest/results.json"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "30s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Invalid duration number: {}", num_part));
        }

        let multiplier_ns: f64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" | "" => 1e9,
            "m" | "min" => 60e9,
            "h" => 3600e9,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_nanos((value * multiplier_ns) as u64))
    }
}
