//! Log Level and Subscriber Setup
//!
//! Test output goes through `tracing`. Warnings and errors go to stderr,
//! everything else to stdout so it interleaves with the subtest status lines.

use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Environment variable selecting the log level
pub const LOG_LEVEL_ENV: &str = "IGT_LOG_LEVEL";

/// Minimum level of messages printed by the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Everything
    Debug,
    /// Informational messages and up
    #[default]
    Info,
    /// Warnings only
    Warn,
    /// Nothing
    None,
}

impl LogLevel {
    /// Level from `IGT_LOG_LEVEL`, if set to a known value
    pub fn from_env() -> Option<Self> {
        std::env::var(LOG_LEVEL_ENV).ok()?.parse().ok()
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::None => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "none" => Ok(LogLevel::None),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::None => "none",
            level => level.directive(),
        })
    }
}

/// Install the global subscriber at `level`.
///
/// Returns false when a subscriber is already installed, which happens when
/// several runs share one process.
pub fn init_logging(level: LogLevel) -> bool {
    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level.directive()))
        .with_writer(writer)
        .with_target(false)
        .without_time()
        .try_init()
        .is_ok()
}
