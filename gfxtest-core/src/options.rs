//! Command-Line Options
//!
//! Every test binary accepts the same built-in options. A test can add its
//! own through [`ExtraOptions`]; they appear in `--help` next to the
//! built-in ones and are handed to the test's handler after parsing.

use crate::outcome::{EXIT_INVALID, EXIT_SUCCESS};
use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Options understood by every test binary
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about = None, long_about = None)]
pub struct HarnessArgs {
    /// List the subtests of this binary, one per line, and exit
    #[arg(short = 'l', long = "list-subtests")]
    pub list_subtests: bool,

    /// Run only subtests matching these comma-separated globs (`!` excludes)
    #[arg(
        short = 'r',
        long = "run-subtest",
        value_name = "PATTERNS",
        conflicts_with = "list_subtests"
    )]
    pub run_subtest: Option<String>,

    /// Print debug messages
    #[arg(long)]
    pub debug: bool,

    /// Abort the run after this long (e.g., "30s", "2m")
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "PATH")]
    pub results: Option<PathBuf>,
}

/// Callback for caller-defined options.
///
/// Receives the option id and the parsed matches. Returning `Err(reason)`
/// rejects the command line.
pub type OptionHandler = Box<dyn FnMut(&str, &ArgMatches) -> Result<(), String>>;

/// Test-specific command-line options.
///
/// ```ignore
/// let extra = ExtraOptions::new()
///     .arg(Arg::new("rounds").long("rounds").value_parser(value_parser!(u32)))
///     .help("  --rounds N   repeat every subtest N times")
///     .handler(|id, matches| {
///         ROUNDS.store(*matches.get_one::<u32>(id).unwrap_or(&1), Ordering::Relaxed);
///         Ok(())
///     });
/// ```
#[derive(Default)]
pub struct ExtraOptions {
    /// Additional arguments
    pub args: Vec<clap::Arg>,
    /// Text appended to `--help`
    pub help: Option<String>,
    /// Called once for every extra option given on the command line
    pub handler: Option<OptionHandler>,
}

impl ExtraOptions {
    /// No extra options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument.
    pub fn arg(mut self, arg: clap::Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// Set the text appended to `--help`.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Set the handler for the extra arguments.
    pub fn handler(
        mut self,
        handler: impl FnMut(&str, &ArgMatches) -> Result<(), String> + 'static,
    ) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }
}

/// Reasons initialization stops before any test code runs
#[derive(Debug, Error)]
pub enum InitError {
    /// `--help` or `--version` was requested; carries the rendered text
    #[error("{0}")]
    Help(String),
    /// Unknown option or bad value; carries the rendered clap error
    #[error("{0}")]
    Usage(String),
    /// `--list-subtests` or `--run-subtest` given to a test without subtests
    #[error("--list-subtests and --run-subtest are not supported by tests without subtests\n{usage}")]
    NoSubtests {
        /// Rendered usage line
        usage: String,
    },
    /// The test's option handler refused an option
    #[error("invalid option --{option}: {reason}\n{usage}")]
    Rejected {
        /// Option id
        option: String,
        /// Handler's explanation
        reason: String,
        /// Rendered usage line
        usage: String,
    },
    /// `--timeout` did not parse
    #[error("invalid --timeout: {0}")]
    Timeout(String),
    /// `--run-subtest` contained an invalid glob
    #[error("invalid --run-subtest pattern: {0}")]
    Filter(#[from] glob::PatternError),
}

impl InitError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            InitError::Help(_) => EXIT_SUCCESS,
            _ => EXIT_INVALID,
        }
    }
}

/// Program name from `argv[0]`
pub(crate) fn command_name(argv0: Option<&OsString>) -> String {
    argv0
        .and_then(|arg| Path::new(arg).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gfxtest".to_string())
}

/// Parse `argv` (including the program name) into the built-in options and
/// dispatch extra options to their handler.
pub fn parse_args<I, T>(
    argv: I,
    extra: &mut ExtraOptions,
    with_subtests: bool,
) -> Result<HarnessArgs, InitError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    let name = command_name(argv.first());

    let mut command = HarnessArgs::command().name(name.clone()).bin_name(name);
    for arg in &extra.args {
        command = command.arg(arg.clone());
    }
    if let Some(help) = &extra.help {
        command = command.after_help(help.clone());
    }

    let matches = command.try_get_matches_from_mut(argv).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => InitError::Help(e.to_string()),
        _ => InitError::Usage(e.to_string()),
    })?;
    let args =
        HarnessArgs::from_arg_matches(&matches).map_err(|e| InitError::Usage(e.to_string()))?;

    if !with_subtests && (args.list_subtests || args.run_subtest.is_some()) {
        return Err(InitError::NoSubtests {
            usage: command.render_usage().to_string(),
        });
    }

    if let Some(handler) = extra.handler.as_mut() {
        for arg in &extra.args {
            let id = arg.get_id().as_str();
            if matches.value_source(id) != Some(ValueSource::CommandLine) {
                continue;
            }
            if let Err(reason) = handler(id, &matches) {
                return Err(InitError::Rejected {
                    option: id.to_string(),
                    reason,
                    usage: command.render_usage().to_string(),
                });
            }
        }
    }

    Ok(args)
}
