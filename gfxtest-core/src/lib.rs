#![warn(missing_docs)]
//! gfxtest Core - Subtest Harness
//!
//! This crate provides the execution environment for test binaries:
//! - `TestRun` context with fixtures, subtests and subtest groups
//! - `TestResult`/`Bail` outcomes and the `gt_*` assertion macros
//! - Fork-based children and background helper processes
//! - Signal-safe exit handlers and a global timeout
//! - Command-line options and `gfxtest.toml` configuration

mod assert;
mod config;
mod exit_handler;
mod filter;
mod helper;
mod logging;
mod options;
mod outcome;
mod process;
mod run;
mod simulation;
mod system;
mod timeout;

pub use config::{CONFIG_ENV, CONFIG_FILE_NAME, GfxtestConfig, HarnessConfig, OutputConfig};
pub use exit_handler::{
    ExitHandler, ExitHandlerError, HANDLED_SIGNALS, MAX_EXIT_HANDLERS, disable_exit_handler,
    enable_exit_handler, exit_handler_count, install_exit_handler, run_exit_handlers,
};
pub use filter::SubtestFilter;
pub use helper::{HelperProcess, MAX_HELPERS, SIGNAL_HELPER_INTERVAL, SignalHelper};
pub use logging::{LOG_LEVEL_ENV, LogLevel, init_logging};
pub use options::{ExtraOptions, HarnessArgs, InitError, OptionHandler, parse_args};
pub use outcome::{
    Bail, EXIT_FAILURE, EXIT_INVALID, EXIT_SKIP, EXIT_SUCCESS, EXIT_TIMEOUT, FailReport,
    Location, ResultExt, SkipReport, TestResult, contract_violation,
};
pub use process::{ChildFailure, ChildStatus, MAX_CHILDREN, ProcessError, signal_name};
pub use run::{IntoTestResult, Mode, OutcomeCounts, RunOptions, Subtest, TestRun};
pub use simulation::{
    SIMULATION_ENV, check_boolean_env_var, is_running_in_simulation, skip_on_simulation,
    slow_quick,
};
pub use system::{kmsg, oom_adjust_for_doom};
pub use timeout::set_timeout;

/// Re-exports used by the exported macros
#[doc(hidden)]
pub mod __private {
    pub use crate::assert::negate_op;
    pub use tracing;
}
