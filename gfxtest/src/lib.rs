#![warn(missing_docs)]
//! # gfxtest
//!
//! Subtest harness and statistics engine for GPU validation tests.
//!
//! gfxtest provides the infrastructure a graphics driver test binary needs:
//! - **Subtests**: one binary exposes many named subtests that pass, skip or fail independently
//! - **Fixtures and Groups**: shared setup whose skip cascades to the subtests it guards
//! - **Enumeration**: `--list-subtests` prints names without running anything
//! - **Crash Isolation**: forked children turn segfaults into `128 + signal` failures
//! - **Helpers**: background interference processes that never affect the outcome
//! - **Exit Handlers**: cleanup that runs once, on normal exit or fatal signal
//! - **Statistics**: Welford mean/variance, quartiles, trimean and interquartile mean
//!
//! ## Quick Start
//!
//! ```ignore
//! use gfxtest::prelude::*;
//!
//! #[gfxtest::main]
//! fn main(run: &mut TestRun) {
//!     let device = run.fixture(|| open_device().or_skip("no GPU"));
//!
//!     run.subtest("basic-create", |_| {
//!         let Some(device) = &device else { gt_skip!("no device") };
//!         gt_assert_neq!(device.create_buffer(4096), 0);
//!         Ok(())
//!     });
//! }
//! ```
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0    | every selected subtest succeeded |
//! | 77   | nothing failed and nothing succeeded |
//! | 78   | the global timeout expired |
//! | 79   | invalid command line or unknown subtest |
//! | 99   | assertion failure (tests may use other codes) |

// Re-export core types
pub use gfxtest_core::{
    Bail, CONFIG_ENV, CONFIG_FILE_NAME, ChildFailure, ChildStatus, EXIT_FAILURE, EXIT_INVALID,
    EXIT_SKIP, EXIT_SUCCESS, EXIT_TIMEOUT, ExitHandler, ExitHandlerError, ExtraOptions,
    FailReport, GfxtestConfig, HANDLED_SIGNALS, HarnessArgs, HarnessConfig, HelperProcess,
    InitError, IntoTestResult, LOG_LEVEL_ENV, Location, LogLevel, MAX_CHILDREN,
    MAX_EXIT_HANDLERS, MAX_HELPERS, Mode, OptionHandler, OutcomeCounts, OutputConfig,
    ProcessError, ResultExt, RunOptions, SIGNAL_HELPER_INTERVAL, SIMULATION_ENV, SignalHelper,
    SkipReport, Subtest, SubtestFilter, TestResult, TestRun, check_boolean_env_var,
    contract_violation, disable_exit_handler, enable_exit_handler, exit_handler_count,
    init_logging, install_exit_handler, is_running_in_simulation, kmsg, oom_adjust_for_doom,
    parse_args, run_exit_handlers, set_timeout, signal_name, skip_on_simulation, slow_quick,
};

// Re-export assertion macros
pub use gfxtest_core::{
    gt_assert, gt_assert_cmp, gt_assert_eq, gt_assert_neq, gt_fail, gt_fail_on, gt_require,
    gt_skip, gt_skip_on, gt_warn_on,
};

// Re-export entry-point macros
pub use gfxtest_macros::{main, simple_main};

// Re-export stats
pub use gfxtest_stats::{Stats, StatsError, Summary, compute_percentile};

// Re-export report types
pub use gfxtest_report::{RunReport, RunSummary, SubtestOutcome, SubtestRecord};

// Re-export logging macros
pub use tracing::{debug, info, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Bail, ExtraOptions, HelperProcess, ResultExt, Stats, Subtest, TestResult, TestRun,
        debug, gt_assert, gt_assert_cmp, gt_assert_eq, gt_assert_neq, gt_fail, gt_fail_on,
        gt_require, gt_skip, gt_skip_on, gt_warn_on, info, warn,
    };
}
