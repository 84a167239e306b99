//! Test Run Context
//!
//! [`TestRun`] owns the state of one test process: the mode chosen on the
//! command line, the subtest filter, the stack of subtest groups, outcome
//! counters and the records for the run report. Test code receives it by
//! `&mut` and structures itself with [`fixture`](TestRun::fixture),
//! [`subtest`](TestRun::subtest) and [`subtest_group`](TestRun::subtest_group).
//!
//! ```ignore
//! let mut run = TestRun::init(ExtraOptions::new());
//! let device = run.fixture(|| open_device().or_skip("no GPU"));
//! run.subtest("basic", |_| {
//!     gt_assert!(device.is_some());
//!     Ok(())
//! });
//! run.exit();
//! ```

use crate::config::GfxtestConfig;
use crate::exit_handler::{self, install_exit_handler};
use crate::filter::SubtestFilter;
use crate::logging::{LogLevel, init_logging};
use crate::options::{ExtraOptions, HarnessArgs, InitError, command_name, parse_args};
use crate::outcome::{
    Bail, EXIT_FAILURE, EXIT_INVALID, EXIT_SKIP, EXIT_SUCCESS, EXIT_TIMEOUT, TestResult,
    contract_violation,
};
use crate::process;
use crate::system;
use crate::timeout;
use gfxtest_report::{ReportMeta, RunReport, RunSummary, SubtestOutcome, SubtestRecord, SystemInfo};
use std::ffi::OsString;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// Message recorded for subtests a fixture skip disabled.
const GROUP_SKIP_MESSAGE: &str = "fixture requirement not met";

/// What the process does with its subtests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print subtest names, run nothing
    Enumerate,
    /// Run the selected subtests
    Execute,
}

/// Passed, skipped and failed subtest counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    /// Subtests that succeeded
    pub passed: usize,
    /// Subtests that skipped themselves
    pub skipped: usize,
    /// Subtests that failed or timed out
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupFrame {
    skipping: bool,
}

/// Resolved settings of a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Program name used in messages and reports
    pub command: String,
    /// Enumerate or execute
    pub mode: Mode,
    /// Subtest selection
    pub filter: Option<SubtestFilter>,
    /// False for simple tests
    pub with_subtests: bool,
    /// JSON report destination
    pub results: Option<PathBuf>,
    /// Global alarm
    pub timeout: Option<Duration>,
    /// Log level for the subscriber
    pub log_level: LogLevel,
    /// Log progress to /dev/kmsg
    pub kmsg: bool,
    /// Raise the OOM score at start
    pub oom_adjust: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            command: "gfxtest".to_string(),
            mode: Mode::Execute,
            filter: None,
            with_subtests: true,
            results: None,
            timeout: None,
            log_level: LogLevel::default(),
            kmsg: false,
            oom_adjust: false,
        }
    }
}

impl RunOptions {
    /// Merge command-line options over the configuration file.
    ///
    /// The log level comes from `--debug`, else `IGT_LOG_LEVEL`, else the
    /// file.
    pub fn resolve(
        command: String,
        args: &HarnessArgs,
        config: &GfxtestConfig,
        with_subtests: bool,
    ) -> Result<Self, InitError> {
        let filter = args
            .run_subtest
            .as_deref()
            .map(SubtestFilter::parse)
            .transpose()?;

        let timeout = match &args.timeout {
            Some(raw) => {
                let timeout = GfxtestConfig::parse_duration(raw)
                    .map_err(|e| InitError::Timeout(e.to_string()))?;
                (!timeout.is_zero()).then_some(timeout)
            }
            None => config.timeout().unwrap_or_else(|e| {
                eprintln!("gfxtest: warning: {e:#}");
                None
            }),
        };

        let log_level = if args.debug {
            LogLevel::Debug
        } else {
            LogLevel::from_env()
                .unwrap_or_else(|| config.harness.log_level.parse().unwrap_or_default())
        };

        Ok(Self {
            command,
            mode: if args.list_subtests {
                Mode::Enumerate
            } else {
                Mode::Execute
            },
            filter,
            with_subtests,
            results: args
                .results
                .clone()
                .or_else(|| config.output.results.as_ref().map(PathBuf::from)),
            timeout,
            log_level,
            kmsg: config.harness.kmsg,
            oom_adjust: config.harness.oom_adjust,
        })
    }
}

// Set once the run concluded through `exit`, checked by the exit handler.
static EXIT_CALLED: AtomicBool = AtomicBool::new(false);

fn check_exit_called(sig: i32) {
    if sig == 0 && !EXIT_CALLED.load(Ordering::Acquire) {
        eprintln!("gfxtest: warning: test exited without concluding the run");
    }
}

/// Leave the process with `code` after running the exit handlers.
fn terminate(code: i32) -> ! {
    EXIT_CALLED.store(true, Ordering::Release);
    exit_handler::run_exit_handlers(0);
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    std::process::exit(code)
}

fn valid_subtest_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Result type a test's main function may return
pub trait IntoTestResult {
    /// Convert into a [`TestResult`]
    fn into_test_result(self) -> TestResult;
}

impl IntoTestResult for () {
    fn into_test_result(self) -> TestResult {
        Ok(())
    }
}

impl IntoTestResult for TestResult {
    fn into_test_result(self) -> TestResult {
        self
    }
}

/// State of one test process
#[derive(Debug)]
pub struct TestRun {
    options: RunOptions,
    groups: Vec<GroupFrame>,
    in_fixture: bool,
    current: Option<String>,
    counts: OutcomeCounts,
    first_failure: Option<i32>,
    fixture_skipped: bool,
    toplevel_skip: bool,
    filter_matched: bool,
    records: Vec<SubtestRecord>,
    children: Vec<libc::pid_t>,
    exit_code: Option<i32>,
}

impl TestRun {
    /// A run with explicit options and no process-wide side effects.
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            groups: vec![GroupFrame::default()],
            in_fixture: false,
            current: None,
            counts: OutcomeCounts::default(),
            first_failure: None,
            fixture_skipped: false,
            toplevel_skip: false,
            filter_matched: false,
            records: Vec::new(),
            children: Vec::new(),
            exit_code: None,
        }
    }

    /// Initialize a test with subtests from the process arguments.
    ///
    /// Exits with 0 after `--help` and with 79 on an invalid command line.
    pub fn init(extra: ExtraOptions) -> Self {
        Self::init_from(std::env::args_os(), extra, true)
    }

    /// Initialize a test without subtests.
    pub fn init_simple(extra: ExtraOptions) -> Self {
        Self::init_from(std::env::args_os(), extra, false)
    }

    /// [`init`](Self::init) with explicit arguments.
    pub fn init_from<I, T>(argv: I, mut extra: ExtraOptions, with_subtests: bool) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        match Self::try_init_from(argv, &mut extra, with_subtests) {
            Ok(mut run) => {
                run.start();
                run
            }
            Err(InitError::Help(text)) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
                std::process::exit(EXIT_SUCCESS)
            }
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(e.exit_code())
            }
        }
    }

    /// Parse arguments and configuration without touching the process.
    pub fn try_init_from<I, T>(
        argv: I,
        extra: &mut ExtraOptions,
        with_subtests: bool,
    ) -> Result<Self, InitError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let command = command_name(argv.first());
        let args = parse_args(argv, extra, with_subtests)?;
        let config = GfxtestConfig::discover();
        let options = RunOptions::resolve(command, &args, &config, with_subtests)?;
        Ok(Self::new(options))
    }

    /// Process-wide setup: logging, banner, exit handler and timeout.
    pub fn start(&mut self) {
        if self.is_listing() {
            init_logging(LogLevel::None);
            return;
        }
        init_logging(self.options.log_level);

        if let Err(e) = install_exit_handler(check_exit_called) {
            tracing::warn!("{e}");
        }

        let system = SystemInfo::collect();
        println!(
            "gfxtest-version: {} ({}) ({}: {})",
            env!("CARGO_PKG_VERSION"),
            system.arch,
            system.os,
            system.kernel.as_deref().unwrap_or("unknown")
        );
        if self.options.kmsg {
            system::kmsg(&format!("Executing {}", self.options.command));
        }
        if self.options.oom_adjust {
            system::oom_adjust_for_doom();
        }
        if let Some(timeout) = self.options.timeout {
            self.set_timeout(timeout);
        }
    }

    /// Arm the global alarm, a zero duration disarms it.
    pub fn set_timeout(&mut self, duration: Duration) {
        if let Err(e) = timeout::set_timeout(duration) {
            tracing::warn!("failed to arm timeout: {e}");
            return;
        }
        self.options.timeout = (!duration.is_zero()).then_some(duration);
        if !duration.is_zero() {
            tracing::debug!("timeout set to {duration:?}");
        }
    }

    /// Run settings
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Enumerate or execute
    pub fn mode(&self) -> Mode {
        self.options.mode
    }

    /// Whether this run only lists subtests
    pub fn is_listing(&self) -> bool {
        self.options.mode == Mode::Enumerate
    }

    /// Outcome counters so far
    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    /// Records of the subtests that ran
    pub fn records(&self) -> &[SubtestRecord] {
        &self.records
    }

    /// Name of the running subtest
    pub fn current_subtest(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Whether a fixture body is running
    pub fn in_fixture(&self) -> bool {
        self.in_fixture
    }

    /// Whether a fixture skip disabled some subtests
    pub fn fixture_skipped(&self) -> bool {
        self.fixture_skipped
    }

    fn frame(&self) -> GroupFrame {
        self.groups.last().copied().unwrap_or_default()
    }

    fn frame_mut(&mut self) -> &mut GroupFrame {
        if self.groups.is_empty() {
            self.groups.push(GroupFrame::default());
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    /// Run shared setup for the following subtests.
    ///
    /// Skipped (returning `None`) when listing or when the enclosing group
    /// is already skipping. A skip inside `body` marks the enclosing group
    /// skipping. A failure ends the whole process.
    pub fn fixture<T>(&mut self, body: impl FnOnce() -> TestResult<T>) -> Option<T> {
        if self.current.is_some() {
            contract_violation("fixture inside a subtest");
        }
        if self.in_fixture {
            contract_violation("nested fixture");
        }
        if self.is_listing() || self.frame().skipping {
            return None;
        }

        self.in_fixture = true;
        let result = catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|p| Err(Bail::from_panic(p)));
        self.in_fixture = false;

        match result {
            Ok(value) => Some(value),
            Err(Bail::Skip(report)) => {
                println!("{report}");
                self.frame_mut().skipping = true;
                self.fixture_skipped = true;
                None
            }
            Err(Bail::Fail(report)) => {
                eprintln!("{report}");
                eprintln!("Fixture failed, ending the run");
                self.abort_run(report.exit_code)
            }
        }
    }

    fn abort_run(&mut self, code: i32) -> ! {
        self.note_failure(code);
        let code = self.conclude();
        terminate(code)
    }

    fn note_failure(&mut self, code: i32) {
        if self.first_failure.is_none() {
            self.first_failure = Some(code);
        }
    }

    /// Decide whether subtest `name` runs, printing it when listing.
    fn should_run_subtest(&mut self, name: &str) -> bool {
        if let Some(current) = &self.current {
            contract_violation(&format!("subtest {name} started inside subtest {current}"));
        }
        if self.in_fixture {
            contract_violation(&format!("subtest {name} started inside a fixture"));
        }
        if !valid_subtest_name(name) {
            contract_violation(&format!("invalid subtest name \"{name}\""));
        }

        if self.is_listing() {
            println!("{name}");
            return false;
        }
        if let Some(filter) = &self.options.filter {
            if !filter.matches(name) {
                return false;
            }
        }
        self.filter_matched = true;

        if self.frame().skipping {
            println!("Subtest {name}: SKIP");
            self.counts.skipped += 1;
            self.records.push(SubtestRecord {
                name: name.to_string(),
                outcome: SubtestOutcome::Skip,
                duration_ms: 0.0,
                exit_code: None,
                message: Some(GROUP_SKIP_MESSAGE.to_string()),
            });
            return false;
        }
        true
    }

    /// Declare subtest `name` and run `body` if it is selected.
    ///
    /// The body's result is the subtest outcome: `Ok` is SUCCESS, a skip is
    /// SKIP, a failure or panic is FAIL. Children forked by the body and
    /// not waited for are killed afterwards.
    pub fn subtest<F>(&mut self, name: &str, body: F)
    where
        F: FnOnce(&mut Subtest<'_>) -> TestResult,
    {
        if !self.should_run_subtest(name) {
            return;
        }

        self.current = Some(name.to_string());
        println!("Starting subtest: {name}");
        timeout::set_label(name);
        if self.options.kmsg {
            system::kmsg(&format!("Starting subtest: {name}"));
        }

        let started = Instant::now();
        let result = {
            let mut subtest = Subtest { run: self, name };
            catch_unwind(AssertUnwindSafe(|| body(&mut subtest)))
                .unwrap_or_else(|p| Err(Bail::from_panic(p)))
        };

        if !self.children.is_empty() {
            let leftover = std::mem::take(&mut self.children);
            process::reap_leftover_children(&leftover);
        }
        self.record_outcome(name, result, started.elapsed());
        timeout::clear_label();
    }

    fn record_outcome(&mut self, name: &str, result: TestResult, elapsed: Duration) {
        if self.current.take().is_none() {
            contract_violation(&format!("second outcome for subtest {name}"));
        }

        let (outcome, exit_code, message) = match result {
            Ok(()) => (SubtestOutcome::Success, None, None),
            Err(Bail::Skip(report)) => {
                println!("{report}");
                (SubtestOutcome::Skip, None, Some(report.to_string()))
            }
            Err(Bail::Fail(report)) => {
                eprintln!("{report}");
                let outcome = if report.exit_code == EXIT_TIMEOUT {
                    SubtestOutcome::Timeout
                } else {
                    SubtestOutcome::Fail
                };
                (outcome, Some(report.exit_code), Some(report.to_string()))
            }
        };

        println!(
            "Subtest {name}: {outcome} ({:.3}s)",
            elapsed.as_secs_f64()
        );
        if self.options.kmsg {
            system::kmsg(&format!("Subtest {name}: {outcome}"));
        }

        match outcome {
            SubtestOutcome::Success => self.counts.passed += 1,
            SubtestOutcome::Skip => self.counts.skipped += 1,
            SubtestOutcome::Fail | SubtestOutcome::Timeout => {
                self.counts.failed += 1;
                self.note_failure(exit_code.unwrap_or(EXIT_FAILURE));
            }
        }

        self.records.push(SubtestRecord {
            name: name.to_string(),
            outcome,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            exit_code,
            message,
        });
    }

    /// Run `body` in a nested group.
    ///
    /// A fixture skip inside the group skips the group's subtests only.
    pub fn subtest_group(&mut self, body: impl FnOnce(&mut TestRun)) {
        let parent = self.frame();
        self.groups.push(parent);
        let depth = self.groups.len();
        body(self);
        self.groups.truncate(depth - 1);
    }

    /// Run the body of a test without subtests and exit with its outcome.
    ///
    /// `body` gets a [`Subtest`] handle named after the binary, so it can
    /// fork and wait for children the same way a subtest does. Children it
    /// leaves behind are killed before exiting.
    pub fn simple<F>(mut self, body: F) -> !
    where
        F: FnOnce(&mut Subtest<'_>) -> TestResult,
    {
        if self.options.with_subtests {
            contract_violation("simple test body in a run with subtests");
        }
        let name = self.options.command.clone();
        let result = {
            let mut handle = Subtest {
                run: &mut self,
                name: &name,
            };
            catch_unwind(AssertUnwindSafe(|| body(&mut handle)))
                .unwrap_or_else(|p| Err(Bail::from_panic(p)))
        };
        if !self.children.is_empty() {
            let leftover = std::mem::take(&mut self.children);
            process::reap_leftover_children(&leftover);
        }
        self.exit_with(result)
    }

    /// Aggregate exit code of the run; summary and report are produced once.
    pub fn conclude(&mut self) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        if let Some(current) = &self.current {
            contract_violation(&format!("run concluded inside subtest {current}"));
        }

        let code = self.exit_code_for_outcomes();
        self.exit_code = Some(code);

        if self.is_listing() {
            return code;
        }
        if self.options.with_subtests {
            println!("{}", RunSummary::from_records(&self.records, code));
        }
        if let Some(path) = self.options.results.clone() {
            let report = RunReport::new(
                ReportMeta::collect(self.options.command.clone()),
                self.records.clone(),
                code,
            );
            match gfxtest_report::write_json_report(&report, &path) {
                Ok(()) => tracing::info!("results written to {}", path.display()),
                Err(e) => eprintln!("gfxtest: warning: cannot write results: {e:#}"),
            }
        }
        code
    }

    fn exit_code_for_outcomes(&self) -> i32 {
        if self.is_listing() {
            return EXIT_SUCCESS;
        }
        if let Some(code) = self.first_failure {
            return code;
        }
        if !self.options.with_subtests {
            return if self.toplevel_skip { EXIT_SKIP } else { EXIT_SUCCESS };
        }
        if let Some(filter) = &self.options.filter {
            if !self.filter_matched {
                eprintln!("Unknown subtest: {filter}");
                return EXIT_INVALID;
            }
        }
        if self.toplevel_skip || self.counts.passed == 0 {
            EXIT_SKIP
        } else {
            EXIT_SUCCESS
        }
    }

    /// Conclude and exit the process.
    pub fn exit(mut self) -> ! {
        let code = self.conclude();
        terminate(code)
    }

    /// Exit with the outcome of code that ran outside any subtest.
    ///
    /// A skip there skips everything that is left, a failure is fatal.
    pub fn exit_with(mut self, result: TestResult) -> ! {
        match result {
            Ok(()) => {}
            Err(Bail::Skip(report)) => {
                println!("{report}");
                self.toplevel_skip = true;
            }
            Err(Bail::Fail(report)) => {
                eprintln!("{report}");
                self.note_failure(report.exit_code);
            }
        }
        self.exit()
    }
}

/// Handle to the running subtest
#[derive(Debug)]
pub struct Subtest<'a> {
    run: &'a mut TestRun,
    name: &'a str,
}

impl Subtest<'_> {
    /// Subtest name
    pub fn name(&self) -> &str {
        self.name
    }

    /// Fork `count` children, each running `body(index)`.
    ///
    /// Returns in the parent right away; use
    /// [`wait_children`](Self::wait_children) to collect them.
    pub fn fork<F>(&mut self, count: usize, body: F) -> TestResult
    where
        F: Fn(usize) -> TestResult,
    {
        for index in 0..count {
            match process::fork_child(index, &body) {
                Ok(pid) => self.run.children.push(pid),
                Err(e) => {
                    return Err(Bail::fail_with(
                        EXIT_FAILURE,
                        format!("failed to fork child {index}: {e}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Wait for every forked child; fail if any of them did not exit 0.
    pub fn wait_children(&mut self) -> TestResult {
        let pids = std::mem::take(&mut self.run.children);
        process::wait_children(&pids).map_err(process::failure_to_bail)
    }

    /// Number of children forked and not yet waited for
    pub fn children(&self) -> usize {
        self.run.children.len()
    }
}
