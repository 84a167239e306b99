//! Integration tests for the gfxtest harness
//!
//! Each scenario ends the process it runs in, so the tests re-run this test
//! binary with `GFXTEST_SCENARIO` naming the scenario and check its exit
//! status and output.

use gfxtest::prelude::*;
use gfxtest::{EXIT_FAILURE, EXIT_INVALID, EXIT_SKIP, EXIT_SUCCESS, EXIT_TIMEOUT, SignalHelper};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

const SCENARIO_ENV: &str = "GFXTEST_SCENARIO";

// ============================================================================
// Parent Side
// ============================================================================

struct Outcome {
    status: ExitStatus,
    stdout: String,
    stderr: String,
    dir: tempfile::TempDir,
}

impl Outcome {
    fn code(&self) -> Option<i32> {
        self.status.code()
    }

    fn count(&self, needle: &str) -> usize {
        self.stdout.matches(needle).count()
    }
}

fn run_scenario(name: &str) -> Outcome {
    run_scenario_with_env(name, &[])
}

fn run_scenario_with_env(name: &str, env: &[(&str, &str)]) -> Outcome {
    let dir = tempfile::tempdir().unwrap();
    let exe = std::env::current_exe().unwrap();
    let mut command = Command::new(exe);
    command
        .args(["scenario_entry", "--exact", "--nocapture", "--test-threads=1"])
        .env(SCENARIO_ENV, name)
        .env_remove("IGT_LOG_LEVEL")
        .env_remove("INTEL_SIMULATION")
        .env_remove("GFXTEST_CONFIG")
        .current_dir(dir.path());
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().unwrap();
    Outcome {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        dir,
    }
}

// ============================================================================
// Scenario Side
// ============================================================================

fn argv(args: &[&str]) -> Vec<String> {
    std::iter::once("harness")
        .chain(args.iter().copied())
        .map(String::from)
        .collect()
}

fn init(args: &[&str]) -> TestRun {
    TestRun::init_from(argv(args), ExtraOptions::new(), true)
}

/// Dispatches to the scenario named by `GFXTEST_SCENARIO`; passes when unset.
#[test]
fn scenario_entry() {
    let Ok(name) = std::env::var(SCENARIO_ENV) else {
        return;
    };
    match name.as_str() {
        "mixed" => mixed(),
        "skip_only" => skip_only(),
        "fail" => fail(),
        "timeout" => timeout(),
        "exit_handlers" => exit_handlers(),
        "exit_handler_signal" => exit_handler_signal(),
        "segfault_child" => segfault_child(),
        "child_failure_kills_siblings" => child_failure_kills_siblings(),
        "group_skip" => group_skip(),
        "fixture_failure" => fixture_failure(),
        "simulation" => simulation(),
        "list" => list(),
        "filter" => filter(),
        "unknown_subtest" => unknown_subtest(),
        "bad_option" => bad_option(),
        "help" => help(),
        "extra_option_ok" => extra_option(&["--rounds", "2"]),
        "extra_option_rejected" => extra_option(&["--rounds", "0"]),
        "results" => results(),
        "helper" => helper(),
        "signal_helper" => signal_helper(),
        "toplevel_skip" => toplevel_skip(),
        "simple_skip" => simple_skip(),
        "simple_fail" => simple_fail(),
        "simple_fork" => simple_fork(),
        "simple_leftover_child" => simple_leftover_child(),
        "simple_list" => simple_list(),
        other => panic!("unknown scenario {other}"),
    }
}

fn subtests(run: &mut TestRun) {
    run.subtest("pass-one", |_| Ok(()));
    run.subtest("pass-two", |_| Ok(()));
    run.subtest("skip-one", |_| {
        gt_require!(false, "missing feature");
        Ok(())
    });
}

fn mixed() -> ! {
    let mut run = init(&[]);
    subtests(&mut run);
    run.exit()
}

fn skip_only() -> ! {
    let mut run = init(&[]);
    run.subtest("skip-one", |_| gt_skip!("nothing to test"));
    run.subtest("skip-two", |_| gt_skip!("nothing to test"));
    run.exit()
}

fn fail() -> ! {
    let mut run = init(&[]);
    run.subtest("pass-one", |_| Ok(()));
    run.subtest("fail-one", |_| {
        let value = 3;
        gt_assert_eq!(value, 4);
        Ok(())
    });
    run.subtest("pass-two", |_| Ok(()));
    run.exit()
}

fn write_marker(text: &[u8]) {
    // SAFETY: write(2) is async-signal-safe.
    unsafe {
        libc::write(
            libc::STDOUT_FILENO,
            text.as_ptr() as *const libc::c_void,
            text.len(),
        );
    }
}

fn alarm_cleanup(sig: i32) {
    if sig == libc::SIGALRM {
        write_marker(b"cleanup after alarm\n");
    }
}

fn timeout() -> ! {
    let mut run = init(&["--timeout", "1s"]);
    gfxtest::install_exit_handler(alarm_cleanup).unwrap();
    run.subtest("hang", |_| {
        std::thread::sleep(Duration::from_secs(30));
        Ok(())
    });
    run.exit()
}

fn handler_a(sig: i32) {
    println!("handler a sig={sig}");
}

fn handler_b(sig: i32) {
    println!("handler b sig={sig}");
}

fn exit_handlers() -> ! {
    let mut run = init(&[]);
    gfxtest::install_exit_handler(handler_a).unwrap();
    gfxtest::install_exit_handler(handler_b).unwrap();
    gfxtest::install_exit_handler(handler_a).unwrap();
    run.subtest("pass-one", |_| Ok(()));
    run.exit()
}

fn signal_marker(sig: i32) {
    if sig == libc::SIGTERM {
        write_marker(b"handler ran for SIGTERM\n");
    }
}

fn exit_handler_signal() -> ! {
    let _run = init(&[]);
    gfxtest::install_exit_handler(signal_marker).unwrap();
    // SAFETY: raising a signal on ourselves.
    unsafe {
        libc::raise(libc::SIGTERM);
    }
    unreachable!("SIGTERM did not terminate the process")
}

fn segfault_child() -> ! {
    let mut run = init(&[]);
    run.subtest("segv", |subtest| {
        subtest.fork(2, |index| {
            if index == 0 {
                // SAFETY: deliberately crashing the child.
                unsafe {
                    libc::raise(libc::SIGSEGV);
                }
            }
            Ok(())
        })?;
        subtest.wait_children()
    });
    run.subtest("after", |_| Ok(()));
    run.exit()
}

fn child_failure_kills_siblings() -> ! {
    let mut run = init(&[]);
    run.subtest("one-fails", |subtest| {
        subtest.fork(3, |index| {
            if index == 0 {
                gt_assert!(index != 0, "first child fails");
            }
            std::thread::sleep(Duration::from_secs(30));
            Ok(())
        })?;
        subtest.wait_children()
    });
    run.exit()
}

fn group_skip() -> ! {
    let mut run = init(&["--results", "group.json"]);
    run.subtest_group(|run| {
        run.fixture(|| {
            let has_hardware = false;
            gt_require!(has_hardware, "no hardware");
            Ok(())
        });
        run.subtest("grouped-a", |_| Ok(()));
        run.subtest("grouped-b", |_| Ok(()));
    });
    run.subtest("outside", |_| Ok(()));
    run.exit()
}

fn fixture_failure() -> ! {
    let mut run = init(&[]);
    run.subtest("before", |_| Ok(()));
    run.fixture(|| {
        let ready = false;
        gt_assert!(ready, "setup broke");
        Ok(())
    });
    run.subtest("later", |_| Ok(()));
    run.exit()
}

fn simulation() -> ! {
    let mut run = init(&[]);
    run.subtest("heavy", |_| {
        gfxtest::skip_on_simulation()?;
        Ok(())
    });
    run.exit()
}

fn list() -> ! {
    let mut run = init(&["--list-subtests"]);
    let fixture_ran = run.fixture(|| Ok(())).is_some();
    assert!(!fixture_ran);
    subtests(&mut run);
    run.exit()
}

fn filter() -> ! {
    let mut run = init(&["--run-subtest", "pass-*,!pass-two"]);
    subtests(&mut run);
    run.exit()
}

fn unknown_subtest() -> ! {
    let mut run = init(&["--run-subtest", "no-such-subtest"]);
    subtests(&mut run);
    run.exit()
}

fn bad_option() -> ! {
    let mut run = init(&["--frobnicate"]);
    subtests(&mut run);
    run.exit()
}

fn help() -> ! {
    let mut run = TestRun::init_from(
        argv(&["--help"]),
        ExtraOptions::new().help("  --rounds N  repeat N times"),
        true,
    );
    subtests(&mut run);
    run.exit()
}

fn extra_option(args: &[&str]) -> ! {
    use clap::{Arg, value_parser};

    let extra = ExtraOptions::new()
        .arg(
            Arg::new("rounds")
                .long("rounds")
                .value_parser(value_parser!(u32)),
        )
        .handler(|id, matches| match matches.get_one::<u32>(id) {
            Some(0) => Err("must be positive".to_string()),
            Some(rounds) => {
                println!("rounds={rounds}");
                Ok(())
            }
            None => Ok(()),
        });
    let mut run = TestRun::init_from(argv(args), extra, true);
    run.subtest("pass-one", |_| Ok(()));
    run.exit()
}

fn results() -> ! {
    let mut run = init(&["--results", "out/results.json"]);
    subtests(&mut run);
    run.subtest("fail-one", |_| gt_fail!(42, "broken"));
    run.exit()
}

fn helper() -> ! {
    let mut run = init(&[]);
    run.subtest("stopped", |_| {
        let mut helper = HelperProcess::new();
        helper
            .fork(|| {
                loop {
                    std::thread::sleep(Duration::from_millis(10));
                }
            })
            .or_fail("fork helper")?;
        gt_assert!(helper.running());
        let status = helper.stop().or_fail("stop helper")?;
        gt_assert_eq!(status.code(), 128 + libc::SIGTERM);
        gt_assert!(!helper.running());
        Ok(())
    });
    run.subtest("failing-helper", |_| {
        let mut helper = HelperProcess::new();
        helper
            .fork(|| panic!("helper broke"))
            .or_fail("fork helper")?;
        let status = helper.join().or_fail("join helper")?;
        gt_assert_eq!(status.code(), EXIT_FAILURE);
        Ok(())
    });
    run.exit()
}

fn signal_helper() -> ! {
    let mut run = init(&[]);
    run.subtest("interrupted", |_| {
        let helper = SignalHelper::start().or_fail("start signal helper")?;
        std::thread::sleep(Duration::from_millis(100));
        let interruptions = helper.stop().or_fail("stop signal helper")?;
        gt_assert_cmp!(interruptions, >, 0);
        Ok(())
    });
    run.exit()
}

fn toplevel_skip() -> ! {
    let mut run = init(&[]);
    run.subtest("pass-one", |_| Ok(()));
    run.exit_with(Err(Bail::skip("driver not loaded")))
}

fn simple_skip() -> ! {
    let run = TestRun::init_from(argv(&[]), ExtraOptions::new(), false);
    run.simple(|_| gt_skip!("no device"))
}

fn simple_fail() -> ! {
    let run = TestRun::init_from(argv(&[]), ExtraOptions::new(), false);
    run.simple(|_| gt_fail!(42, "wrong answer"))
}

fn simple_fork() -> ! {
    let run = TestRun::init_from(argv(&[]), ExtraOptions::new(), false);
    run.simple(|test| {
        test.fork(2, |_| Ok(()))?;
        gt_assert_eq!(test.children(), 2);
        test.wait_children()?;
        test.fork(3, |index| {
            if index == 1 {
                gt_fail!(42, "child {index} saw bad state");
            }
            Ok(())
        })?;
        test.wait_children()
    })
}

fn simple_leftover_child() -> ! {
    let run = TestRun::init_from(argv(&[]), ExtraOptions::new(), false);
    run.simple(|test| {
        test.fork(1, |_| {
            std::thread::sleep(Duration::from_secs(30));
            Ok(())
        })
    })
}

fn simple_list() -> ! {
    let run = TestRun::init_from(argv(&["--list-subtests"]), ExtraOptions::new(), false);
    run.simple(|_| Ok(()))
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_mixed_outcomes_succeed() {
    let out = run_scenario("mixed");
    assert_eq!(out.code(), Some(EXIT_SUCCESS), "{}", out.stderr);
    assert!(out.stdout.contains("gfxtest-version: "));
    assert!(out.stdout.contains("Starting subtest: pass-one"));
    assert!(out.stdout.contains("Subtest pass-one: SUCCESS"));
    assert!(out.stdout.contains("Subtest skip-one: SKIP"));
    assert!(out.stdout.contains("Summary: 2 passed, 1 skipped, 0 failed"));
}

#[test]
fn test_only_skips_exit_77() {
    let out = run_scenario("skip_only");
    assert_eq!(out.code(), Some(EXIT_SKIP));
    assert_eq!(out.count(": SKIP"), 2);
}

#[test]
fn test_failure_is_reported_and_run_continues() {
    let out = run_scenario("fail");
    assert_eq!(out.code(), Some(EXIT_FAILURE));
    assert!(out.stdout.contains("Subtest fail-one: FAIL"));
    assert!(out.stdout.contains("Subtest pass-two: SUCCESS"));
    assert!(out.stderr.contains("value == 4"));
    assert!(out.stderr.contains("error: 3 != 4"));
}

#[test]
fn test_timeout_exits_78() {
    let started = Instant::now();
    let out = run_scenario("timeout");
    assert_eq!(out.code(), Some(EXIT_TIMEOUT));
    assert!(out.stdout.contains("Subtest hang: TIMEOUT"));
    assert!(out.stdout.contains("cleanup after alarm"));
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn test_exit_handlers_run_once_newest_first() {
    let out = run_scenario("exit_handlers");
    assert_eq!(out.code(), Some(EXIT_SUCCESS));
    assert_eq!(out.count("handler a sig=0"), 1);
    assert_eq!(out.count("handler b sig=0"), 1);
    let a = out.stdout.find("handler a").unwrap();
    let b = out.stdout.find("handler b").unwrap();
    assert!(b < a);
}

#[test]
fn test_exit_handlers_run_on_fatal_signal() {
    let out = run_scenario("exit_handler_signal");
    assert_eq!(out.status.signal(), Some(libc::SIGTERM));
    assert_eq!(out.count("handler ran for SIGTERM"), 1);
}

#[test]
fn test_crashing_child_fails_only_its_subtest() {
    let out = run_scenario("segfault_child");
    assert_eq!(out.code(), Some(128 + libc::SIGSEGV));
    assert!(out.stdout.contains("Subtest segv: FAIL"));
    assert!(out.stderr.contains("child 0 died with signal 11"));
    assert!(out.stdout.contains("Subtest after: SUCCESS"));
}

#[test]
fn test_child_failure_kills_siblings() {
    let started = Instant::now();
    let out = run_scenario("child_failure_kills_siblings");
    assert_eq!(out.code(), Some(EXIT_FAILURE));
    assert!(out.stderr.contains("Child 0 failed"));
    assert!(out.stdout.contains("Subtest one-fails: FAIL"));
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn test_fixture_skip_skips_group_only() {
    let out = run_scenario("group_skip");
    assert_eq!(out.code(), Some(EXIT_SUCCESS));
    assert!(out.stdout.contains("Subtest grouped-a: SKIP"));
    assert!(out.stdout.contains("Subtest grouped-b: SKIP"));
    assert!(!out.stdout.contains("Starting subtest: grouped-a"));
    assert!(out.stdout.contains("Subtest outside: SUCCESS"));
    assert!(out.stdout.contains("Summary: 1 passed, 2 skipped, 0 failed"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.dir.path().join("group.json")).unwrap())
            .unwrap();
    assert_eq!(report["summary"]["skipped"], 2);
    assert_eq!(report["subtests"][0]["name"], "grouped-a");
    assert_eq!(report["subtests"][0]["outcome"], "skip");
}

#[test]
fn test_fixture_failure_ends_run() {
    let out = run_scenario("fixture_failure");
    assert_eq!(out.code(), Some(EXIT_FAILURE));
    assert!(out.stderr.contains("Fixture failed"));
    assert!(out.stderr.contains("setup broke"));
    assert!(out.stdout.contains("Subtest before: SUCCESS"));
    assert!(!out.stdout.contains("Starting subtest: later"));
}

#[test]
fn test_simulation_skips() {
    let out = run_scenario_with_env("simulation", &[("INTEL_SIMULATION", "1")]);
    assert_eq!(out.code(), Some(EXIT_SKIP));
    assert!(out.stdout.contains("Subtest heavy: SKIP"));

    let out = run_scenario("simulation");
    assert_eq!(out.code(), Some(EXIT_SUCCESS));
}

#[test]
fn test_list_subtests_runs_nothing() {
    let out = run_scenario("list");
    assert_eq!(out.code(), Some(EXIT_SUCCESS), "{}", out.stderr);
    // libtest's "test scenario_entry ... " is still open when the first
    // name is printed, so compare last words.
    let listed: Vec<&str> = out
        .stdout
        .lines()
        .map(|line| line.rsplit(' ').next().unwrap_or(line))
        .skip_while(|name| *name != "pass-one")
        .collect();
    assert_eq!(listed, ["pass-one", "pass-two", "skip-one"]);
    assert!(!out.stdout.contains("Starting subtest"));
    assert!(!out.stdout.contains("gfxtest-version"));
}

#[test]
fn test_run_subtest_filter() {
    let out = run_scenario("filter");
    assert_eq!(out.code(), Some(EXIT_SUCCESS));
    assert!(out.stdout.contains("Subtest pass-one: SUCCESS"));
    assert!(!out.stdout.contains("pass-two"));
    assert!(!out.stdout.contains("skip-one"));
}

#[test]
fn test_unknown_subtest_is_invalid() {
    let out = run_scenario("unknown_subtest");
    assert_eq!(out.code(), Some(EXIT_INVALID));
    assert!(out.stderr.contains("Unknown subtest: no-such-subtest"));
}

#[test]
fn test_bad_option_is_invalid() {
    let out = run_scenario("bad_option");
    assert_eq!(out.code(), Some(EXIT_INVALID));
    assert!(out.stderr.contains("--frobnicate"));
}

#[test]
fn test_help_exits_zero() {
    let out = run_scenario("help");
    assert_eq!(out.code(), Some(EXIT_SUCCESS));
    assert!(out.stdout.contains("--list-subtests"));
    assert!(out.stdout.contains("--run-subtest"));
    assert!(out.stdout.contains("repeat N times"));
}

#[test]
fn test_extra_options() {
    let out = run_scenario("extra_option_ok");
    assert_eq!(out.code(), Some(EXIT_SUCCESS));
    assert!(out.stdout.contains("rounds=2"));

    let out = run_scenario("extra_option_rejected");
    assert_eq!(out.code(), Some(EXIT_INVALID));
    assert!(out.stderr.contains("invalid option --rounds: must be positive"));
}

#[test]
fn test_results_file() {
    let out = run_scenario("results");
    assert_eq!(out.code(), Some(42));

    let path = out.dir.path().join("out/results.json");
    let text = std::fs::read_to_string(path).unwrap();
    let report: serde_json::Value = serde_json::from_str(&text).unwrap();

    let outcomes: Vec<(&str, &str)> = report["subtests"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["name"].as_str().unwrap(), s["outcome"].as_str().unwrap()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("pass-one", "success"),
            ("pass-two", "success"),
            ("skip-one", "skip"),
            ("fail-one", "fail"),
        ]
    );
    assert_eq!(report["summary"]["exit_code"], 42);
    assert_eq!(report["summary"]["failed"], 1);
}

#[test]
fn test_helper_processes() {
    let out = run_scenario("helper");
    assert_eq!(out.code(), Some(EXIT_SUCCESS), "{}", out.stderr);
    assert!(out.stdout.contains("Subtest stopped: SUCCESS"));
    assert!(out.stdout.contains("Subtest failing-helper: SUCCESS"));
    assert!(out.stderr.contains("helper panicked: helper broke"));
}

#[test]
fn test_signal_helper_interrupts() {
    let out = run_scenario("signal_helper");
    assert_eq!(out.code(), Some(EXIT_SUCCESS), "{}", out.stderr);
    assert!(out.stdout.contains("Subtest interrupted: SUCCESS"));
}

#[test]
fn test_toplevel_skip() {
    let out = run_scenario("toplevel_skip");
    assert_eq!(out.code(), Some(EXIT_SKIP));
    assert!(out.stdout.contains("driver not loaded"));
}

#[test]
fn test_simple_tests() {
    let out = run_scenario("simple_skip");
    assert_eq!(out.code(), Some(EXIT_SKIP));
    assert!(!out.stdout.contains("Summary:"));

    let out = run_scenario("simple_fail");
    assert_eq!(out.code(), Some(42));
    assert!(out.stderr.contains("wrong answer"));

    let out = run_scenario("simple_list");
    assert_eq!(out.code(), Some(EXIT_INVALID));
}

#[test]
fn test_simple_test_forks_and_waits() {
    let out = run_scenario("simple_fork");
    assert_eq!(out.code(), Some(42), "{}", out.stderr);
    assert!(out.stderr.contains("child 1 saw bad state"));
    assert!(out.stderr.contains("child 1 failed with exit status 42"));
    assert!(!out.stdout.contains("Summary:"));

    let started = Instant::now();
    let out = run_scenario("simple_leftover_child");
    assert_eq!(out.code(), Some(EXIT_SUCCESS), "{}", out.stderr);
    assert!(started.elapsed() < Duration::from_secs(20));
}
