//! Forked Children
//!
//! A subtest can fork worker processes so that a crash in the body turns into
//! an exit status instead of taking down the whole run. The parent tracks the
//! pids it forked and only ever reaps those, so helper processes keep their
//! statuses.

use crate::exit_handler::{self, ExitHandlerError};
use crate::outcome::{Bail, EXIT_FAILURE, TestResult, contract_violation};
use std::fmt;
use std::io::{self, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use thiserror::Error;

/// Errors from process management
#[derive(Debug, Error)]
pub enum ProcessError {
    /// fork() failed
    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),
    /// waitpid() failed
    #[error("waitpid({pid}) failed: {source}")]
    Wait {
        /// Process waited for
        pid: libc::pid_t,
        /// OS error
        #[source]
        source: io::Error,
    },
    /// kill() failed
    #[error("kill({pid}) failed: {source}")]
    Kill {
        /// Target process
        pid: libc::pid_t,
        /// OS error
        #[source]
        source: io::Error,
    },
    /// All helper slots are taken
    #[error("too many helper processes (max {})", crate::helper::MAX_HELPERS)]
    TooManyHelpers,
    /// The helper is already running
    #[error("helper already running as pid {0}")]
    AlreadyRunning(libc::pid_t),
    /// The helper is not running
    #[error("helper not running")]
    NotRunning,
    /// The child table is full
    #[error("too many children (max {})", MAX_CHILDREN)]
    TooManyChildren,
    /// Installing the cleanup handler failed
    #[error(transparent)]
    ExitHandler(#[from] ExitHandlerError),
}

/// How a reaped process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// Normal exit with this code
    Exited(i32),
    /// Killed by this signal
    Signaled(i32),
    /// waitpid() failed, so the real status is unknown
    Lost,
}

impl ChildStatus {
    /// Decode a raw waitpid() status word.
    pub fn from_raw(status: libc::c_int) -> Self {
        if libc::WIFSIGNALED(status) {
            ChildStatus::Signaled(libc::WTERMSIG(status))
        } else {
            ChildStatus::Exited(libc::WEXITSTATUS(status))
        }
    }

    /// Exit code as a shell would report it, `128 + signal` for signals
    pub fn code(self) -> i32 {
        match self {
            ChildStatus::Exited(code) => code,
            ChildStatus::Signaled(sig) => 128 + sig,
            ChildStatus::Lost => EXIT_FAILURE,
        }
    }

    /// Exited with 0
    pub fn success(self) -> bool {
        self == ChildStatus::Exited(0)
    }
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChildStatus::Exited(code) => write!(f, "exit status {code}"),
            ChildStatus::Signaled(sig) => write!(f, "signal {sig}, {}", signal_name(sig)),
            ChildStatus::Lost => f.write_str("unknown status"),
        }
    }
}

/// Human-readable description of `sig`.
pub fn signal_name(sig: i32) -> String {
    // SAFETY: strsignal returns a pointer to a static or thread-local string,
    // copied out before anything else can overwrite it.
    unsafe {
        let ptr = libc::strsignal(sig);
        if ptr.is_null() {
            return format!("signal {sig}");
        }
        std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// waitpid() retrying on EINTR.
pub(crate) fn wait_pid(
    pid: libc::pid_t,
    flags: libc::c_int,
) -> Result<Option<ChildStatus>, ProcessError> {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: status points to a live local.
        let rc = unsafe { libc::waitpid(pid, &mut status, flags) };
        if rc == pid {
            return Ok(Some(ChildStatus::from_raw(status)));
        }
        if rc == 0 {
            return Ok(None);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(ProcessError::Wait { pid, source: err });
        }
    }
}

pub(crate) fn kill(pid: libc::pid_t, sig: libc::c_int) -> Result<(), ProcessError> {
    // SAFETY: kill has no memory-safety preconditions.
    if unsafe { libc::kill(pid, sig) } != 0 {
        return Err(ProcessError::Kill {
            pid,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn flush_stdio() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Fork and run `child` in the new process, exiting with its return value.
///
/// Buffered output is flushed first so the child does not print it again.
/// Returns the child's pid in the parent.
pub(crate) fn fork_process(child: impl FnOnce() -> i32) -> Result<libc::pid_t, ProcessError> {
    flush_stdio();
    // SAFETY: the harness is single-threaded around fork and the child only
    // runs Rust code that does not depend on other threads.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(ProcessError::Fork(io::Error::last_os_error())),
        0 => {
            let code = child();
            flush_stdio();
            std::process::exit(code)
        }
        pid => Ok(pid),
    }
}

/// Capacity of the child table
pub const MAX_CHILDREN: usize = 512;

// Pids of forked children, visible to the signal-path exit handler.
static CHILD_PIDS: [AtomicI32; MAX_CHILDREN] = [const { AtomicI32::new(0) }; MAX_CHILDREN];
static CHILD_COUNT: AtomicUsize = AtomicUsize::new(0);

fn track_child(
    slots: &[AtomicI32],
    count: &AtomicUsize,
    pid: libc::pid_t,
) -> Result<(), ProcessError> {
    let index = count.load(Ordering::Acquire);
    if index >= slots.len() {
        return Err(ProcessError::TooManyChildren);
    }
    slots[index].store(pid, Ordering::Relaxed);
    count.store(index + 1, Ordering::Release);
    Ok(())
}

/// Record `pid` in the table, or kill and reap it if the table is full.
///
/// An untracked child would outlive the run and never be waited for.
fn track_or_reap(
    slots: &[AtomicI32],
    count: &AtomicUsize,
    pid: libc::pid_t,
) -> Result<(), ProcessError> {
    if let Err(e) = track_child(slots, count, pid) {
        let _ = kill(pid, libc::SIGKILL);
        let _ = wait_pid(pid, 0);
        return Err(e);
    }
    Ok(())
}

fn untrack_children() {
    let count = CHILD_COUNT.swap(0, Ordering::AcqRel);
    for slot in &CHILD_PIDS[..count] {
        slot.store(0, Ordering::Relaxed);
    }
}

/// Kill (on a signal) and reap every tracked child.
fn children_exit_handler(sig: i32) {
    let count = CHILD_COUNT.load(Ordering::Acquire);
    for slot in &CHILD_PIDS[..count] {
        let pid = slot.load(Ordering::Relaxed);
        if pid <= 0 {
            continue;
        }
        // SAFETY: plain syscalls on pids this process forked.
        unsafe {
            if sig != 0 {
                libc::kill(pid, libc::SIGKILL);
            }
            let mut status = 0;
            while libc::waitpid(pid, &mut status, 0) == -1
                && io::Error::last_os_error().raw_os_error() == Some(libc::EINTR)
            {}
        }
    }
}

/// Fork one child running `body(index)`.
///
/// The child exits 0 on success and with the failure code on a failure or
/// panic. A skip inside a child cannot be reported to the parent and is a
/// contract violation.
pub(crate) fn fork_child<F>(index: usize, body: &F) -> Result<libc::pid_t, ProcessError>
where
    F: Fn(usize) -> TestResult,
{
    exit_handler::install_exit_handler(children_exit_handler)?;
    let pid = fork_process(|| {
        exit_handler::reset_after_fork();
        crate::helper::reset_after_fork();
        untrack_children();
        match catch_unwind(AssertUnwindSafe(|| body(index))) {
            Ok(Ok(())) => 0,
            Ok(Err(Bail::Skip(report))) => {
                contract_violation(&format!("skip in forked child {index}: {report}"))
            }
            Ok(Err(Bail::Fail(report))) => {
                eprintln!("{report}");
                eprintln!("Child {index} failed");
                report.exit_code
            }
            Err(payload) => {
                eprintln!("{}", Bail::from_panic(payload));
                EXIT_FAILURE
            }
        }
    })?;
    track_or_reap(&CHILD_PIDS, &CHILD_COUNT, pid)?;
    Ok(pid)
}

/// First child that did not exit cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildFailure {
    /// Index passed to the child body
    pub index: usize,
    /// Child pid
    pub pid: libc::pid_t,
    /// How it ended
    pub status: ChildStatus,
}

impl fmt::Display for ChildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            ChildStatus::Exited(code) => {
                write!(f, "child {} failed with exit status {code}", self.index)
            }
            ChildStatus::Signaled(sig) => write!(
                f,
                "child {} died with signal {sig}, {}",
                self.index,
                signal_name(sig)
            ),
            ChildStatus::Lost => write!(f, "child {} could not be waited for", self.index),
        }
    }
}

/// Reap every pid in `pids`.
///
/// On the first abnormal status the remaining children are killed with
/// SIGKILL and reaped. Every pid is reaped before this returns.
pub(crate) fn wait_children(pids: &[libc::pid_t]) -> Result<(), ChildFailure> {
    let mut pending: Vec<(usize, libc::pid_t)> = pids.iter().copied().enumerate().collect();
    let mut failure: Option<ChildFailure> = None;

    while !pending.is_empty() {
        let mut reaped_any = false;
        pending.retain(|&(index, pid)| match wait_pid(pid, libc::WNOHANG) {
            Ok(None) => true,
            Ok(Some(status)) => {
                reaped_any = true;
                if !status.success() && failure.is_none() {
                    failure = Some(ChildFailure { index, pid, status });
                }
                false
            }
            Err(e) => {
                reaped_any = true;
                if let Some(lost) = wait_error_failure(index, pid, e) {
                    if failure.is_none() {
                        failure = Some(lost);
                    }
                }
                false
            }
        });

        if failure.is_some() {
            for &(_, pid) in &pending {
                let _ = kill(pid, libc::SIGKILL);
            }
        }
        if !reaped_any && !pending.is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    untrack_children();
    failure.map_or(Ok(()), Err)
}

/// Classify a waitpid() error for a tracked child.
///
/// ECHILD means someone else already reaped it, which is not a failure.
/// Anything else leaves the child's fate unknown and fails the wait.
fn wait_error_failure(index: usize, pid: libc::pid_t, err: ProcessError) -> Option<ChildFailure> {
    if let ProcessError::Wait { source, .. } = &err {
        if source.raw_os_error() == Some(libc::ECHILD) {
            return None;
        }
    }
    eprintln!("gfxtest: warning: {err}");
    Some(ChildFailure {
        index,
        pid,
        status: ChildStatus::Lost,
    })
}

/// Reap children a subtest forked but never waited for.
pub(crate) fn reap_leftover_children(pids: &[libc::pid_t]) {
    for &pid in pids {
        let _ = kill(pid, libc::SIGKILL);
        let _ = wait_pid(pid, 0);
    }
    untrack_children();
}

/// Fail the current subtest with the status of `failure`.
pub(crate) fn failure_to_bail(failure: ChildFailure) -> Bail {
    let code = failure.status.code();
    // Exit codes that would read as success or skip are still failures.
    let code = if code == 0 || code == crate::outcome::EXIT_SKIP {
        EXIT_FAILURE
    } else {
        code
    };
    Bail::fail_with(code, failure.to_string())
}
