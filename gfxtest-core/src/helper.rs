//! Helper Processes
//!
//! Background processes that run alongside a subtest, typically to inject
//! interference. Unlike forked children their exit status never affects the
//! subtest outcome.

use crate::exit_handler;
use crate::outcome::panic_message;
use crate::process::{self, ChildStatus, ProcessError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

/// Maximum number of helpers running at once
pub const MAX_HELPERS: usize = 4;

const FREE: i32 = 0;
const RESERVED: i32 = -1;

// Slot table read by the exit handler: 0 free, -1 forking, otherwise a pid.
static HELPER_PIDS: [AtomicI32; MAX_HELPERS] = [const { AtomicI32::new(FREE) }; MAX_HELPERS];

fn reserve_slot() -> Result<usize, ProcessError> {
    HELPER_PIDS
        .iter()
        .position(|slot| {
            slot.compare_exchange(FREE, RESERVED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        })
        .ok_or(ProcessError::TooManyHelpers)
}

fn release_slot(slot: usize) {
    HELPER_PIDS[slot].store(FREE, Ordering::Release);
}

/// Terminate and reap helpers still running when the process ends.
fn helper_exit_handler(_sig: i32) {
    for slot in &HELPER_PIDS {
        let pid = slot.load(Ordering::Acquire);
        if pid > 0 {
            // SAFETY: plain syscalls on a pid this process forked.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
                let mut status = 0;
                while libc::waitpid(pid, &mut status, 0) == -1
                    && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR)
                {}
            }
            slot.store(FREE, Ordering::Release);
        }
    }
}

/// Forget the parent's helpers in a freshly forked process.
pub(crate) fn reset_after_fork() {
    for slot in &HELPER_PIDS {
        slot.store(FREE, Ordering::Relaxed);
    }
}

/// A background process whose failures are not attributed to the subtest.
///
/// ```ignore
/// let mut hang = HelperProcess::new();
/// hang.fork(|| loop {
///     inject_hang();
///     std::thread::sleep(Duration::from_secs(1));
/// })?;
/// run_workload()?;
/// hang.stop()?;
/// ```
#[derive(Debug, Default)]
pub struct HelperProcess {
    pid: Option<libc::pid_t>,
    slot: usize,
    /// Stop with SIGKILL instead of SIGTERM
    pub use_sigkill: bool,
}

impl HelperProcess {
    /// A helper that is not running yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the helper was forked and not yet reaped
    pub fn running(&self) -> bool {
        self.pid.is_some()
    }

    /// Pid of the running helper
    pub fn pid(&self) -> Option<libc::pid_t> {
        self.pid
    }

    /// Fork the helper running `body`.
    ///
    /// The helper exits 0 when `body` returns and 99 if it panics.
    pub fn fork(&mut self, body: impl FnOnce()) -> Result<(), ProcessError> {
        if let Some(pid) = self.pid {
            return Err(ProcessError::AlreadyRunning(pid));
        }
        exit_handler::install_exit_handler(helper_exit_handler)?;
        let slot = reserve_slot()?;

        let forked = process::fork_process(|| {
            exit_handler::reset_after_fork();
            reset_after_fork();
            match catch_unwind(AssertUnwindSafe(body)) {
                Ok(()) => 0,
                Err(payload) => {
                    eprintln!("helper panicked: {}", panic_message(&*payload));
                    crate::outcome::EXIT_FAILURE
                }
            }
        });

        match forked {
            Ok(pid) => {
                HELPER_PIDS[slot].store(pid, Ordering::Release);
                self.pid = Some(pid);
                self.slot = slot;
                tracing::debug!("helper {pid} started");
                Ok(())
            }
            Err(e) => {
                release_slot(slot);
                Err(e)
            }
        }
    }

    /// Wait for the helper to exit on its own.
    pub fn join(&mut self) -> Result<ChildStatus, ProcessError> {
        let pid = self.pid.ok_or(ProcessError::NotRunning)?;
        let status = process::wait_pid(pid, 0)?
            .ok_or(ProcessError::NotRunning)?;
        release_slot(self.slot);
        self.pid = None;
        tracing::debug!("helper {pid} exited: {status}");
        Ok(status)
    }

    /// Signal the helper to stop and reap it.
    ///
    /// A status other than death by the sent signal (or a clean exit) is
    /// logged but not treated as an error.
    pub fn stop(&mut self) -> Result<ChildStatus, ProcessError> {
        let pid = self.pid.ok_or(ProcessError::NotRunning)?;
        let sig = if self.use_sigkill {
            libc::SIGKILL
        } else {
            libc::SIGTERM
        };
        // ESRCH only means it already exited, join still reaps it.
        let _ = process::kill(pid, sig);
        let status = self.join()?;
        match status {
            ChildStatus::Signaled(s) if s == sig => {}
            ChildStatus::Exited(0) => {}
            other => tracing::warn!("helper {pid} stopped with unexpected {other}"),
        }
        Ok(status)
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        if self.running() {
            let _ = self.stop();
        }
    }
}

/// Signals delivered by the running [`SignalHelper`]
static INTERRUPTIONS: AtomicU64 = AtomicU64::new(0);

extern "C" fn count_interruption(_sig: libc::c_int) {
    INTERRUPTIONS.fetch_add(1, Ordering::Relaxed);
}

/// Interval between interrupting signals
pub const SIGNAL_HELPER_INTERVAL: Duration = Duration::from_millis(2);

/// Helper that keeps interrupting the parent with SIGUSR1.
///
/// Exercises the restart paths of blocking syscalls. The parent's handler
/// only counts deliveries and is installed with `SA_RESTART`.
#[derive(Debug)]
pub struct SignalHelper {
    helper: HelperProcess,
}

impl SignalHelper {
    /// Install the counter and start the helper.
    pub fn start() -> Result<Self, ProcessError> {
        exit_handler::install_signal(libc::SIGUSR1, count_interruption, libc::SA_RESTART)?;
        INTERRUPTIONS.store(0, Ordering::Relaxed);

        // SAFETY: getpid cannot fail.
        let parent = unsafe { libc::getpid() };
        let mut helper = HelperProcess::new();
        helper.use_sigkill = true;
        helper.fork(move || {
            loop {
                // SAFETY: signalling our own parent; stops once it is gone.
                if unsafe { libc::kill(parent, libc::SIGUSR1) } != 0 {
                    break;
                }
                std::thread::sleep(SIGNAL_HELPER_INTERVAL);
            }
        })?;
        Ok(Self { helper })
    }

    /// Signals received since [`start`](Self::start)
    pub fn interruptions(&self) -> u64 {
        INTERRUPTIONS.load(Ordering::Relaxed)
    }

    /// Stop the helper, returning the number of signals received.
    pub fn stop(mut self) -> Result<u64, ProcessError> {
        self.helper.stop()?;
        Ok(self.interruptions())
    }
}
