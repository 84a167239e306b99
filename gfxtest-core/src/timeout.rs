//! Global Timeout
//!
//! A single SIGALRM-based watchdog for the whole test process. When it fires
//! the current subtest is reported as timed out, the exit handlers run and the
//! process leaves with [`EXIT_TIMEOUT`](crate::EXIT_TIMEOUT).

use crate::exit_handler::{ExitHandlerError, install_signal, signal_exit};
use crate::outcome::EXIT_TIMEOUT;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

const LABEL_CAPACITY: usize = 128;

/// Fixed buffer readable from a signal handler without locks.
struct LabelBuffer {
    bytes: [AtomicU8; LABEL_CAPACITY],
    len: AtomicUsize,
}

impl LabelBuffer {
    const fn new() -> Self {
        Self {
            bytes: [const { AtomicU8::new(0) }; LABEL_CAPACITY],
            len: AtomicUsize::new(0),
        }
    }

    fn set(&self, name: &str) {
        self.len.store(0, Ordering::Release);
        let bytes = name.as_bytes();
        let len = bytes.len().min(LABEL_CAPACITY);
        for (slot, &byte) in self.bytes.iter().zip(&bytes[..len]) {
            slot.store(byte, Ordering::Relaxed);
        }
        self.len.store(len, Ordering::Release);
    }

    fn clear(&self) {
        self.len.store(0, Ordering::Release);
    }

    /// Copy the label into `buf`, returning its length.
    fn read(&self, buf: &mut [u8; LABEL_CAPACITY]) -> usize {
        let len = self.len.load(Ordering::Acquire);
        for (out, slot) in buf.iter_mut().zip(&self.bytes[..len]) {
            *out = slot.load(Ordering::Relaxed);
        }
        len
    }
}

// Name of the running subtest
static LABEL: LabelBuffer = LabelBuffer::new();

/// Record the name of the running subtest for the timeout message.
///
/// Names longer than the internal buffer are truncated.
pub(crate) fn set_label(name: &str) {
    LABEL.set(name);
}

pub(crate) fn clear_label() {
    LABEL.clear();
}

/// Arm (or with a zero duration, cancel) the global timeout.
///
/// Durations are rounded up to whole seconds. Arming again replaces the
/// previous deadline.
pub fn set_timeout(timeout: Duration) -> Result<(), ExitHandlerError> {
    let mut secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs += 1;
    }
    if secs > 0 {
        install_signal(libc::SIGALRM, alarm_handler, 0)?;
    }
    let secs = u32::try_from(secs).unwrap_or(u32::MAX);
    // SAFETY: alarm() has no memory-safety preconditions.
    unsafe {
        libc::alarm(secs);
    }
    Ok(())
}

fn write_stdout(bytes: &[u8]) {
    // SAFETY: write(2) is async-signal-safe and `bytes` outlives the call.
    unsafe {
        libc::write(
            libc::STDOUT_FILENO,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
    }
}

extern "C" fn alarm_handler(sig: libc::c_int) {
    let mut buf = [0u8; LABEL_CAPACITY];
    let len = LABEL.read(&mut buf);
    if len > 0 {
        write_stdout(b"Subtest ");
        write_stdout(&buf[..len]);
        write_stdout(b": TIMEOUT\n");
    } else {
        write_stdout(b"Timed out\n");
    }
    signal_exit(sig, EXIT_TIMEOUT);
}
