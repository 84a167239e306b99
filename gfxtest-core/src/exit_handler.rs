//! Exit Handlers
//!
//! Cleanup callbacks that run when the test process ends, either through a
//! normal exit or through a fatal signal. Handlers run at most once, newest
//! first, and are kept in a fixed table of function pointers so the signal
//! path never allocates or locks.

use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

/// Cleanup callback, receives the signal number or 0 on normal exit
pub type ExitHandler = fn(i32);

/// Capacity of the handler table
pub const MAX_EXIT_HANDLERS: usize = 10;

/// Signals that trigger the exit handlers before the process dies
pub const HANDLED_SIGNALS: [libc::c_int; 8] = [
    libc::SIGINT,
    libc::SIGHUP,
    libc::SIGTERM,
    libc::SIGQUIT,
    libc::SIGPIPE,
    libc::SIGABRT,
    libc::SIGSEGV,
    libc::SIGBUS,
];

/// Errors from exit handler registration
#[derive(Debug, Error)]
pub enum ExitHandlerError {
    /// The table already holds [`MAX_EXIT_HANDLERS`] handlers
    #[error("exit handler table full ({} handlers)", MAX_EXIT_HANDLERS)]
    Full,
    /// sigaction() refused a signal
    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        /// Signal number
        signal: i32,
        /// OS error
        #[source]
        source: io::Error,
    },
}

/// Fixed-capacity table of exit handlers.
pub(crate) struct ExitHandlerRegistry {
    slots: [AtomicUsize; MAX_EXIT_HANDLERS],
    count: AtomicUsize,
}

impl ExitHandlerRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [const { AtomicUsize::new(0) }; MAX_EXIT_HANDLERS],
            count: AtomicUsize::new(0),
        }
    }

    /// Add `handler` unless it is already registered.
    pub(crate) fn register(&self, handler: ExitHandler) -> Result<(), ExitHandlerError> {
        let addr = handler as usize;
        let count = self.count.load(Ordering::Acquire);
        if self.slots[..count]
            .iter()
            .any(|slot| slot.load(Ordering::Relaxed) == addr)
        {
            return Ok(());
        }
        if count >= MAX_EXIT_HANDLERS {
            return Err(ExitHandlerError::Full);
        }
        self.slots[count].store(addr, Ordering::Relaxed);
        self.count.store(count + 1, Ordering::Release);
        Ok(())
    }

    /// Run and forget every handler, newest first.
    ///
    /// The table is emptied before the first call so a handler that ends up
    /// back here (a second signal, an exit from inside a handler) finds
    /// nothing left to run.
    pub(crate) fn drain(&self, sig: i32) {
        let count = self.count.swap(0, Ordering::AcqRel);
        for slot in self.slots[..count].iter().rev() {
            let addr = slot.swap(0, Ordering::Relaxed);
            if addr != 0 {
                // SAFETY: only `register` stores into the slots, always from
                // an `ExitHandler` function pointer.
                let handler: ExitHandler = unsafe { std::mem::transmute::<usize, fn(i32)>(addr) };
                handler(sig);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        let count = self.count.swap(0, Ordering::AcqRel);
        for slot in &self.slots[..count] {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

static REGISTRY: ExitHandlerRegistry = ExitHandlerRegistry::new();
static HOOKS_INSTALLED: AtomicBool = AtomicBool::new(false);
static DISABLED: AtomicBool = AtomicBool::new(false);
static SAVED_MASK: Mutex<Option<libc::sigset_t>> = Mutex::new(None);

/// Register `handler` to run when the process exits or dies from one of
/// [`HANDLED_SIGNALS`].
///
/// Registering the same function twice has no effect. The first call installs
/// the signal hooks and the process exit hook.
pub fn install_exit_handler(handler: ExitHandler) -> Result<(), ExitHandlerError> {
    REGISTRY.register(handler)?;

    if !HOOKS_INSTALLED.swap(true, Ordering::AcqRel) {
        for &sig in &HANDLED_SIGNALS {
            install_signal(sig, fatal_signal_handler, 0)?;
        }
        // SAFETY: atexit_hook is a plain extern "C" fn with no arguments.
        unsafe {
            libc::atexit(atexit_hook);
        }
    }
    Ok(())
}

/// Number of handlers currently registered.
pub fn exit_handler_count() -> usize {
    REGISTRY.len()
}

/// Run every registered handler now, newest first, with `sig` as argument.
///
/// Handlers that ran are removed.
pub fn run_exit_handlers(sig: i32) {
    REGISTRY.drain(sig);
}

/// Block the handled signals until [`enable_exit_handler`].
///
/// Brackets short critical sections in which a handler must not observe
/// half-updated state. Nested calls are not counted.
pub fn disable_exit_handler() {
    let mut saved = SAVED_MASK.lock().unwrap_or_else(|e| e.into_inner());
    if saved.is_some() {
        return;
    }
    // SAFETY: both sets are initialized by sigemptyset before use.
    unsafe {
        let mut block: libc::sigset_t = std::mem::zeroed();
        let mut old: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut block);
        libc::sigemptyset(&mut old);
        for &sig in &HANDLED_SIGNALS {
            libc::sigaddset(&mut block, sig);
        }
        libc::sigprocmask(libc::SIG_BLOCK, &block, &mut old);
        *saved = Some(old);
    }
    DISABLED.store(true, Ordering::Release);
}

/// Restore the signal mask saved by [`disable_exit_handler`].
pub fn enable_exit_handler() {
    let mut saved = SAVED_MASK.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(old) = saved.take() {
        // SAFETY: `old` was filled in by sigprocmask.
        unsafe {
            libc::sigprocmask(libc::SIG_SETMASK, &old, std::ptr::null_mut());
        }
    }
    DISABLED.store(false, Ordering::Release);
}

/// Install `handler` for `sig` with `flags` and an empty mask.
pub(crate) fn install_signal(
    sig: libc::c_int,
    handler: extern "C" fn(libc::c_int),
    flags: libc::c_int,
) -> Result<(), ExitHandlerError> {
    // SAFETY: the sigaction struct is zeroed and filled in before use.
    let rc = unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as *const () as usize;
        sa.sa_flags = flags;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(sig, &sa, std::ptr::null_mut())
    };
    if rc != 0 {
        return Err(ExitHandlerError::Install {
            signal: sig,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn restore_default(sig: libc::c_int) {
    // SAFETY: SIG_DFL is always a valid disposition.
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}

extern "C" fn fatal_signal_handler(sig: libc::c_int) {
    for &handled in &HANDLED_SIGNALS {
        restore_default(handled);
    }
    REGISTRY.drain(sig);
    // SAFETY: the default disposition is back in place, this terminates us
    // with the original signal.
    unsafe {
        libc::raise(sig);
    }
}

extern "C" fn atexit_hook() {
    if !DISABLED.load(Ordering::Acquire) {
        REGISTRY.drain(0);
    }
}

/// Forget inherited handlers in a freshly forked child.
///
/// The parent's handlers clean up the parent's state, a child running them on
/// its own exit would tear that state down underneath the parent.
pub(crate) fn reset_after_fork() {
    REGISTRY.reset();
    DISABLED.store(false, Ordering::Release);
    let mut saved = SAVED_MASK.lock().unwrap_or_else(|e| e.into_inner());
    *saved = None;
}

/// Run the exit handlers for `sig` and leave with `code` without returning.
///
/// Async-signal-safe apart from whatever the handlers themselves do.
pub(crate) fn signal_exit(sig: i32, code: i32) -> ! {
    REGISTRY.drain(sig);
    // SAFETY: _exit never returns and skips atexit hooks, which already ran.
    unsafe { libc::_exit(code) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static TRACE: StdMutex<Vec<String>> = StdMutex::new(Vec::new());

    fn first(sig: i32) {
        TRACE.lock().unwrap().push(format!("first:{sig}"));
    }

    fn second(sig: i32) {
        TRACE.lock().unwrap().push(format!("second:{sig}"));
    }

    fn noop(sig: i32) {
        std::hint::black_box(sig + 1);
    }

    #[test]
    fn test_registry_runs_newest_first_once() {
        let registry = ExitHandlerRegistry::new();
        registry.register(first).unwrap();
        registry.register(second).unwrap();
        registry.register(first).unwrap();
        assert_eq!(registry.len(), 2);

        TRACE.lock().unwrap().clear();
        registry.drain(15);
        registry.drain(0);
        assert_eq!(*TRACE.lock().unwrap(), vec!["second:15", "first:15"]);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_capacity() {
        fn h0(s: i32) {
            std::hint::black_box(s + 10);
        }
        fn h1(s: i32) {
            std::hint::black_box(s + 11);
        }
        fn h2(s: i32) {
            std::hint::black_box(s + 12);
        }
        fn h3(s: i32) {
            std::hint::black_box(s + 13);
        }
        fn h4(s: i32) {
            std::hint::black_box(s + 14);
        }
        fn h5(s: i32) {
            std::hint::black_box(s + 15);
        }
        fn h6(s: i32) {
            std::hint::black_box(s + 16);
        }
        fn h7(s: i32) {
            std::hint::black_box(s + 17);
        }
        fn h8(s: i32) {
            std::hint::black_box(s + 18);
        }
        fn h9(s: i32) {
            std::hint::black_box(s + 19);
        }
        let registry = ExitHandlerRegistry::new();
        let handlers: [ExitHandler; 10] = [h0, h1, h2, h3, h4, h5, h6, h7, h8, h9];
        for h in handlers {
            registry.register(h).unwrap();
        }
        assert!(matches!(registry.register(noop), Err(ExitHandlerError::Full)));
        registry.reset();
        assert_eq!(registry.len(), 0);
        assert!(registry.register(noop).is_ok());
    }
}
