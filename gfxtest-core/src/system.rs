//! Kernel Log and OOM Score

use std::fs::OpenOptions;
use std::io::Write;

/// Append `message` to the kernel log at info level.
///
/// Lets kernel-side traces be matched with test progress. Failures (no
/// permission, no /dev/kmsg) are ignored.
pub fn kmsg(message: &str) {
    let Ok(mut file) = OpenOptions::new().write(true).open("/dev/kmsg") else {
        return;
    };
    let _ = writeln!(file, "<6>[gfxtest] {}", message.trim_end());
}

/// Make this process the first victim of the OOM killer.
///
/// Tests that exhaust memory on purpose should take themselves down, not
/// the display server.
pub fn oom_adjust_for_doom() {
    if let Err(e) = std::fs::write("/proc/self/oom_score_adj", "1000") {
        tracing::warn!("failed to adjust OOM score: {e}");
    }
}
