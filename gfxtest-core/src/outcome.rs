//! Test Outcomes
//!
//! A test body returns [`TestResult`]. Skips and failures travel as the error
//! half, so `?` and the assertion macros leave the body at the failing point
//! and nothing after it runs. The harness catches them at the subtest
//! boundary (or at the process boundary for fixtures and simple tests).

use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Every selected subtest succeeded
pub const EXIT_SUCCESS: i32 = 0;
/// Preconditions not met, nothing failed
pub const EXIT_SKIP: i32 = 77;
/// The global alarm expired
pub const EXIT_TIMEOUT: i32 = 78;
/// Bad command line or unknown subtest requested
pub const EXIT_INVALID: i32 = 79;
/// Default code of a failed assertion
pub const EXIT_FAILURE: i32 = 99;

/// Result of a test body
pub type TestResult<T = ()> = Result<T, Bail>;

/// Source position of a failed check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Source file
    pub file: &'static str,
    /// Line in `file`
    pub line: u32,
    /// Module path of the enclosing function
    pub module: &'static str,
}

/// Details of a skip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipReport {
    /// Where the requirement was checked
    pub location: Option<Location>,
    /// Literal text of the requirement
    pub condition: Option<String>,
    /// Caller-supplied explanation
    pub message: Option<String>,
}

/// Details of a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailReport {
    /// Process exit code this failure maps to
    pub exit_code: i32,
    /// Where the assertion was checked
    pub location: Option<Location>,
    /// Literal text of the assertion
    pub condition: Option<String>,
    /// Caller-supplied explanation
    pub message: Option<String>,
}

/// Non-local exit out of a test body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bail {
    /// Precondition not met
    #[error("{0}")]
    Skip(SkipReport),
    /// Assertion failed or the body asked to fail
    #[error("{0}")]
    Fail(FailReport),
}

impl Bail {
    /// Skip with a plain message.
    pub fn skip(message: impl Into<String>) -> Self {
        Bail::Skip(SkipReport {
            message: Some(message.into()),
            ..Default::default()
        })
    }

    /// Fail with `exit_code`.
    ///
    /// Codes 0 and 77 would be read as success and skip, passing them is a
    /// contract violation.
    pub fn fail(exit_code: i32) -> Self {
        Bail::Fail(FailReport {
            exit_code: checked_fail_code(exit_code),
            location: None,
            condition: None,
            message: None,
        })
    }

    /// Fail with `exit_code` and an explanation.
    pub fn fail_with(exit_code: i32, message: impl Into<String>) -> Self {
        Bail::Fail(FailReport {
            exit_code: checked_fail_code(exit_code),
            location: None,
            condition: None,
            message: Some(message.into()),
        })
    }

    #[doc(hidden)]
    pub fn assertion(location: Location, condition: &str, message: Option<String>) -> Self {
        Bail::Fail(FailReport {
            exit_code: EXIT_FAILURE,
            location: Some(location),
            condition: Some(condition.to_string()),
            message,
        })
    }

    #[doc(hidden)]
    pub fn requirement(location: Location, condition: &str, message: Option<String>) -> Self {
        Bail::Skip(SkipReport {
            location: Some(location),
            condition: Some(condition.to_string()),
            message,
        })
    }

    /// Failure describing a panic payload caught at a harness boundary.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Bail::fail_with(EXIT_FAILURE, format!("panicked: {}", panic_message(&*payload)))
    }

    /// Exit code a process ending on this outcome reports
    pub fn exit_code(&self) -> i32 {
        match self {
            Bail::Skip(_) => EXIT_SKIP,
            Bail::Fail(report) => report.exit_code,
        }
    }

    /// Whether this is a skip
    pub fn is_skip(&self) -> bool {
        matches!(self, Bail::Skip(_))
    }
}

fn checked_fail_code(exit_code: i32) -> i32 {
    if exit_code == EXIT_SUCCESS || exit_code == EXIT_SKIP {
        contract_violation(&format!("invalid failure exit code {exit_code}"));
    }
    exit_code
}

/// Extract the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl fmt::Display for SkipReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(loc) = &self.location {
            lines.push(format!(
                "Test requirement not met in function {}, file {}:{}:",
                loc.module, loc.file, loc.line
            ));
        }
        if let Some(condition) = &self.condition {
            lines.push(format!("Test requirement: {condition}"));
        }
        match &self.message {
            Some(message) => lines.push(message.clone()),
            None if lines.is_empty() => lines.push("Skipping".to_string()),
            None => {}
        }
        f.write_str(&lines.join("\n"))
    }
}

impl fmt::Display for FailReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(loc) = &self.location {
            lines.push(format!(
                "Test assertion failure function {}, file {}:{}:",
                loc.module, loc.file, loc.line
            ));
        }
        if let Some(condition) = &self.condition {
            lines.push(format!("Failed assertion: {condition}"));
        }
        match &self.message {
            Some(message) => lines.push(message.clone()),
            None if lines.is_empty() => {
                lines.push(format!("Test failed with exit code {}", self.exit_code))
            }
            None => {}
        }
        f.write_str(&lines.join("\n"))
    }
}

/// Convert foreign errors into test outcomes.
///
/// ```ignore
/// let file = std::fs::File::open("/dev/dri/card0").or_skip("no DRM device")?;
/// ```
pub trait ResultExt<T> {
    /// Fail the test (code 99) with `context` and the error.
    fn or_fail(self, context: &str) -> TestResult<T>;
    /// Skip the test with `context` and the error.
    fn or_skip(self, context: &str) -> TestResult<T>;
}

impl<T, E: fmt::Display> ResultExt<T> for Result<T, E> {
    fn or_fail(self, context: &str) -> TestResult<T> {
        self.map_err(|e| Bail::fail_with(EXIT_FAILURE, format!("{context}: {e}")))
    }

    fn or_skip(self, context: &str) -> TestResult<T> {
        self.map_err(|e| Bail::skip(format!("{context}: {e}")))
    }
}

/// Abort on misuse of the harness itself.
///
/// Used for bugs in the test program (two outcomes for one subtest, a skip
/// inside a forked child, invalid subtest names), never for failures of the
/// thing under test.
pub fn contract_violation(message: &str) -> ! {
    eprintln!("gfxtest: internal error: {message}");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> Location {
        Location {
            file: "tests/gem_basic.rs",
            line: 42,
            module: "gem_basic::create",
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Bail::skip("x").exit_code(), EXIT_SKIP);
        assert_eq!(Bail::fail(3).exit_code(), 3);
        assert_eq!(Bail::assertion(here(), "a", None).exit_code(), EXIT_FAILURE);
        assert!(Bail::requirement(here(), "a", None).is_skip());
    }

    #[test]
    fn test_assertion_report_format() {
        let bail = Bail::assertion(here(), "handle != 0", Some("got 0".to_string()));
        assert_eq!(
            bail.to_string(),
            "Test assertion failure function gem_basic::create, file tests/gem_basic.rs:42:\n\
             Failed assertion: handle != 0\n\
             got 0"
        );
    }

    #[test]
    fn test_requirement_report_format() {
        let bail = Bail::requirement(here(), "has_feature", None);
        assert_eq!(
            bail.to_string(),
            "Test requirement not met in function gem_basic::create, file tests/gem_basic.rs:42:\n\
             Test requirement: has_feature"
        );
    }

    #[test]
    fn test_bare_reports() {
        assert_eq!(Bail::fail(5).to_string(), "Test failed with exit code 5");
        assert_eq!(Bail::skip("no device").to_string(), "no device");
    }

    #[test]
    fn test_panic_payloads() {
        let bail = Bail::from_panic(Box::new("boom"));
        assert_eq!(bail.exit_code(), EXIT_FAILURE);
        assert_eq!(bail.to_string(), "panicked: boom");

        let bail = Bail::from_panic(Box::new(String::from("owned")));
        assert_eq!(bail.to_string(), "panicked: owned");

        let bail = Bail::from_panic(Box::new(17u8));
        assert_eq!(bail.to_string(), "panicked: Unknown panic");
    }

    #[test]
    fn test_result_ext() {
        let err: Result<(), std::io::Error> = Err(std::io::Error::other("denied"));
        let bail = err.or_skip("opening device").unwrap_err();
        assert!(bail.is_skip());
        assert_eq!(bail.to_string(), "opening device: denied");

        let err: Result<u32, String> = Err("bad ioctl".to_string());
        let bail = err.or_fail("submitting batch").unwrap_err();
        assert_eq!(bail.exit_code(), EXIT_FAILURE);

        let ok: Result<u32, String> = Ok(7);
        assert_eq!(ok.or_fail("unused"), Ok(7));
    }
}
