//! Assertion and Requirement Macros
//!
//! Every macro expands to an early `return Err(..)`, so it can only be used in
//! a function returning [`TestResult`](crate::TestResult). Failures carry the
//! source location and the literal text of the checked expression.

/// Location of the macro call site
#[doc(hidden)]
#[macro_export]
macro_rules! __gt_location {
    () => {
        $crate::Location {
            file: ::core::file!(),
            line: ::core::line!(),
            module: ::core::module_path!(),
        }
    };
}

/// Fail the current subtest (exit code 99) unless `cond` holds.
///
/// ```ignore
/// gt_assert!(handle != 0);
/// gt_assert!(size <= limit, "object of {} bytes exceeds {}", size, limit);
/// ```
#[macro_export]
macro_rules! gt_assert {
    ($cond:expr $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($crate::Bail::assertion(
                $crate::__gt_location!(),
                ::core::stringify!($cond),
                ::core::option::Option::None,
            ));
        }
    };
    ($cond:expr, $($fmt:tt)+) => {
        if !$cond {
            return ::core::result::Result::Err($crate::Bail::assertion(
                $crate::__gt_location!(),
                ::core::stringify!($cond),
                ::core::option::Option::Some(::std::format!($($fmt)+)),
            ));
        }
    };
}

/// Fail unless `left` and `right` compare with `op`, reporting both values.
///
/// ```ignore
/// gt_assert_cmp!(elapsed_ms, <, 100);
/// ```
#[macro_export]
macro_rules! gt_assert_cmp {
    ($left:expr, $op:tt, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left $op *right) {
                    return ::core::result::Result::Err($crate::Bail::assertion(
                        $crate::__gt_location!(),
                        ::core::concat!(
                            ::core::stringify!($left),
                            " ",
                            ::core::stringify!($op),
                            " ",
                            ::core::stringify!($right)
                        ),
                        ::core::option::Option::Some(::std::format!(
                            "error: {:?} {} {:?}",
                            left,
                            $crate::__private::negate_op(::core::stringify!($op)),
                            right
                        )),
                    ));
                }
            }
        }
    };
}

/// Fail unless `left == right`.
#[macro_export]
macro_rules! gt_assert_eq {
    ($left:expr, $right:expr $(,)?) => {
        $crate::gt_assert_cmp!($left, ==, $right)
    };
}

/// Fail if `left == right`.
#[macro_export]
macro_rules! gt_assert_neq {
    ($left:expr, $right:expr $(,)?) => {
        $crate::gt_assert_cmp!($left, !=, $right)
    };
}

/// Fail (exit code 99) if `cond` holds.
#[macro_export]
macro_rules! gt_fail_on {
    ($cond:expr $(,)?) => {
        if $cond {
            return ::core::result::Result::Err($crate::Bail::assertion(
                $crate::__gt_location!(),
                ::core::stringify!($cond),
                ::core::option::Option::None,
            ));
        }
    };
    ($cond:expr, $($fmt:tt)+) => {
        if $cond {
            return ::core::result::Result::Err($crate::Bail::assertion(
                $crate::__gt_location!(),
                ::core::stringify!($cond),
                ::core::option::Option::Some(::std::format!($($fmt)+)),
            ));
        }
    };
}

/// Skip the current subtest unless `cond` holds.
///
/// Used for preconditions on the environment: missing hardware, missing
/// kernel features, insufficient privileges.
#[macro_export]
macro_rules! gt_require {
    ($cond:expr $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($crate::Bail::requirement(
                $crate::__gt_location!(),
                ::core::stringify!($cond),
                ::core::option::Option::None,
            ));
        }
    };
    ($cond:expr, $($fmt:tt)+) => {
        if !$cond {
            return ::core::result::Result::Err($crate::Bail::requirement(
                $crate::__gt_location!(),
                ::core::stringify!($cond),
                ::core::option::Option::Some(::std::format!($($fmt)+)),
            ));
        }
    };
}

/// Skip the current subtest if `cond` holds.
#[macro_export]
macro_rules! gt_skip_on {
    ($cond:expr $(,)?) => {
        if $cond {
            return ::core::result::Result::Err($crate::Bail::requirement(
                $crate::__gt_location!(),
                ::core::concat!("!(", ::core::stringify!($cond), ")"),
                ::core::option::Option::None,
            ));
        }
    };
    ($cond:expr, $($fmt:tt)+) => {
        if $cond {
            return ::core::result::Result::Err($crate::Bail::requirement(
                $crate::__gt_location!(),
                ::core::concat!("!(", ::core::stringify!($cond), ")"),
                ::core::option::Option::Some(::std::format!($($fmt)+)),
            ));
        }
    };
}

/// Skip unconditionally with a formatted message.
#[macro_export]
macro_rules! gt_skip {
    ($($fmt:tt)+) => {
        return ::core::result::Result::Err($crate::Bail::skip(::std::format!($($fmt)+)))
    };
}

/// Fail unconditionally with `code` and an optional formatted message.
///
/// Codes 0 and 77 are rejected as a contract violation.
#[macro_export]
macro_rules! gt_fail {
    ($code:expr $(,)?) => {
        return ::core::result::Result::Err($crate::Bail::fail($code))
    };
    ($code:expr, $($fmt:tt)+) => {
        return ::core::result::Result::Err($crate::Bail::fail_with(
            $code,
            ::std::format!($($fmt)+),
        ))
    };
}

/// Log a warning if `cond` holds and evaluate to `cond`.
///
/// Never changes the outcome of the test.
#[macro_export]
macro_rules! gt_warn_on {
    ($cond:expr $(,)?) => {{
        let triggered: bool = $cond;
        if triggered {
            $crate::__private::tracing::warn!(
                "Warning on condition {} in function {}, file {}:{}",
                ::core::stringify!($cond),
                ::core::module_path!(),
                ::core::file!(),
                ::core::line!()
            );
        }
        triggered
    }};
    ($cond:expr, $($fmt:tt)+) => {{
        let triggered: bool = $cond;
        if triggered {
            $crate::__private::tracing::warn!(
                "Warning on condition {} in function {}, file {}:{}: {}",
                ::core::stringify!($cond),
                ::core::module_path!(),
                ::core::file!(),
                ::core::line!(),
                ::std::format!($($fmt)+)
            );
        }
        triggered
    }};
}

/// Operator that describes the observed relation when `op` did not hold.
#[doc(hidden)]
pub fn negate_op(op: &str) -> &'static str {
    match op {
        "==" => "!=",
        "!=" => "==",
        "<" => ">=",
        "<=" => ">",
        ">" => "<=",
        ">=" => "<",
        _ => "vs",
    }
}

#[cfg(test)]
mod tests {
    use crate::{Bail, EXIT_FAILURE, EXIT_SKIP, TestResult};

    fn checked(value: u32) -> TestResult<u32> {
        gt_assert!(value > 2);
        gt_assert!(value < 100, "value {} out of range", value);
        Ok(value * 2)
    }

    fn fail_report(bail: Bail) -> crate::FailReport {
        match bail {
            Bail::Fail(report) => report,
            Bail::Skip(report) => panic!("expected failure, got skip: {report}"),
        }
    }

    #[test]
    fn test_assert_passes_through() {
        assert_eq!(checked(10), Ok(20));
    }

    #[test]
    fn test_assert_records_condition_and_location() {
        let report = fail_report(checked(1).unwrap_err());
        assert_eq!(report.exit_code, EXIT_FAILURE);
        assert_eq!(report.condition.as_deref(), Some("value > 2"));
        assert!(report.message.is_none());
        let loc = report.location.expect("location");
        assert!(loc.file.ends_with("assert.rs"));
        assert!(loc.module.ends_with("assert::tests"));
    }

    #[test]
    fn test_assert_message() {
        let report = fail_report(checked(500).unwrap_err());
        assert_eq!(report.message.as_deref(), Some("value 500 out of range"));
    }

    #[test]
    fn test_assert_eq_reports_values() {
        fn body() -> TestResult {
            let width = 1920u32;
            gt_assert_eq!(width, 1024);
            Ok(())
        }
        let report = fail_report(body().unwrap_err());
        assert_eq!(report.condition.as_deref(), Some("width == 1024"));
        assert_eq!(report.message.as_deref(), Some("error: 1920 != 1024"));
    }

    #[test]
    fn test_assert_cmp() {
        fn body(a: i64) -> TestResult {
            gt_assert_cmp!(a, <, 5);
            Ok(())
        }
        assert!(body(4).is_ok());
        let report = fail_report(body(9).unwrap_err());
        assert_eq!(report.message.as_deref(), Some("error: 9 >= 5"));
    }

    #[test]
    fn test_assert_neq() {
        fn body(fd: i32) -> TestResult {
            gt_assert_neq!(fd, -1);
            Ok(())
        }
        assert!(body(3).is_ok());
        assert!(body(-1).is_err());
    }

    #[test]
    fn test_require_and_skip_on() {
        fn body(has_device: bool, in_simulation: bool) -> TestResult {
            gt_require!(has_device);
            gt_skip_on!(in_simulation);
            Ok(())
        }
        assert!(body(true, false).is_ok());

        match body(false, false).unwrap_err() {
            Bail::Skip(report) => assert_eq!(report.condition.as_deref(), Some("has_device")),
            other => panic!("unexpected {other:?}"),
        }
        match body(true, true).unwrap_err() {
            Bail::Skip(report) => {
                assert_eq!(report.condition.as_deref(), Some("!(in_simulation)"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_skip_and_fail() {
        fn skipper() -> TestResult {
            gt_skip!("no {} available", "blitter");
        }
        fn failer() -> TestResult {
            gt_fail!(3, "hang detected");
        }
        let skip = skipper().unwrap_err();
        assert_eq!(skip.exit_code(), EXIT_SKIP);
        assert_eq!(skip.to_string(), "no blitter available");

        let fail = failer().unwrap_err();
        assert_eq!(fail.exit_code(), 3);
        assert_eq!(fail.to_string(), "hang detected");
    }

    #[test]
    fn test_fail_on() {
        fn body(errors: u32) -> TestResult {
            gt_fail_on!(errors > 0, "{} errors", errors);
            Ok(())
        }
        assert!(body(0).is_ok());
        assert_eq!(body(2).unwrap_err().exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_warn_on_is_transparent() {
        fn body(stale: bool) -> TestResult<bool> {
            let warned = gt_warn_on!(stale);
            Ok(warned)
        }
        assert_eq!(body(true), Ok(true));
        assert_eq!(body(false), Ok(false));
    }
}
