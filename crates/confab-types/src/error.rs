//! Unified error interface for confab.
//!
//! Every error type in the workspace implements [`ErrorCode`], giving
//! each failure a stable machine-readable code and a recoverability
//! flag. The gateway's retry policy is driven directly by
//! `is_recoverable()`: only recoverable kinds are ever retried.
//!
//! # Code convention
//!
//! Codes are UPPER_SNAKE_CASE with a domain prefix:
//!
//! - `EVENT_*` — event layer
//! - `ENGINE_*` — state machine engine
//! - `CHECKPOINT_*` — checkpoint store
//! - `GATEWAY_*` — tool gateway
//! - `CONFIG_*` — configuration
//!
//! Codes are an API contract; changing one is a breaking change.

/// Stable error codes plus recoverability for every confab error.
///
/// # Recoverability
///
/// An error is **recoverable** when retrying the same operation may
/// succeed without any change on the caller's side (timeouts, rate
/// limits, transient network failures). Validation, authorization, and
/// conflict errors are not recoverable: retrying the identical request
/// cannot change the outcome.
///
/// # Example
///
/// ```
/// use confab_types::ErrorCode;
///
/// #[derive(Debug)]
/// enum LookupError {
///     Unavailable,
///     BadQuery,
/// }
///
/// impl ErrorCode for LookupError {
///     fn code(&self) -> &'static str {
///         match self {
///             Self::Unavailable => "LOOKUP_UNAVAILABLE",
///             Self::BadQuery => "LOOKUP_BAD_QUERY",
///         }
///     }
///
///     fn is_recoverable(&self) -> bool {
///         matches!(self, Self::Unavailable)
///     }
/// }
///
/// let err = LookupError::Unavailable;
/// assert_eq!(err.code(), "LOOKUP_UNAVAILABLE");
/// assert!(err.is_recoverable());
/// ```
pub trait ErrorCode {
    /// Returns the machine-readable error code.
    ///
    /// UPPER_SNAKE_CASE, domain-prefixed, stable across versions.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows confab conventions.
///
/// # Checks
///
/// 1. Code is non-empty
/// 2. Code starts with the expected prefix
/// 3. Code is UPPER_SNAKE_CASE
///
/// # Panics
///
/// Panics with a descriptive message if validation fails. Intended for
/// use in tests.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates every variant of an error enum at once.
///
/// # Example
///
/// ```
/// use confab_types::{ErrorCode, assert_error_codes};
///
/// #[derive(Debug)]
/// enum E { A, B }
///
/// impl ErrorCode for E {
///     fn code(&self) -> &'static str {
///         match self {
///             Self::A => "X_A",
///             Self::B => "X_B",
///         }
///     }
///     fn is_recoverable(&self) -> bool { false }
/// }
///
/// assert_error_codes(&[E::A, E::B], "X_");
/// ```
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks if a string is UPPER_SNAKE_CASE.
fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum ProbeError {
        Flaky,
        Broken,
    }

    impl ErrorCode for ProbeError {
        fn code(&self) -> &'static str {
            match self {
                Self::Flaky => "PROBE_FLAKY",
                Self::Broken => "PROBE_BROKEN",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Flaky)
        }
    }

    #[test]
    fn code_and_recoverability() {
        assert_eq!(ProbeError::Flaky.code(), "PROBE_FLAKY");
        assert!(ProbeError::Flaky.is_recoverable());
        assert!(!ProbeError::Broken.is_recoverable());
    }

    #[test]
    fn assert_helpers_accept_valid_codes() {
        assert_error_codes(&[ProbeError::Flaky, ProbeError::Broken], "PROBE_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn assert_rejects_wrong_prefix() {
        assert_error_code(&ProbeError::Flaky, "OTHER_");
    }

    #[test]
    fn upper_snake_case_rules() {
        assert!(is_upper_snake_case("GATEWAY_TIMEOUT"));
        assert!(is_upper_snake_case("E2"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("gateway_timeout"));
        assert!(!is_upper_snake_case("_LEADING"));
        assert!(!is_upper_snake_case("TRAILING_"));
        assert!(!is_upper_snake_case("DOUBLE__UNDERSCORE"));
    }
}
