//! Gateway error taxonomy.
//!
//! Every way an invocation can fail maps to exactly one variant, and
//! the retry policy is driven entirely by [`ErrorCode::is_recoverable`]:
//! only `Timeout`, `RateLimited`, and `TransientNetwork` are retried by
//! the gateway; everything else is surfaced immediately.
//!
//! | Variant | Code | Retried |
//! |---------|------|---------|
//! | [`UnknownTool`](GatewayError::UnknownTool) | `GATEWAY_UNKNOWN_TOOL` | No |
//! | [`AuthorizationError`](GatewayError::AuthorizationError) | `GATEWAY_AUTHORIZATION_ERROR` | No |
//! | [`ValidationError`](GatewayError::ValidationError) | `GATEWAY_VALIDATION_ERROR` | No |
//! | [`BusinessRuleViolation`](GatewayError::BusinessRuleViolation) | `GATEWAY_BUSINESS_RULE_VIOLATION` | No |
//! | [`RateLimited`](GatewayError::RateLimited) | `GATEWAY_RATE_LIMITED` | Yes |
//! | [`IdempotencyConflict`](GatewayError::IdempotencyConflict) | `GATEWAY_IDEMPOTENCY_CONFLICT` | No |
//! | [`Timeout`](GatewayError::Timeout) | `GATEWAY_TIMEOUT` | Yes |
//! | [`TransientNetwork`](GatewayError::TransientNetwork) | `GATEWAY_TRANSIENT_NETWORK` | Yes |
//! | [`ExecutionError`](GatewayError::ExecutionError) | `GATEWAY_EXECUTION_ERROR` | No |
//! | [`Cancelled`](GatewayError::Cancelled) | `GATEWAY_CANCELLED` | No |
//! | [`Unrecoverable`](GatewayError::Unrecoverable) | `GATEWAY_UNRECOVERABLE` | No |

use confab_types::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tool invocation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum GatewayError {
    /// No tool registered under this name+version.
    #[error("unknown tool: {name}@{version}")]
    UnknownTool {
        /// Requested tool name.
        name: String,
        /// Requested tool version.
        version: String,
    },

    /// The caller's granted permissions are not a superset of the
    /// tool's required permissions. Never retried, never delegated.
    #[error("authorization failed: missing {missing:?}")]
    AuthorizationError {
        /// Names of the permissions the caller lacks.
        missing: Vec<String>,
    },

    /// Parameters failed the tool's declared schema.
    #[error("parameter validation failed: {detail}")]
    ValidationError {
        /// First schema violation, with instance path.
        detail: String,
    },

    /// Parameters are well-formed but violate a tool business rule.
    #[error("business rule violated: {detail}")]
    BusinessRuleViolation {
        /// Rule-specific explanation.
        detail: String,
    },

    /// A token bucket in the hierarchy rejected the call.
    #[error("rate limited at {scope} scope, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Milliseconds until the tightest failing bucket permits the
        /// call.
        retry_after_ms: u64,
        /// Which bucket level rejected: `tool`, `session`, `tenant`,
        /// or `global`.
        scope: String,
    },

    /// The idempotency key was seen before with different parameters.
    ///
    /// This detects a caller bug or a replay attack. The stored result
    /// is never overwritten and no execution occurs.
    #[error("idempotency conflict for key '{key}'")]
    IdempotencyConflict {
        /// The conflicting key.
        key: String,
    },

    /// Execution exceeded the tool's deadline. Retried with backoff.
    #[error("tool execution timed out after {after_ms}ms")]
    Timeout {
        /// The deadline that expired, in milliseconds.
        after_ms: u64,
    },

    /// The tool reported a transient infrastructure failure.
    #[error("transient network failure: {detail}")]
    TransientNetwork {
        /// Handler-supplied description.
        detail: String,
    },

    /// The tool failed, or returned output that failed its declared
    /// result schema. Malformed output is converted here, never
    /// forwarded.
    #[error("tool execution failed: {detail}")]
    ExecutionError {
        /// Handler- or validator-supplied description.
        detail: String,
    },

    /// The invocation was cancelled (barge-in or session end) and the
    /// handler completed its cleanup. Never silent.
    #[error("invocation cancelled")]
    Cancelled,

    /// A compensation failed; manual operator intervention required.
    #[error("unrecoverable: {detail}")]
    Unrecoverable {
        /// What was left in an inconsistent state.
        detail: String,
    },
}

impl GatewayError {
    /// Returns `true` when the engine may re-request this invocation
    /// with corrected parameters.
    ///
    /// The gateway sets `terminal = !self.correctable()` on the
    /// `tool_failed` event it emits.
    #[must_use]
    pub fn correctable(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. } | Self::BusinessRuleViolation { .. }
        )
    }
}

impl ErrorCode for GatewayError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "GATEWAY_UNKNOWN_TOOL",
            Self::AuthorizationError { .. } => "GATEWAY_AUTHORIZATION_ERROR",
            Self::ValidationError { .. } => "GATEWAY_VALIDATION_ERROR",
            Self::BusinessRuleViolation { .. } => "GATEWAY_BUSINESS_RULE_VIOLATION",
            Self::RateLimited { .. } => "GATEWAY_RATE_LIMITED",
            Self::IdempotencyConflict { .. } => "GATEWAY_IDEMPOTENCY_CONFLICT",
            Self::Timeout { .. } => "GATEWAY_TIMEOUT",
            Self::TransientNetwork { .. } => "GATEWAY_TRANSIENT_NETWORK",
            Self::ExecutionError { .. } => "GATEWAY_EXECUTION_ERROR",
            Self::Cancelled => "GATEWAY_CANCELLED",
            Self::Unrecoverable { .. } => "GATEWAY_UNRECOVERABLE",
        }
    }

    /// Recoverable exactly when the gateway's retry policy applies.
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::TransientNetwork { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_types::assert_error_codes;

    fn all_variants() -> Vec<GatewayError> {
        vec![
            GatewayError::UnknownTool {
                name: "x".into(),
                version: "1".into(),
            },
            GatewayError::AuthorizationError {
                missing: vec!["PAYMENT".into()],
            },
            GatewayError::ValidationError { detail: "x".into() },
            GatewayError::BusinessRuleViolation { detail: "x".into() },
            GatewayError::RateLimited {
                retry_after_ms: 100,
                scope: "tenant".into(),
            },
            GatewayError::IdempotencyConflict { key: "k".into() },
            GatewayError::Timeout { after_ms: 5000 },
            GatewayError::TransientNetwork { detail: "x".into() },
            GatewayError::ExecutionError { detail: "x".into() },
            GatewayError::Cancelled,
            GatewayError::Unrecoverable { detail: "x".into() },
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "GATEWAY_");
    }

    #[test]
    fn only_retry_policy_kinds_are_recoverable() {
        for err in all_variants() {
            let expected = matches!(
                err,
                GatewayError::Timeout { .. }
                    | GatewayError::RateLimited { .. }
                    | GatewayError::TransientNetwork { .. }
            );
            assert_eq!(err.is_recoverable(), expected, "{}", err.code());
        }
    }

    #[test]
    fn correctable_kinds() {
        assert!(GatewayError::ValidationError { detail: "x".into() }.correctable());
        assert!(GatewayError::BusinessRuleViolation { detail: "x".into() }.correctable());
        assert!(!GatewayError::Timeout { after_ms: 1 }.correctable());
        assert!(!GatewayError::Cancelled.correctable());
    }
}
