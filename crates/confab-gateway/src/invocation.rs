//! Tool invocation records.
//!
//! A [`ToolInvocation`] is the gateway's unit of work: one logical
//! external action, identified by a stable idempotency key. Retries —
//! gateway-internal backoff retries as well as crash-recovery replays —
//! reuse the same invocation verbatim; nothing about it is regenerated.

use confab_event::ToolCall;
use confab_types::{InvocationId, Permission, SessionId, TenantId, TraceId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Computes the canonical hash of a parameter object.
///
/// `serde_json` serializes object keys in sorted order (its map is a
/// BTreeMap), so equal parameter sets hash equally regardless of the
/// order the caller built them in.
#[must_use]
pub fn parameters_hash(parameters: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(parameters).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    format!("{digest:x}")
}

/// One logical external action, ready for the gateway pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Invocation identity, stable across retries.
    pub invocation_id: InvocationId,
    /// Stable key for at-most-once execution. Assigned when the
    /// logical action is first requested; never regenerated on retry.
    pub idempotency_key: String,
    /// Registered tool name.
    pub tool_name: String,
    /// Registered tool version.
    pub version: String,
    /// JSON parameters.
    pub parameters: serde_json::Value,
    /// Canonical SHA-256 of `parameters`.
    pub parameters_hash: String,
    /// Session on whose behalf the tool runs.
    pub session_id: SessionId,
    /// Tenant owning the session.
    pub tenant_id: TenantId,
    /// Trace for observability records.
    pub trace_id: TraceId,
    /// Permissions granted to the caller, checked against the tool's
    /// required set.
    pub granted: Permission,
}

impl ToolInvocation {
    /// Builds an invocation from a requested [`ToolCall`] plus session
    /// identity.
    ///
    /// The parameter hash is computed here, once; the idempotency key
    /// is taken from the call unchanged.
    #[must_use]
    pub fn from_call(
        call: ToolCall,
        session_id: SessionId,
        tenant_id: TenantId,
        trace_id: TraceId,
        granted: Permission,
    ) -> Self {
        let parameters_hash = parameters_hash(&call.parameters);
        Self {
            invocation_id: call.invocation_id,
            idempotency_key: call.idempotency_key,
            tool_name: call.tool_name,
            version: call.version,
            parameters: call.parameters,
            parameters_hash,
            session_id,
            tenant_id,
            trace_id,
            granted,
        }
    }
}

/// Successful pipeline outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The invocation that produced this outcome.
    pub invocation_id: InvocationId,
    /// Schema-validated result value.
    pub result: serde_json::Value,
    /// `true` when the result was replayed from the idempotency table
    /// without executing the tool.
    pub replayed: bool,
    /// Number of execution attempts (0 when replayed).
    pub attempts: u32,
}
