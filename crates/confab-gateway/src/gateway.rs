//! The invocation pipeline.
//!
//! [`Gateway::invoke`] runs every check the spec of a tool declares,
//! strictly in order, short-circuiting on the first failure:
//!
//! ```text
//! 1. existence        registry lookup
//! 2. authorization    granted ⊇ required (pure superset check)
//! 3. schema           parameters vs declared JSON Schema
//! 4. business rule    tool-specific predicate
//! 5. rate limit       tool → session → tenant → global buckets
//! 6. idempotency      replay stored result / reject conflicting hash
//! 7. execution        deadline + cooperative cancellation
//! 8. result schema    malformed output becomes an error
//! ```
//!
//! Stages 5–7 sit inside the retry loop: only recoverable errors
//! (timeout, rate-limited, transient network) are retried, with
//! exponential backoff and jitter, up to the configured attempt cap.
//! Validation and authorization failures are never retried.

use crate::{
    BeginOutcome, CancelHandle, CancelToken, GatewayError, HierarchicalLimiter, IdempotencyTable,
    RateLimitSettings, RegisteredTool, RetryPolicy, TimeoutClass, ToolError, ToolInvocation,
    ToolOutcome, ToolRegistry,
};
use confab_event::observe::{InvocationRecord, NullSink, ObservabilitySink, ObservationRecord};
use confab_types::ErrorCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Gateway tuning knobs.
///
/// Everything here is externally configurable; nothing is hardcoded at
/// call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Retry/backoff parameters.
    pub retry: RetryPolicy,
    /// Token-bucket quotas per level.
    pub rate_limits: RateLimitSettings,
    /// Idempotency record retention, in days.
    pub idempotency_retention_days: u32,
    /// How long to wait for a cancelled handler's cleanup before
    /// abandoning it, in milliseconds.
    pub cleanup_grace_ms: u64,
    /// Config-level deadline override for `DataFetch` tools, in ms.
    pub timeout_data_fetch_ms: Option<u64>,
    /// Config-level deadline override for `Computation` tools, in ms.
    pub timeout_computation_ms: Option<u64>,
    /// Config-level deadline override for `Action` tools, in ms.
    pub timeout_action_ms: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            rate_limits: RateLimitSettings::default(),
            idempotency_retention_days: 30,
            cleanup_grace_ms: 2_000,
            timeout_data_fetch_ms: None,
            timeout_computation_ms: None,
            timeout_action_ms: None,
        }
    }
}

impl GatewayConfig {
    /// Retention window in milliseconds.
    #[must_use]
    pub fn retention_ms(&self) -> u64 {
        u64::from(self.idempotency_retention_days) * 24 * 60 * 60 * 1000
    }

    fn class_override(&self, class: TimeoutClass) -> Option<u64> {
        match class {
            TimeoutClass::DataFetch => self.timeout_data_fetch_ms,
            TimeoutClass::Computation => self.timeout_computation_ms,
            TimeoutClass::Action => self.timeout_action_ms,
        }
    }
}

/// The validating, idempotent tool gateway.
///
/// One gateway serves every session; per-session isolation lives in
/// the engine, and the gateway's shared state (buckets, idempotency
/// table, registry) is safe for concurrent use.
pub struct Gateway {
    registry: Arc<ToolRegistry>,
    limiter: HierarchicalLimiter,
    idempotency: Arc<IdempotencyTable>,
    config: GatewayConfig,
    sink: Arc<dyn ObservabilitySink>,
}

impl Gateway {
    /// Creates a gateway over a registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: GatewayConfig) -> Self {
        Self {
            limiter: HierarchicalLimiter::new(&config.rate_limits),
            registry,
            idempotency: Arc::new(IdempotencyTable::new()),
            config,
            sink: Arc::new(NullSink),
        }
    }

    /// Attaches an observability sink (builder pattern).
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the idempotency table (shared with recovery tooling).
    #[must_use]
    pub fn idempotency(&self) -> &Arc<IdempotencyTable> {
        &self.idempotency
    }

    /// Returns the effective deadline for a registered tool.
    ///
    /// Precedence: per-tool override, then config class override, then
    /// the class default.
    #[must_use]
    pub fn deadline_for(&self, tool: &RegisteredTool) -> Duration {
        if let Some(over) = tool.spec.timeout_override {
            return over;
        }
        if let Some(ms) = self.config.class_override(tool.spec.timeout_class) {
            return Duration::from_millis(ms);
        }
        tool.spec.timeout_class.default_deadline()
    }

    /// Sweeps idempotency records past the retention window.
    pub fn purge_expired_idempotency(&self) -> usize {
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        self.idempotency.purge_expired(now_ms, self.config.retention_ms())
    }

    /// Runs the full pipeline for one invocation.
    ///
    /// # Errors
    ///
    /// A [`GatewayError`] from the first failing stage; recoverable
    /// kinds have already been retried up to the configured cap.
    pub async fn invoke(
        &self,
        invocation: &ToolInvocation,
        cancel: CancelToken,
    ) -> Result<ToolOutcome, GatewayError> {
        // 1. Existence
        let tool = self
            .registry
            .get(&invocation.tool_name, &invocation.version)
            .ok_or_else(|| GatewayError::UnknownTool {
                name: invocation.tool_name.clone(),
                version: invocation.version.clone(),
            })?;

        // 2. Authorization — pure superset check, never delegated.
        if !invocation.granted.grants(tool.spec.required_permissions) {
            let missing = tool
                .spec
                .required_permissions
                .difference(invocation.granted)
                .names()
                .into_iter()
                .map(String::from)
                .collect();
            return Err(GatewayError::AuthorizationError { missing });
        }

        // 3. Schema validation
        tool.validate_parameters(&invocation.parameters)
            .map_err(|detail| GatewayError::ValidationError { detail })?;

        // 4. Business rules
        if let Some(rule) = &tool.spec.business_rule {
            rule(&invocation.parameters)
                .map_err(|detail| GatewayError::BusinessRuleViolation { detail })?;
        }

        // Tools that must survive interruption ignore the caller's
        // token entirely.
        let cancel = if tool.spec.cancel_on_interruption {
            cancel
        } else {
            CancelToken::never()
        };

        let deadline = self.deadline_for(&tool);
        let mut attempt: u32 = 0;
        let mut claimed = false;

        loop {
            // 5. Rate limit — tightest bucket wins.
            if let Err(exceeded) = self.limiter.check(
                &invocation.tool_name,
                invocation.session_id,
                invocation.tenant_id,
            ) {
                let err = GatewayError::RateLimited {
                    retry_after_ms: exceeded.retry_after.as_millis() as u64,
                    scope: exceeded.scope.to_string(),
                };
                attempt += 1;
                self.record_attempt(invocation, attempt, err.code(), 0);
                if err.is_recoverable() && self.config.retry.allows_retry(attempt) {
                    let wait = exceeded
                        .retry_after
                        .max(self.config.retry.delay_before(attempt));
                    if self.backoff(wait, cancel.clone()).await.is_err() {
                        self.release_claim(invocation, claimed);
                        return Err(GatewayError::Cancelled);
                    }
                    continue;
                }
                self.release_claim(invocation, claimed);
                return Err(err);
            }

            // 6. Idempotency — claim once; retries keep the claim.
            if !claimed {
                let now_ms = chrono::Utc::now().timestamp_millis() as u64;
                match self.idempotency.begin(
                    &invocation.idempotency_key,
                    &invocation.parameters_hash,
                    now_ms,
                ) {
                    BeginOutcome::Fresh => claimed = true,
                    BeginOutcome::Replay(result) => {
                        debug!(
                            key = %invocation.idempotency_key,
                            "returning stored result without re-execution"
                        );
                        self.record_attempt(invocation, 0, "REPLAYED", 0);
                        return Ok(ToolOutcome {
                            invocation_id: invocation.invocation_id,
                            result,
                            replayed: true,
                            attempts: 0,
                        });
                    }
                    BeginOutcome::Conflict => {
                        return Err(GatewayError::IdempotencyConflict {
                            key: invocation.idempotency_key.clone(),
                        });
                    }
                }
            }

            // 7. Execution
            attempt += 1;
            let started = Instant::now();
            let result = self
                .execute_attempt(&tool, invocation, cancel.clone(), deadline)
                .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    // 8. Result validation — malformed output is an
                    // error, never forwarded.
                    if let Err(detail) = tool.validate_result(&value) {
                        warn!(tool = %invocation.tool_name, %detail, "result schema violation");
                        let err = GatewayError::ExecutionError {
                            detail: format!("result schema violation: {detail}"),
                        };
                        self.record_attempt(invocation, attempt, err.code(), latency_ms);
                        self.idempotency.fail(&invocation.idempotency_key);
                        return Err(err);
                    }

                    self.record_attempt(invocation, attempt, "OK", latency_ms);
                    self.idempotency
                        .complete(&invocation.idempotency_key, value.clone());
                    info!(
                        tool = %invocation.tool_name,
                        attempt,
                        latency_ms,
                        "tool invocation succeeded"
                    );
                    return Ok(ToolOutcome {
                        invocation_id: invocation.invocation_id,
                        result: value,
                        replayed: false,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    self.record_attempt(invocation, attempt, err.code(), latency_ms);
                    if err.is_recoverable() && self.config.retry.allows_retry(attempt) {
                        let wait = self.config.retry.delay_before(attempt);
                        debug!(
                            tool = %invocation.tool_name,
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            code = err.code(),
                            "retrying after backoff"
                        );
                        if self.backoff(wait, cancel.clone()).await.is_err() {
                            self.release_claim(invocation, claimed);
                            return Err(GatewayError::Cancelled);
                        }
                        continue;
                    }
                    self.release_claim(invocation, claimed);
                    return Err(err);
                }
            }
        }
    }

    /// One execution attempt under deadline and cancellation.
    ///
    /// Cancellation is cooperative: on deadline expiry or caller
    /// cancellation the attempt token is signalled, and the handler is
    /// given `cleanup_grace_ms` to release resources and return before
    /// it is abandoned.
    async fn execute_attempt(
        &self,
        tool: &RegisteredTool,
        invocation: &ToolInvocation,
        mut cancel: CancelToken,
        deadline: Duration,
    ) -> Result<serde_json::Value, GatewayError> {
        let (attempt_handle, attempt_token) = CancelHandle::new();
        let fut = tool
            .handler
            .execute(invocation.parameters.clone(), attempt_token);
        tokio::pin!(fut);

        let expiry = tokio::time::sleep(deadline);
        tokio::pin!(expiry);

        let mut interrupted: Option<GatewayError> = None;
        let outcome = tokio::select! {
            res = &mut fut => Some(res),
            _ = cancel.cancelled() => {
                attempt_handle.cancel();
                interrupted = Some(GatewayError::Cancelled);
                None
            }
            () = &mut expiry => {
                attempt_handle.cancel();
                interrupted = Some(GatewayError::Timeout {
                    after_ms: deadline.as_millis() as u64,
                });
                None
            }
        };

        let outcome = match outcome {
            Some(res) => res,
            None => {
                // Grace period for cooperative cleanup.
                let grace = Duration::from_millis(self.config.cleanup_grace_ms);
                match tokio::time::timeout(grace, &mut fut).await {
                    Ok(res) => res,
                    Err(_) => {
                        warn!(
                            tool = %invocation.tool_name,
                            "handler ignored cancellation; abandoning attempt"
                        );
                        return Err(interrupted.unwrap_or(GatewayError::Cancelled));
                    }
                }
            }
        };

        match (interrupted, outcome) {
            (None, Ok(value)) => Ok(value),
            // The deadline fired but the handler finished during the
            // grace window; the work happened, so keep the result.
            (Some(GatewayError::Timeout { .. }), Ok(value)) => {
                debug!(tool = %invocation.tool_name, "handler completed during grace window");
                Ok(value)
            }
            // An interrupted turn discards even a completed result;
            // the cancellation is surfaced, never swallowed.
            (Some(err), Ok(_)) => Err(err),
            (interrupted, Err(tool_err)) => Err(match tool_err {
                ToolError::Cancelled => interrupted.unwrap_or(GatewayError::Cancelled),
                ToolError::Transient(detail) => interrupted
                    .unwrap_or(GatewayError::TransientNetwork { detail }),
                ToolError::Failed(detail) => {
                    interrupted.unwrap_or(GatewayError::ExecutionError { detail })
                }
            }),
        }
    }

    /// Sleeps for a backoff interval, aborting early on cancellation.
    async fn backoff(&self, wait: Duration, mut cancel: CancelToken) -> Result<(), ()> {
        tokio::select! {
            () = tokio::time::sleep(wait) => Ok(()),
            _ = cancel.cancelled() => Err(()),
        }
    }

    /// Marks the idempotency claim failed when a claimed invocation
    /// exits without completing.
    fn release_claim(&self, invocation: &ToolInvocation, claimed: bool) {
        if claimed {
            self.idempotency.fail(&invocation.idempotency_key);
        }
    }

    fn record_attempt(
        &self,
        invocation: &ToolInvocation,
        attempt: u32,
        outcome_code: &str,
        latency_ms: u64,
    ) {
        self.sink
            .record(ObservationRecord::Invocation(InvocationRecord {
                trace_id: invocation.trace_id,
                session_id: invocation.session_id,
                invocation_id: invocation.invocation_id,
                tool_name: invocation.tool_name.clone(),
                version: invocation.version.clone(),
                attempt,
                outcome_code: outcome_code.to_string(),
                latency_ms,
            }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parameters_hash, QuotaSettings, ToolHandler, ToolSpec};
    use confab_event::observe::ChannelSink;
    use confab_types::{InvocationId, Permission, SessionId, TenantId, TraceId};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoTool;

    #[async_trait::async_trait]
    impl ToolHandler for EchoTool {
        async fn execute(&self, params: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
            Ok(json!({ "echoed": params }))
        }
    }

    /// Fails with a transient error until `succeed_after` calls, then
    /// succeeds. Counts side effects.
    struct FlakyTool {
        calls: AtomicU32,
        succeed_after: u32,
    }

    #[async_trait::async_trait]
    impl ToolHandler for FlakyTool {
        async fn execute(&self, _params: Value, _cancel: CancelToken) -> Result<Value, ToolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.succeed_after {
                Err(ToolError::transient("connection reset"))
            } else {
                Ok(json!({ "call": call }))
            }
        }
    }

    /// Blocks until cancelled, then reports cooperative cleanup.
    struct HangingTool;

    #[async_trait::async_trait]
    impl ToolHandler for HangingTool {
        async fn execute(&self, _params: Value, mut cancel: CancelToken) -> Result<Value, ToolError> {
            cancel.cancelled().await;
            Err(ToolError::Cancelled)
        }
    }

    fn invocation_for(tool: &str, params: Value, granted: Permission) -> ToolInvocation {
        let hash = parameters_hash(&params);
        ToolInvocation {
            invocation_id: InvocationId::new(),
            idempotency_key: format!("key-{}", InvocationId::new()),
            tool_name: tool.into(),
            version: "1".into(),
            parameters: params,
            parameters_hash: hash,
            session_id: SessionId::new(),
            tenant_id: TenantId::new(),
            trace_id: TraceId::new(),
            granted,
        }
    }

    fn fast_retry_config() -> GatewayConfig {
        GatewayConfig {
            retry: RetryPolicy {
                base_ms: 10,
                multiplier: 1.0,
                max_delay_ms: 20,
                jitter_ms: 0,
                max_attempts: 3,
            },
            ..GatewayConfig::default()
        }
    }

    fn gateway_with(specs: Vec<(ToolSpec, Box<dyn ToolHandler>)>) -> Gateway {
        let registry = Arc::new(ToolRegistry::new());
        for (spec, handler) in specs {
            struct Boxed(Box<dyn ToolHandler>);
            #[async_trait::async_trait]
            impl ToolHandler for Boxed {
                async fn execute(
                    &self,
                    params: Value,
                    cancel: CancelToken,
                ) -> Result<Value, ToolError> {
                    self.0.execute(params, cancel).await
                }
            }
            registry.register(spec, Boxed(handler)).unwrap();
        }
        Gateway::new(registry, fast_retry_config())
    }

    fn echo_gateway() -> Gateway {
        gateway_with(vec![(
            ToolSpec::new("echo", "1")
                .parameters_schema(json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }))
                .required_permissions(Permission::DATA_READ),
            Box::new(EchoTool),
        )])
    }

    #[tokio::test]
    async fn happy_path() {
        let gateway = echo_gateway();
        let invocation =
            invocation_for("echo", json!({"message": "hi"}), Permission::DATA_READ);

        let outcome = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result["echoed"]["message"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_rejected() {
        let gateway = echo_gateway();
        let invocation = invocation_for("missing", json!({}), Permission::ALL);

        let err = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn authorization_never_delegated() {
        let gateway = echo_gateway();
        let invocation =
            invocation_for("echo", json!({"message": "hi"}), Permission::PAYMENT);

        let err = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap_err();
        match err {
            GatewayError::AuthorizationError { missing } => {
                assert_eq!(missing, vec!["DATA_READ".to_string()]);
            }
            other => panic!("expected authorization error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn schema_violation_rejected_before_execution() {
        let gateway = echo_gateway();
        let invocation = invocation_for("echo", json!({"message": 42}), Permission::DATA_READ);

        let err = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn business_rule_rejection() {
        let gateway = gateway_with(vec![(
            ToolSpec::new("charge", "1")
                .parameters_schema(json!({
                    "type": "object",
                    "properties": { "amount": { "type": "number" } },
                    "required": ["amount"]
                }))
                .business_rule(|params| {
                    if params["amount"].as_f64().unwrap_or(0.0) <= 500.0 {
                        Ok(())
                    } else {
                        Err("amount exceeds credit limit".into())
                    }
                }),
            Box::new(EchoTool),
        )]);

        let ok = invocation_for("charge", json!({"amount": 100}), Permission::empty());
        assert!(gateway.invoke(&ok, CancelToken::never()).await.is_ok());

        let too_big = invocation_for("charge", json!({"amount": 900}), Permission::empty());
        let err = gateway
            .invoke(&too_big, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BusinessRuleViolation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retried_then_succeeds() {
        let gateway = gateway_with(vec![(
            ToolSpec::new("flaky", "1"),
            Box::new(FlakyTool {
                calls: AtomicU32::new(0),
                succeed_after: 1,
            }),
        )]);
        let invocation = invocation_for("flaky", json!({}), Permission::empty());

        let outcome = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert!(!outcome.replayed);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhausted_surface_terminal_error() {
        let gateway = gateway_with(vec![(
            ToolSpec::new("flaky", "1"),
            Box::new(FlakyTool {
                calls: AtomicU32::new(0),
                succeed_after: 99,
            }),
        )]);
        let invocation = invocation_for("flaky", json!({}), Permission::empty());

        let err = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TransientNetwork { .. }));
    }

    #[tokio::test]
    async fn idempotent_replay_skips_execution() {
        let counter = Arc::new(AtomicU32::new(0));
        struct CountingTool(Arc<AtomicU32>);

        #[async_trait::async_trait]
        impl ToolHandler for CountingTool {
            async fn execute(&self, _p: Value, _c: CancelToken) -> Result<Value, ToolError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"ok": true}))
            }
        }

        let gateway = gateway_with(vec![(
            ToolSpec::new("book", "1"),
            Box::new(CountingTool(Arc::clone(&counter))),
        )]);

        let mut invocation = invocation_for("book", json!({"seat": "12A"}), Permission::empty());
        invocation.idempotency_key = "stable-key".into();

        let first = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap();
        let second = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(second.result, first.result);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "exactly one side effect");
    }

    #[tokio::test]
    async fn idempotency_conflict_blocks_execution() {
        let counter = Arc::new(AtomicU32::new(0));
        struct CountingTool(Arc<AtomicU32>);

        #[async_trait::async_trait]
        impl ToolHandler for CountingTool {
            async fn execute(&self, _p: Value, _c: CancelToken) -> Result<Value, ToolError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"ok": true}))
            }
        }

        let gateway = gateway_with(vec![(
            ToolSpec::new("book", "1"),
            Box::new(CountingTool(Arc::clone(&counter))),
        )]);

        let mut first = invocation_for("book", json!({"seat": "12A"}), Permission::empty());
        first.idempotency_key = "conflict-key".into();
        gateway
            .invoke(&first, CancelToken::never())
            .await
            .unwrap();

        let mut second = invocation_for("book", json!({"seat": "14C"}), Permission::empty());
        second.idempotency_key = "conflict-key".into();
        let err = gateway
            .invoke(&second, CancelToken::never())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::IdempotencyConflict { .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "no second execution");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_cooperatively_and_retries() {
        // First attempt hangs until cancelled; the tool never succeeds,
        // so retries exhaust with a timeout.
        let gateway = gateway_with(vec![(
            ToolSpec::new("slow", "1").timeout_override(Duration::from_millis(100)),
            Box::new(HangingTool),
        )]);
        let invocation = invocation_for("slow", json!({}), Permission::empty());

        let err = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_surfaces_cancelled() {
        let gateway = gateway_with(vec![(ToolSpec::new("slow", "1"), Box::new(HangingTool))]);
        let invocation = invocation_for("slow", json!({}), Permission::empty());

        let (handle, token) = CancelHandle::new();
        let gateway = Arc::new(gateway);
        let task = {
            let gateway = Arc::clone(&gateway);
            let invocation = invocation.clone();
            tokio::spawn(async move { gateway.invoke(&invocation, token).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
    }

    #[tokio::test]
    async fn non_cancellable_tool_ignores_caller_token() {
        let gateway = gateway_with(vec![(
            ToolSpec::new("commit", "1").cancel_on_interruption(false),
            Box::new(EchoTool),
        )]);
        let invocation = invocation_for("commit", json!({}), Permission::empty());

        let (handle, token) = CancelHandle::new();
        handle.cancel(); // already cancelled before the call

        let outcome = gateway.invoke(&invocation, token).await.unwrap();
        assert!(!outcome.replayed);
    }

    #[tokio::test]
    async fn malformed_result_becomes_error() {
        struct BadTool;

        #[async_trait::async_trait]
        impl ToolHandler for BadTool {
            async fn execute(&self, _p: Value, _c: CancelToken) -> Result<Value, ToolError> {
                Ok(json!({"status": 12345}))
            }
        }

        let gateway = gateway_with(vec![(
            ToolSpec::new("strict", "1").result_schema(json!({
                "type": "object",
                "properties": { "status": { "type": "string" } },
                "required": ["status"]
            })),
            Box::new(BadTool),
        )]);
        let invocation = invocation_for("strict", json!({}), Permission::empty());

        let err = gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap_err();
        match err {
            GatewayError::ExecutionError { detail } => {
                assert!(detail.contains("result schema"), "got: {detail}");
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_rejection_carries_retry_after() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(ToolSpec::new("echo", "1"), EchoTool).unwrap();

        let config = GatewayConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
            rate_limits: RateLimitSettings {
                per_tool: Some(QuotaSettings::new(60, 1)),
                per_session: None,
                per_tenant: None,
                global: None,
            },
            ..GatewayConfig::default()
        };
        let gateway = Gateway::new(registry, config);

        let first = invocation_for("echo", json!({}), Permission::empty());
        gateway
            .invoke(&first, CancelToken::never())
            .await
            .unwrap();

        let second = invocation_for("echo", json!({}), Permission::empty());
        let err = gateway
            .invoke(&second, CancelToken::never())
            .await
            .unwrap_err();
        match err {
            GatewayError::RateLimited {
                retry_after_ms,
                scope,
            } => {
                assert_eq!(scope, "tool");
                assert!(retry_after_ms > 0);
            }
            other => panic!("expected rate limited, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_emits_latency_record_per_attempt() {
        let (sink, mut rx) = ChannelSink::new();
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(
                ToolSpec::new("flaky", "1"),
                FlakyTool {
                    calls: AtomicU32::new(0),
                    succeed_after: 1,
                },
            )
            .unwrap();
        let gateway = Gateway::new(registry, fast_retry_config()).with_sink(Arc::new(sink));

        let invocation = invocation_for("flaky", json!({}), Permission::empty());
        gateway
            .invoke(&invocation, CancelToken::never())
            .await
            .unwrap();

        let mut codes = Vec::new();
        while let Ok(record) = rx.try_recv() {
            if let ObservationRecord::Invocation(i) = record {
                codes.push((i.attempt, i.outcome_code));
            }
        }
        assert_eq!(
            codes,
            vec![
                (1, "GATEWAY_TRANSIENT_NETWORK".to_string()),
                (2, "OK".to_string())
            ]
        );
    }
}
