//! Session context.
//!
//! The context is the engine's working memory: conversation history,
//! the in-flight assistant utterance, pending tool invocations, and
//! retry counters. It is owned exclusively by the engine's consumer
//! task; every other component sees read-only views or proposes
//! changes through queued events.
//!
//! # Delivered-content invariant
//!
//! History records only content that was actually played to the user.
//! An assistant utterance lives in [`PendingAssistant`] until playback
//! finishes (committed whole) or is barged in (committed as the
//! delivered prefix, computed from the word timing track).
//!
//! # Determinism
//!
//! Context mutation is a pure function of `(context, event)`: no wall
//! clock, no randomness. Turn ids derive from the session id and a
//! monotonic counter (UUID v5), so replaying the same events from the
//! same checkpoint reproduces the context bit-for-bit.

use confab_event::{ToolCall, WordTiming};
use confab_types::{Permission, SessionId, TenantId, TurnId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human caller.
    User,
    /// The system's voice.
    Assistant,
}

/// One committed turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Deterministic turn identity.
    pub turn_id: TurnId,
    /// Speaker.
    pub role: Role,
    /// Delivered content only.
    pub content: String,
    /// Timestamp of the committing event (unix ms).
    pub completed_at_ms: u64,
}

/// The assistant utterance currently being synthesized or played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PendingAssistant {
    /// Text the LLM intended to say.
    pub intended_text: String,
    /// Text actually synthesized (set at playback start).
    pub synthesized_text: Option<String>,
    /// Word timing track from the TTS collaborator.
    pub words: Vec<WordTiming>,
}

/// Mutable session state carried across transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Owning session.
    pub session_id: SessionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Permissions granted to this session's tool calls.
    pub granted: Permission,
    /// Committed conversation history (delivered content only).
    pub history: Vec<Turn>,
    /// In-flight assistant utterance, if any.
    pub pending_assistant: Option<PendingAssistant>,
    /// Tool invocations requested but not yet settled.
    pub pending_invocations: Vec<ToolCall>,
    /// Named retry counters for bounded retry loops.
    pub retry_counters: HashMap<String, u32>,
    /// Monotonic counter behind deterministic turn ids.
    pub turn_counter: u64,
    /// Monotonic counter behind deterministic idempotency keys.
    pub invocation_counter: u64,
}

impl Context {
    /// Creates an empty context for a session.
    #[must_use]
    pub fn new(session_id: SessionId, tenant_id: TenantId, granted: Permission) -> Self {
        Self {
            session_id,
            tenant_id,
            granted,
            history: Vec::new(),
            pending_assistant: None,
            pending_invocations: Vec::new(),
            retry_counters: HashMap::new(),
            turn_counter: 0,
            invocation_counter: 0,
        }
    }

    /// Mints the next deterministic turn id.
    ///
    /// UUID v5 over `(session_id, turn_counter)`, so replays mint the
    /// same ids.
    pub fn next_turn_id(&mut self) -> TurnId {
        let id = TurnId(Uuid::new_v5(
            &self.session_id.uuid(),
            format!("turn-{}", self.turn_counter).as_bytes(),
        ));
        self.turn_counter += 1;
        id
    }

    /// Mints the next deterministic idempotency key for a chart-driven
    /// tool request.
    pub fn next_idempotency_key(&mut self, prefix: &str) -> String {
        let key = format!(
            "{}:{}:{}",
            self.session_id.uuid(),
            prefix,
            self.invocation_counter
        );
        self.invocation_counter += 1;
        key
    }

    /// Commits a turn to history.
    pub fn push_turn(&mut self, role: Role, content: impl Into<String>, at_ms: u64) {
        let turn_id = self.next_turn_id();
        self.history.push(Turn {
            turn_id,
            role,
            content: content.into(),
            completed_at_ms: at_ms,
        });
    }

    /// Reads a retry counter (0 when never incremented).
    #[must_use]
    pub fn retries(&self, counter: &str) -> u32 {
        self.retry_counters.get(counter).copied().unwrap_or(0)
    }

    /// Removes a settled invocation from the pending list.
    ///
    /// Unknown ids are ignored (late duplicate callbacks).
    pub fn settle_invocation(&mut self, invocation_id: confab_types::InvocationId) {
        self.pending_invocations
            .retain(|call| call.invocation_id != invocation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context::new(
            SessionId::from_name("ctx-test"),
            TenantId::from_name("acme"),
            Permission::ALL,
        )
    }

    #[test]
    fn turn_ids_are_deterministic() {
        let mut a = context();
        let mut b = context();

        let a1 = a.next_turn_id();
        assert_eq!(a1, b.next_turn_id());

        // Counter advances, ids differ across positions.
        let a2 = a.next_turn_id();
        assert_eq!(a2, b.next_turn_id());
        assert_ne!(a1, a2);
    }

    #[test]
    fn idempotency_keys_are_deterministic_and_distinct() {
        let mut a = context();
        let mut b = context();

        let k1 = a.next_idempotency_key("charge");
        assert_eq!(k1, b.next_idempotency_key("charge"));

        let k2 = a.next_idempotency_key("charge");
        assert_ne!(k1, k2);
    }

    #[test]
    fn push_turn_records_delivered_content() {
        let mut ctx = context();
        ctx.push_turn(Role::User, "book a flight", 1_000);
        ctx.push_turn(Role::Assistant, "which destination?", 2_000);

        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history[0].role, Role::User);
        assert_eq!(ctx.history[1].content, "which destination?");
        assert_eq!(ctx.turn_counter, 2);
    }

    #[test]
    fn settle_removes_matching_invocation() {
        use confab_types::InvocationId;

        let mut ctx = context();
        let id = InvocationId::new();
        ctx.pending_invocations.push(ToolCall {
            invocation_id: id,
            idempotency_key: "k".into(),
            tool_name: "t".into(),
            version: "1".into(),
            parameters: serde_json::json!({}),
        });

        ctx.settle_invocation(InvocationId::new()); // unknown: ignored
        assert_eq!(ctx.pending_invocations.len(), 1);

        ctx.settle_invocation(id);
        assert!(ctx.pending_invocations.is_empty());
    }

    #[test]
    fn context_round_trips_serde() {
        let mut ctx = context();
        ctx.push_turn(Role::User, "hello", 1);
        ctx.retry_counters.insert("llm".into(), 2);

        let json = serde_json::to_string(&ctx).unwrap();
        let back: Context = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, back);
    }
}
