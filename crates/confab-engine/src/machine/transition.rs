//! Transitions, guards, and actions.
//!
//! A transition is `(from_state, trigger, guard, to_state, actions)`.
//! Guards are pure predicates over `(context, event)` — by contract
//! they have no side effects. For one `(state, trigger)` pair, guards
//! are evaluated in declaration order and the first one returning true
//! wins; the author orders them from most-specific to least-specific.
//!
//! Actions are the only way the context changes. Each action is a pure
//! function of `(context, event)` plus a set of requested effects
//! (synthetic events, tool dispatches, session end) that the engine
//! carries out after the mutation.

use crate::machine::context::{Context, Role};
use confab_event::{delivered_prefix, Event, EventKind, ToolCall};
use confab_types::InvocationId;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Pure guard predicate.
pub type GuardFn = dyn Fn(&Context, &Event) -> bool + Send + Sync;

/// Parameter builder for chart-driven tool requests.
pub type ParamsFn = dyn Fn(&Context, &Event) -> serde_json::Value + Send + Sync;

/// What a transition listens for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A specific event kind name (see `EventKind::kind_name`).
    Kind(String),
    /// Any event kind — the state's catch-all escalation.
    Any,
}

impl Trigger {
    /// Creates a kind trigger.
    #[must_use]
    pub fn kind(name: impl Into<String>) -> Self {
        Self::Kind(name.into())
    }
}

/// Template for a chart-driven tool request.
///
/// The idempotency key is minted deterministically from the context's
/// invocation counter, so a replayed transition requests the same
/// logical action under the same key.
#[derive(Clone)]
pub struct ToolRequestTemplate {
    /// Registered tool name.
    pub tool_name: String,
    /// Registered tool version.
    pub version: String,
    /// Key prefix; the full key is `session:prefix:counter`.
    pub key_prefix: String,
    /// Builds the call parameters from `(context, event)`.
    pub params: Arc<ParamsFn>,
}

impl std::fmt::Debug for ToolRequestTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRequestTemplate")
            .field("tool_name", &self.tool_name)
            .field("version", &self.version)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// A context mutation and/or requested effect.
#[derive(Debug, Clone)]
pub enum Action {
    /// Commits the final transcript of an `stt_final` event as a user
    /// turn.
    AppendUserTurn,

    /// Starts a pending assistant utterance from an `llm_response`
    /// event. Nothing reaches history yet.
    BeginAssistantTurn,

    /// Attaches the synthesized text and word timing track from a
    /// `tts_started` event to the pending utterance.
    RecordPlayback,

    /// Commits the pending utterance whole (playback finished).
    CommitAssistantTurn,

    /// Commits only the delivered prefix of the pending utterance,
    /// using the `barge_in` event's delivered duration against the
    /// word timing track. The undelivered remainder is discarded.
    TruncateAssistantTurn,

    /// Requests a tool invocation; emits a synthetic `tool_requested`
    /// event and tracks the call as pending.
    RequestTool(ToolRequestTemplate),

    /// Removes the settled invocation of a `tool_completed` /
    /// `tool_failed` event from the pending list.
    SettleInvocation,

    /// Asks the engine to signal cancellation to every pending
    /// invocation (tools that opted out of interruption keep running).
    CancelPendingTools,

    /// Increments a named retry counter.
    IncrementRetry(String),

    /// Resets a named retry counter.
    ResetRetry(String),

    /// Emits an arbitrary synthetic event to the queue tail.
    EmitEvent(EventKind),

    /// Terminates the session after this transition's checkpoint.
    EndSession,
}

/// Effects requested by applying a list of actions.
#[derive(Debug, Default)]
pub struct ActionEffects {
    /// Synthetic events to append to the queue tail, in order.
    pub emitted: Vec<EventKind>,
    /// Signal cancellation to pending invocations.
    pub cancel_pending: bool,
    /// Terminate the session after checkpointing.
    pub end_session: bool,
}

impl Action {
    /// Applies one action.
    ///
    /// Mutations are pure in `(context, event)`; requested effects are
    /// accumulated into `effects` for the engine.
    pub fn apply(&self, ctx: &mut Context, event: &Event, effects: &mut ActionEffects) {
        match self {
            Self::AppendUserTurn => {
                if let EventKind::SttFinal { text } = &event.kind {
                    ctx.push_turn(Role::User, text.clone(), event.timestamp_ms);
                } else {
                    debug!(kind = event.kind_name(), "append_user_turn on non-transcript event");
                }
            }

            Self::BeginAssistantTurn => {
                if let EventKind::LlmResponse { text } = &event.kind {
                    ctx.pending_assistant = Some(crate::machine::PendingAssistant {
                        intended_text: text.clone(),
                        synthesized_text: None,
                        words: Vec::new(),
                    });
                }
            }

            Self::RecordPlayback => {
                if let EventKind::TtsStarted { text, words } = &event.kind {
                    let pending = ctx.pending_assistant.get_or_insert_with(Default::default);
                    pending.synthesized_text = Some(text.clone());
                    pending.words = words.clone();
                }
            }

            Self::CommitAssistantTurn => {
                if let Some(pending) = ctx.pending_assistant.take() {
                    let content = pending
                        .synthesized_text
                        .unwrap_or(pending.intended_text);
                    ctx.push_turn(Role::Assistant, content, event.timestamp_ms);
                }
            }

            Self::TruncateAssistantTurn => {
                if let EventKind::BargeIn { delivered_ms, .. } = &event.kind {
                    if let Some(pending) = ctx.pending_assistant.take() {
                        let (prefix, _) = delivered_prefix(&pending.words, *delivered_ms);
                        if prefix.is_empty() {
                            debug!("barge-in before any word was delivered; no turn recorded");
                        } else {
                            ctx.push_turn(Role::Assistant, prefix, event.timestamp_ms);
                        }
                    }
                }
            }

            Self::RequestTool(template) => {
                let key = ctx.next_idempotency_key(&template.key_prefix);
                // Invocation identity derives from the key, keeping
                // replayed contexts identical.
                let invocation_id =
                    InvocationId(Uuid::new_v5(&ctx.session_id.uuid(), key.as_bytes()));
                let call = ToolCall {
                    invocation_id,
                    idempotency_key: key,
                    tool_name: template.tool_name.clone(),
                    version: template.version.clone(),
                    parameters: (template.params)(ctx, event),
                };
                ctx.pending_invocations.push(call.clone());
                effects.emitted.push(EventKind::ToolRequested { call });
            }

            Self::SettleInvocation => match &event.kind {
                EventKind::ToolCompleted { invocation_id, .. }
                | EventKind::ToolFailed { invocation_id, .. } => {
                    ctx.settle_invocation(*invocation_id);
                }
                _ => {}
            },

            Self::CancelPendingTools => {
                effects.cancel_pending = true;
            }

            Self::IncrementRetry(counter) => {
                *ctx.retry_counters.entry(counter.clone()).or_insert(0) += 1;
            }

            Self::ResetRetry(counter) => {
                ctx.retry_counters.remove(counter);
            }

            Self::EmitEvent(kind) => {
                effects.emitted.push(kind.clone());
            }

            Self::EndSession => {
                effects.end_session = true;
            }
        }
    }
}

/// A declared transition.
#[derive(Clone)]
pub struct Transition {
    /// Source state name.
    pub from: String,
    /// What the transition listens for.
    pub trigger: Trigger,
    /// Optional guard; `None` is unconditionally true.
    pub guard: Option<Arc<GuardFn>>,
    /// Target state name.
    pub to: String,
    /// Actions applied on firing, in order.
    pub actions: Vec<Action>,
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("trigger", &self.trigger)
            .field("has_guard", &self.guard.is_some())
            .field("to", &self.to)
            .finish()
    }
}

impl Transition {
    /// Creates an unguarded transition with no actions.
    #[must_use]
    pub fn new(from: impl Into<String>, trigger: Trigger, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            trigger,
            guard: None,
            to: to.into(),
            actions: Vec::new(),
        }
    }

    /// Attaches a guard.
    #[must_use]
    pub fn guarded<G>(mut self, guard: G) -> Self
    where
        G: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Attaches actions.
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Evaluates the guard for `(context, event)`.
    #[must_use]
    pub fn guard_passes(&self, ctx: &Context, event: &Event) -> bool {
        match &self.guard {
            Some(guard) => guard(ctx, event),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_event::WordTiming;
    use confab_types::{EventSource, Permission, SessionId, TenantId, TraceId};

    fn context() -> Context {
        Context::new(
            SessionId::from_name("transition-test"),
            TenantId::from_name("acme"),
            Permission::ALL,
        )
    }

    fn event(kind: EventKind) -> Event {
        let mut e = Event::new(kind, EventSource::Engine, TraceId::new());
        e.timestamp_ms = 1_000;
        e
    }

    fn apply(action: Action, ctx: &mut Context, ev: &Event) -> ActionEffects {
        let mut effects = ActionEffects::default();
        action.apply(ctx, ev, &mut effects);
        effects
    }

    #[test]
    fn append_user_turn_from_transcript() {
        let mut ctx = context();
        let ev = event(EventKind::SttFinal {
            text: "book a flight".into(),
        });
        apply(Action::AppendUserTurn, &mut ctx, &ev);

        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.history[0].role, Role::User);
        assert_eq!(ctx.history[0].content, "book a flight");
        assert_eq!(ctx.history[0].completed_at_ms, 1_000);
    }

    #[test]
    fn assistant_turn_commits_whole_on_completion() {
        let mut ctx = context();
        apply(
            Action::BeginAssistantTurn,
            &mut ctx,
            &event(EventKind::LlmResponse {
                text: "your flight departs at noon".into(),
            }),
        );
        assert!(ctx.pending_assistant.is_some());
        assert!(ctx.history.is_empty(), "nothing delivered yet");

        apply(
            Action::RecordPlayback,
            &mut ctx,
            &event(EventKind::TtsStarted {
                text: "your flight departs at noon".into(),
                words: vec![WordTiming::new("your", 0, 200, 0, 4)],
            }),
        );
        apply(Action::CommitAssistantTurn, &mut ctx, &event(EventKind::TtsComplete));

        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.history[0].content, "your flight departs at noon");
        assert!(ctx.pending_assistant.is_none());
    }

    #[test]
    fn truncate_keeps_only_delivered_words() {
        let mut ctx = context();
        apply(
            Action::BeginAssistantTurn,
            &mut ctx,
            &event(EventKind::LlmResponse {
                text: "the total is forty dollars".into(),
            }),
        );
        apply(
            Action::RecordPlayback,
            &mut ctx,
            &event(EventKind::TtsStarted {
                text: "the total is forty dollars".into(),
                words: vec![
                    WordTiming::new("the", 0, 150, 0, 3),
                    WordTiming::new("total", 150, 500, 4, 9),
                    WordTiming::new("is", 500, 650, 10, 12),
                    WordTiming::new("forty", 650, 1000, 13, 18),
                    WordTiming::new("dollars", 1000, 1500, 19, 26),
                ],
            }),
        );

        apply(
            Action::TruncateAssistantTurn,
            &mut ctx,
            &event(EventKind::BargeIn {
                delivered_ms: 700,
                last_delivered_word: Some("is".into()),
            }),
        );

        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.history[0].content, "the total is");
        assert!(ctx.pending_assistant.is_none());
    }

    #[test]
    fn truncate_with_nothing_delivered_records_no_turn() {
        let mut ctx = context();
        apply(
            Action::BeginAssistantTurn,
            &mut ctx,
            &event(EventKind::LlmResponse { text: "hi".into() }),
        );
        apply(
            Action::RecordPlayback,
            &mut ctx,
            &event(EventKind::TtsStarted {
                text: "hi".into(),
                words: vec![WordTiming::new("hi", 100, 400, 0, 2)],
            }),
        );
        apply(
            Action::TruncateAssistantTurn,
            &mut ctx,
            &event(EventKind::BargeIn {
                delivered_ms: 50,
                last_delivered_word: None,
            }),
        );

        assert!(ctx.history.is_empty());
    }

    #[test]
    fn request_tool_mints_stable_key_and_emits() {
        let template = ToolRequestTemplate {
            tool_name: "charge_payment".into(),
            version: "1".into(),
            key_prefix: "charge".into(),
            params: Arc::new(|_, _| serde_json::json!({"amount": 40})),
        };

        let mut a = context();
        let mut ea = apply(
            Action::RequestTool(template.clone()),
            &mut a,
            &event(EventKind::TtsComplete),
        );

        let mut b = context();
        let eb = apply(
            Action::RequestTool(template),
            &mut b,
            &event(EventKind::TtsComplete),
        );

        assert_eq!(a.pending_invocations.len(), 1);
        let call_a = &a.pending_invocations[0];
        let call_b = &b.pending_invocations[0];
        assert_eq!(call_a.idempotency_key, call_b.idempotency_key);
        assert_eq!(call_a.invocation_id, call_b.invocation_id);

        match ea.emitted.pop() {
            Some(EventKind::ToolRequested { call }) => {
                assert_eq!(call.tool_name, "charge_payment");
            }
            other => panic!("expected tool_requested, got {other:?}"),
        }
        assert_eq!(eb.emitted.len(), 1);
    }

    #[test]
    fn settle_removes_pending_invocation() {
        let mut ctx = context();
        let template = ToolRequestTemplate {
            tool_name: "lookup".into(),
            version: "1".into(),
            key_prefix: "lookup".into(),
            params: Arc::new(|_, _| serde_json::json!({})),
        };
        apply(
            Action::RequestTool(template),
            &mut ctx,
            &event(EventKind::TtsComplete),
        );
        let id = ctx.pending_invocations[0].invocation_id;

        apply(
            Action::SettleInvocation,
            &mut ctx,
            &event(EventKind::ToolCompleted {
                invocation_id: id,
                result: serde_json::json!({}),
            }),
        );
        assert!(ctx.pending_invocations.is_empty());
    }

    #[test]
    fn retry_counters() {
        let mut ctx = context();
        let ev = event(EventKind::TtsComplete);

        apply(Action::IncrementRetry("llm".into()), &mut ctx, &ev);
        apply(Action::IncrementRetry("llm".into()), &mut ctx, &ev);
        assert_eq!(ctx.retries("llm"), 2);

        apply(Action::ResetRetry("llm".into()), &mut ctx, &ev);
        assert_eq!(ctx.retries("llm"), 0);
    }

    #[test]
    fn effects_accumulate() {
        let mut ctx = context();
        let ev = event(EventKind::CallEnd);
        let mut effects = ActionEffects::default();

        Action::CancelPendingTools.apply(&mut ctx, &ev, &mut effects);
        Action::EndSession.apply(&mut ctx, &ev, &mut effects);
        Action::EmitEvent(EventKind::TtsComplete).apply(&mut ctx, &ev, &mut effects);

        assert!(effects.cancel_pending);
        assert!(effects.end_session);
        assert_eq!(effects.emitted.len(), 1);
    }

    #[test]
    fn unguarded_transition_always_passes() {
        let t = Transition::new("a", Trigger::kind("call_start"), "b");
        assert!(t.guard_passes(&context(), &event(EventKind::CallStart)));
    }

    #[test]
    fn guard_sees_context_and_event() {
        let t = Transition::new("a", Trigger::kind("tool_failed"), "b")
            .guarded(|ctx, _| ctx.retries("tool") < 3);

        let mut ctx = context();
        let ev = event(EventKind::CallStart);
        assert!(t.guard_passes(&ctx, &ev));

        ctx.retry_counters.insert("tool".into(), 3);
        assert!(!t.guard_passes(&ctx, &ev));
    }
}
