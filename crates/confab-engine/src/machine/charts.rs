//! The shipped voice-call chart.
//!
//! ```text
//!                 call_start
//!   idle ────────────────────────► listening ◄───────────────┐
//!                                    │ stt_final             │
//!                                    ▼                       │ tts_complete /
//!                                 thinking ──llm_response──► speaking
//!                                 │      ▲                   │ barge_in
//!                   tool_requested│      │tool_completed     ▼
//!                 ┌───────────────┤      │                (truncate,
//!                 ▼               │      │                 back to listening)
//!        processing_payment    tool_wait─┘
//!         (charge_payment,        │ tool_failed (retries left)
//!          not interruptible)     └──────────► thinking
//!                 │ tool_failed                │ tool_failed (exhausted)
//!                 ▼                            ▼
//!           payment_failed                 api_error ──► escalated ──► completed
//! ```
//!
//! Every error state has a defined exit; every timeout state has a
//! `state_timeout` transition. The chart passes the startup lints by
//! construction and the tests keep it that way.

use crate::machine::{Action, StateChart, StateDef, Transition, Trigger};
use confab_event::EventKind;
use std::time::Duration;

/// Maximum chart-level tool retries before escalating to `api_error`.
const MAX_TOOL_RETRIES: u32 = 3;

/// Builds the production voice-call chart.
///
/// Guards for the same `(state, event)` pair are declared
/// most-specific first; the payment tool routes to the
/// non-interruptible `processing_payment` state while every other tool
/// waits in `tool_wait`.
#[must_use]
pub fn voice_call() -> StateChart {
    StateChart::builder()
        .initial("idle")
        // ── States ──────────────────────────────────────────────
        .state(StateDef::new("idle").declares(["call_start"]))
        .state(
            StateDef::new("listening")
                .timeout(Duration::from_secs(30))
                .declares(["stt_final", "state_timeout", "call_end"]),
        )
        .state(
            StateDef::new("thinking")
                .timeout(Duration::from_secs(15))
                .declares([
                    "llm_response",
                    "tool_requested",
                    "state_timeout",
                    "call_end",
                ]),
        )
        .state(
            StateDef::new("speaking")
                .declares(["tts_started", "tts_complete", "barge_in", "call_end"]),
        )
        .state(
            StateDef::new("tool_wait")
                .timeout(Duration::from_secs(35))
                .declares(["tool_completed", "tool_failed", "state_timeout", "call_end"]),
        )
        .state(
            StateDef::new("processing_payment")
                .parent("payment")
                .interruptible(false)
                .timeout(Duration::from_secs(45))
                .declares(["tool_completed", "tool_failed", "state_timeout", "call_end"]),
        )
        .state(
            StateDef::new("api_error")
                .error_state()
                .timeout(Duration::from_secs(10))
                .declares(["llm_response", "state_timeout", "call_end"]),
        )
        .state(
            StateDef::new("payment_failed")
                .parent("payment")
                .error_state()
                .timeout(Duration::from_secs(30))
                .declares(["llm_response", "stt_final", "state_timeout", "call_end"]),
        )
        .state(
            StateDef::new("timed_out")
                .error_state()
                .timeout(Duration::from_secs(10))
                .declares(["llm_response", "stt_final", "state_timeout", "call_end"]),
        )
        .state(
            StateDef::new("escalated")
                .timeout(Duration::from_secs(120))
                .declares(["call_end", "state_timeout"]),
        )
        .state(StateDef::new("completed").on_entry(vec![Action::EndSession]))
        // ── idle ────────────────────────────────────────────────
        .transition(Transition::new("idle", Trigger::kind("call_start"), "listening"))
        // ── listening ───────────────────────────────────────────
        .transition(
            Transition::new("listening", Trigger::kind("stt_final"), "thinking")
                .with_actions(vec![Action::AppendUserTurn]),
        )
        .transition(Transition::new(
            "listening",
            Trigger::kind("state_timeout"),
            "timed_out",
        ))
        .transition(Transition::new("listening", Trigger::kind("call_end"), "completed"))
        // ── thinking ────────────────────────────────────────────
        .transition(
            Transition::new("thinking", Trigger::kind("llm_response"), "speaking")
                .with_actions(vec![Action::BeginAssistantTurn, Action::ResetRetry("llm".into())]),
        )
        // Payment charges run in the dedicated non-interruptible
        // state; most-specific guard first.
        .transition(
            Transition::new("thinking", Trigger::kind("tool_requested"), "processing_payment")
                .guarded(|_, event| {
                    matches!(
                        &event.kind,
                        EventKind::ToolRequested { call } if call.tool_name == "charge_payment"
                    )
                }),
        )
        .transition(Transition::new(
            "thinking",
            Trigger::kind("tool_requested"),
            "tool_wait",
        ))
        .transition(
            Transition::new("thinking", Trigger::kind("state_timeout"), "api_error")
                .with_actions(vec![Action::IncrementRetry("llm".into())]),
        )
        .transition(Transition::new("thinking", Trigger::kind("call_end"), "completed"))
        // ── speaking ────────────────────────────────────────────
        .transition(
            Transition::new("speaking", Trigger::kind("tts_started"), "speaking")
                .with_actions(vec![Action::RecordPlayback]),
        )
        .transition(
            Transition::new("speaking", Trigger::kind("tts_complete"), "listening")
                .with_actions(vec![Action::CommitAssistantTurn]),
        )
        .transition(
            Transition::new("speaking", Trigger::kind("barge_in"), "listening")
                .with_actions(vec![Action::TruncateAssistantTurn, Action::CancelPendingTools]),
        )
        .transition(Transition::new("speaking", Trigger::kind("call_end"), "completed"))
        // ── tool_wait ───────────────────────────────────────────
        .transition(
            Transition::new("tool_wait", Trigger::kind("tool_completed"), "thinking")
                .with_actions(vec![Action::SettleInvocation, Action::ResetRetry("tool".into())]),
        )
        // Correctable failures go back to thinking while retries
        // remain; the exhausted case follows.
        .transition(
            Transition::new("tool_wait", Trigger::kind("tool_failed"), "thinking")
                .guarded(|ctx, _| ctx.retries("tool") < MAX_TOOL_RETRIES)
                .with_actions(vec![
                    Action::SettleInvocation,
                    Action::IncrementRetry("tool".into()),
                ]),
        )
        .transition(
            Transition::new("tool_wait", Trigger::kind("tool_failed"), "api_error")
                .with_actions(vec![Action::SettleInvocation]),
        )
        .transition(Transition::new(
            "tool_wait",
            Trigger::kind("state_timeout"),
            "api_error",
        ))
        .transition(Transition::new("tool_wait", Trigger::kind("call_end"), "completed"))
        // ── processing_payment ──────────────────────────────────
        .transition(
            Transition::new("processing_payment", Trigger::kind("tool_completed"), "thinking")
                .with_actions(vec![Action::SettleInvocation]),
        )
        .transition(
            Transition::new("processing_payment", Trigger::kind("tool_failed"), "payment_failed")
                .with_actions(vec![Action::SettleInvocation]),
        )
        .transition(Transition::new(
            "processing_payment",
            Trigger::kind("state_timeout"),
            "api_error",
        ))
        .transition(Transition::new(
            "processing_payment",
            Trigger::kind("call_end"),
            "completed",
        ))
        // ── api_error ───────────────────────────────────────────
        .transition(
            Transition::new("api_error", Trigger::kind("llm_response"), "speaking")
                .with_actions(vec![Action::BeginAssistantTurn]),
        )
        .transition(Transition::new(
            "api_error",
            Trigger::kind("state_timeout"),
            "escalated",
        ))
        .transition(Transition::new("api_error", Trigger::kind("call_end"), "completed"))
        // ── payment_failed ──────────────────────────────────────
        .transition(
            Transition::new("payment_failed", Trigger::kind("llm_response"), "speaking")
                .with_actions(vec![Action::BeginAssistantTurn]),
        )
        .transition(
            Transition::new("payment_failed", Trigger::kind("stt_final"), "thinking")
                .with_actions(vec![Action::AppendUserTurn]),
        )
        .transition(Transition::new(
            "payment_failed",
            Trigger::kind("state_timeout"),
            "escalated",
        ))
        .transition(Transition::new(
            "payment_failed",
            Trigger::kind("call_end"),
            "completed",
        ))
        // ── timed_out ───────────────────────────────────────────
        .transition(
            Transition::new("timed_out", Trigger::kind("llm_response"), "speaking")
                .with_actions(vec![Action::BeginAssistantTurn]),
        )
        .transition(
            Transition::new("timed_out", Trigger::kind("stt_final"), "thinking")
                .with_actions(vec![Action::AppendUserTurn]),
        )
        .transition(Transition::new(
            "timed_out",
            Trigger::kind("state_timeout"),
            "escalated",
        ))
        .transition(Transition::new("timed_out", Trigger::kind("call_end"), "completed"))
        // ── escalated ───────────────────────────────────────────
        .transition(Transition::new("escalated", Trigger::kind("call_end"), "completed"))
        .transition(Transition::new(
            "escalated",
            Trigger::kind("state_timeout"),
            "completed",
        ))
        .build()
        .expect("voice_call chart passes its own lints")
}
