//! Observability records and sinks.
//!
//! Every accepted transition and every tool invocation attempt emits a
//! structured record. Sinks are fire-and-forget: `record()` must not
//! block, fail, or otherwise sit on the critical path. A sink that
//! needs real I/O should hand records to a background task (see
//! [`ChannelSink`]).

use confab_types::{InvocationId, SessionId, TraceId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// One accepted (or no-op) transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Trace of the triggering event.
    pub trace_id: TraceId,
    /// Session that processed the event.
    pub session_id: SessionId,
    /// State before the event.
    pub state_from: String,
    /// State after the event (same as `state_from` for no-ops).
    pub state_to: String,
    /// Kind name of the triggering event.
    pub event_kind: String,
    /// `true` when a guard matched and the transition fired.
    pub guard_result: bool,
    /// Time spent applying the event, in milliseconds.
    pub latency_ms: u64,
}

/// One tool invocation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Trace of the requesting event.
    pub trace_id: TraceId,
    /// Session the tool ran for.
    pub session_id: SessionId,
    /// Invocation identity.
    pub invocation_id: InvocationId,
    /// Tool name.
    pub tool_name: String,
    /// Tool version.
    pub version: String,
    /// 1-based attempt number (0 for idempotent replays).
    pub attempt: u32,
    /// Outcome code: `OK`, `REPLAYED`, or a gateway error code.
    pub outcome_code: String,
    /// Attempt latency in milliseconds.
    pub latency_ms: u64,
}

/// A record for the observability sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationRecord {
    /// Engine transition.
    Transition(TransitionRecord),
    /// Gateway invocation attempt.
    Invocation(InvocationRecord),
}

/// Fire-and-forget observability sink.
///
/// Implementations must return promptly and never fail.
pub trait ObservabilitySink: Send + Sync {
    /// Records one observation.
    fn record(&self, record: ObservationRecord);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn record(&self, _record: ObservationRecord) {}
}

/// Sink that emits structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, record: ObservationRecord) {
        match record {
            ObservationRecord::Transition(t) => info!(
                trace_id = %t.trace_id,
                session_id = %t.session_id,
                state_from = %t.state_from,
                state_to = %t.state_to,
                event_kind = %t.event_kind,
                guard_result = t.guard_result,
                latency_ms = t.latency_ms,
                "transition"
            ),
            ObservationRecord::Invocation(i) => info!(
                trace_id = %i.trace_id,
                session_id = %i.session_id,
                invocation_id = %i.invocation_id,
                tool = %i.tool_name,
                version = %i.version,
                attempt = i.attempt,
                outcome = %i.outcome_code,
                latency_ms = i.latency_ms,
                "tool invocation"
            ),
        }
    }
}

/// Sink that forwards records to an unbounded channel.
///
/// The receiving side (a test, or an export pipeline) drains at its
/// own pace; a closed receiver silently discards records rather than
/// failing the caller.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ObservationRecord>,
}

impl ChannelSink {
    /// Creates a sink and its receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ObservationRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ObservabilitySink for ChannelSink {
    fn record(&self, record: ObservationRecord) {
        let _ = self.tx.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition() -> ObservationRecord {
        ObservationRecord::Transition(TransitionRecord {
            trace_id: TraceId::new(),
            session_id: SessionId::new(),
            state_from: "listening".into(),
            state_to: "thinking".into(),
            event_kind: "stt_final".into(),
            guard_result: true,
            latency_ms: 1,
        })
    }

    #[tokio::test]
    async fn channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new();
        sink.record(transition());

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, ObservationRecord::Transition(_)));
    }

    #[test]
    fn channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.record(transition()); // must not panic
    }

    #[test]
    fn null_and_tracing_sinks_accept_records() {
        NullSink.record(transition());
        TracingSink.record(transition());
    }
}
