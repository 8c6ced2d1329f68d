//! Event and event kind types.
//!
//! An [`Event`] is the only way information enters the engine. Producers
//! (VAD, STT, LLM, TTS, tool callbacks, timers, the engine itself) build
//! events and enqueue them; the engine consumes them one at a time in
//! sequence order.
//!
//! Events are immutable once enqueued: the queue stamps the sequence
//! number and enqueue timestamp, and nothing mutates an event
//! afterwards.
//!
//! # Kind names
//!
//! Transition tables key on [`EventKind::kind_name`] strings. The full
//! set is exported as [`EventKind::ALL_KIND_NAMES`] so the state chart
//! lints can check declared-coverage states exhaustively.

use crate::WordTiming;
use confab_types::{EventId, EventSource, InvocationId, SequenceNumber, TraceId, TurnId};
use serde::{Deserialize, Serialize};

/// A tool call requested by a transition action.
///
/// This is the wire form carried on [`EventKind::ToolRequested`]; the
/// engine enriches it with session identity and granted permissions
/// before handing it to the gateway. The `idempotency_key` is assigned
/// when the logical action is first requested and is never regenerated,
/// so gateway-internal retries and crash-replay hit the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Invocation identity, stable across retries.
    pub invocation_id: InvocationId,
    /// Stable key for at-most-once execution.
    pub idempotency_key: String,
    /// Registered tool name.
    pub tool_name: String,
    /// Registered tool version.
    pub version: String,
    /// JSON parameters, validated by the gateway against the tool schema.
    pub parameters: serde_json::Value,
}

/// What happened, as observed by a producer.
///
/// | Kind | Source | Notes |
/// |------|--------|-------|
/// | `CallStart` / `CallEnd` | operator | session boundary |
/// | `SpeechStarted` / `SpeechWords` / `SpeechStopped` | vad/stt | burst-scoped |
/// | `SttFinal` | stt | final transcript of a burst |
/// | `LlmResponse` | llm | response text to synthesize |
/// | `TtsStarted` / `TtsProgress` / `TtsComplete` | tts | playback lifecycle |
/// | `BargeIn` | engine | synthetic, emitted by the interruption controller |
/// | `ToolRequested` | engine | synthetic, emitted by a transition action |
/// | `ToolCompleted` / `ToolFailed` | tool | gateway completion callbacks |
/// | `StateTimeout` | timer | carries the scheduling generation |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A call was connected and the session begins.
    CallStart,

    /// VAD detected the start of a user speech burst.
    SpeechStarted {
        /// Burst counter within the session, assigned by the producer.
        burst_id: u32,
    },

    /// STT reported additional recognized words for an open burst.
    SpeechWords {
        /// Burst this batch belongs to.
        burst_id: u32,
        /// Number of words recognized so far in this burst.
        words: u32,
    },

    /// VAD detected the end of a user speech burst.
    SpeechStopped {
        /// Burst that ended.
        burst_id: u32,
    },

    /// Final transcript for the most recent burst.
    SttFinal {
        /// Recognized user utterance.
        text: String,
    },

    /// The LLM produced a response to speak.
    LlmResponse {
        /// Response text handed to TTS.
        text: String,
    },

    /// TTS playback started.
    ///
    /// The word timing track is required; synthesis responses without
    /// one are rejected at the boundary (integration gap, not silently
    /// tolerated).
    TtsStarted {
        /// Full synthesized text.
        text: String,
        /// Word-level timestamp track for the utterance.
        words: Vec<WordTiming>,
    },

    /// TTS playback position report.
    TtsProgress {
        /// Milliseconds of audio played so far.
        played_ms: u64,
    },

    /// TTS playback finished naturally.
    TtsComplete,

    /// The user interrupted active playback (synthetic).
    BargeIn {
        /// Milliseconds of audio actually delivered before truncation.
        delivered_ms: u64,
        /// Last fully delivered word, if any.
        last_delivered_word: Option<String>,
    },

    /// A transition action requested a tool invocation (synthetic).
    ToolRequested {
        /// The requested call.
        call: ToolCall,
    },

    /// A tool invocation finished successfully.
    ToolCompleted {
        /// The invocation that finished.
        invocation_id: InvocationId,
        /// Schema-validated tool result.
        result: serde_json::Value,
    },

    /// A tool invocation failed after gateway-side retries.
    ToolFailed {
        /// The invocation that failed.
        invocation_id: InvocationId,
        /// Machine-readable gateway error code.
        error_code: String,
        /// Human-readable failure description.
        message: String,
        /// `false` only when the engine may re-request with corrected
        /// parameters; `true` for exhausted retries and hard rejections.
        terminal: bool,
    },

    /// A state's declared timeout expired.
    StateTimeout {
        /// State that scheduled the timer.
        state: String,
        /// Entry generation at scheduling time; stale generations are
        /// no-ops.
        generation: u64,
    },

    /// The call ended (hangup or engine-directed termination).
    CallEnd,
}

impl EventKind {
    /// Every kind name, for exhaustive-coverage lints.
    pub const ALL_KIND_NAMES: [&'static str; 15] = [
        "call_start",
        "speech_started",
        "speech_words",
        "speech_stopped",
        "stt_final",
        "llm_response",
        "tts_started",
        "tts_progress",
        "tts_complete",
        "barge_in",
        "tool_requested",
        "tool_completed",
        "tool_failed",
        "state_timeout",
        "call_end",
    ];

    /// Returns the stable name transition tables key on.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::CallStart => "call_start",
            Self::SpeechStarted { .. } => "speech_started",
            Self::SpeechWords { .. } => "speech_words",
            Self::SpeechStopped { .. } => "speech_stopped",
            Self::SttFinal { .. } => "stt_final",
            Self::LlmResponse { .. } => "llm_response",
            Self::TtsStarted { .. } => "tts_started",
            Self::TtsProgress { .. } => "tts_progress",
            Self::TtsComplete => "tts_complete",
            Self::BargeIn { .. } => "barge_in",
            Self::ToolRequested { .. } => "tool_requested",
            Self::ToolCompleted { .. } => "tool_completed",
            Self::ToolFailed { .. } => "tool_failed",
            Self::StateTimeout { .. } => "state_timeout",
            Self::CallEnd => "call_end",
        }
    }

    /// Returns `true` if this is a barge-in event.
    #[must_use]
    pub fn is_barge_in(&self) -> bool {
        matches!(self, Self::BargeIn { .. })
    }

    /// Returns `true` if this kind ends the session.
    #[must_use]
    pub fn is_call_end(&self) -> bool {
        matches!(self, Self::CallEnd)
    }
}

/// One event in a session's ordered stream.
///
/// `seq` and `timestamp_ms` are stamped by the queue at enqueue time;
/// a freshly built event carries [`SequenceNumber::ZERO`] until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Producer-assigned identity.
    pub id: EventId,
    /// Enqueue-time position in the session's global order.
    pub seq: SequenceNumber,
    /// Trace this event belongs to.
    pub trace_id: TraceId,
    /// Turn this event belongs to, when known at creation.
    pub turn_id: Option<TurnId>,
    /// What happened.
    pub kind: EventKind,
    /// Event time in unix ms. Stamped at enqueue when zero; preserved
    /// when preset (trace-log replay). Informational — ordering is by
    /// `seq` alone.
    pub timestamp_ms: u64,
    /// Producer class.
    pub source: EventSource,
}

impl Event {
    /// Creates an event ready for enqueueing.
    ///
    /// Sequence number and timestamp are stamped by the queue.
    #[must_use]
    pub fn new(kind: EventKind, source: EventSource, trace_id: TraceId) -> Self {
        Self {
            id: EventId::new(),
            seq: SequenceNumber::ZERO,
            trace_id,
            turn_id: None,
            kind,
            timestamp_ms: 0,
            source,
        }
    }

    /// Attaches a turn id (builder pattern).
    #[must_use]
    pub fn with_turn(mut self, turn_id: TurnId) -> Self {
        self.turn_id = Some(turn_id);
        self
    }

    /// Returns the stable kind name.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }
}
