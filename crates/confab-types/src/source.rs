//! Event producer classes.
//!
//! Every event records which class of producer enqueued it. Sources are
//! informational (logging, metrics, replay analysis); routing decisions
//! are made on the event kind, never on the source.

use serde::{Deserialize, Serialize};

/// The class of producer that enqueued an event.
///
/// | Source | Produces |
/// |--------|----------|
/// | `Vad` | speech started/stopped bursts |
/// | `Stt` | partial word batches, final transcripts |
/// | `Llm` | response text |
/// | `Tts` | playback start/progress/complete |
/// | `Tool` | invocation completion/failure callbacks |
/// | `Timer` | state timeout expiries |
/// | `Engine` | synthetic events emitted during transitions |
/// | `Operator` | call control (start/end, escalation) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// Voice activity detection.
    Vad,
    /// Speech-to-text collaborator.
    Stt,
    /// LLM inference collaborator.
    Llm,
    /// Text-to-speech collaborator.
    Tts,
    /// Tool gateway completion callbacks.
    Tool,
    /// State timeout timers.
    Timer,
    /// The engine itself (synthetic events).
    Engine,
    /// Call control plane (start, hangup, escalation).
    Operator,
}

impl EventSource {
    /// Returns `true` if this source is the engine itself.
    ///
    /// Synthetic events are subject to the same ordering as external
    /// ones; this predicate exists for logging and replay analysis.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Engine)
    }

    /// Returns the display name of this source.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vad => "vad",
            Self::Stt => "stt",
            Self::Llm => "llm",
            Self::Tts => "tts",
            Self::Tool => "tool",
            Self::Timer => "timer",
            Self::Engine => "engine",
            Self::Operator => "operator",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
