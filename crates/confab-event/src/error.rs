//! Event layer errors.
//!
//! # Error Code Convention
//!
//! Event errors use the `EVENT_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`EventError::QueueClosed`] | `EVENT_QUEUE_CLOSED` | No |
//! | [`EventError::MissingTimingTrack`] | `EVENT_MISSING_TIMING_TRACK` | No |

use confab_types::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event layer error.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum EventError {
    /// The session's consumer has shut down; the queue accepts no more
    /// events. Producers should stop for this session.
    #[error("event queue closed")]
    QueueClosed,

    /// A TTS playback event arrived without a word-level timing track.
    ///
    /// The timing track is a hard precondition for interruption
    /// truncation; its absence is an integration gap in the TTS
    /// collaborator, rejected at the boundary.
    #[error("tts response missing word-level timing track")]
    MissingTimingTrack,
}

impl ErrorCode for EventError {
    fn code(&self) -> &'static str {
        match self {
            Self::QueueClosed => "EVENT_QUEUE_CLOSED",
            Self::MissingTimingTrack => "EVENT_MISSING_TIMING_TRACK",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::QueueClosed => false,
            Self::MissingTimingTrack => false,
        }
    }
}
