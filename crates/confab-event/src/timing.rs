//! Word-level playback timing.
//!
//! Every TTS synthesis response must carry a word-level timestamp track.
//! This is a hard precondition for interruption truncation: when the
//! user barges in, the conversation history must keep exactly the words
//! that were actually played, and the timing track is the only source
//! of truth for that boundary.
//!
//! A synthesis response without a timing track is a documented
//! integration gap — the engine rejects it at the boundary rather than
//! silently recording undelivered content.

use serde::{Deserialize, Serialize};

/// Timing of one synthesized word within a TTS stream.
///
/// Millisecond offsets are relative to the start of playback for the
/// utterance; char offsets index into the full synthesized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTiming {
    /// The word as synthesized.
    pub word: String,
    /// Playback start offset in milliseconds.
    pub start_ms: u64,
    /// Playback end offset in milliseconds.
    pub end_ms: u64,
    /// Byte offset of the word's first char in the full text.
    pub char_start: usize,
    /// Byte offset one past the word's last char.
    pub char_end: usize,
}

impl WordTiming {
    /// Creates a timing entry.
    #[must_use]
    pub fn new(
        word: impl Into<String>,
        start_ms: u64,
        end_ms: u64,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        Self {
            word: word.into(),
            start_ms,
            end_ms,
            char_start,
            char_end,
        }
    }

    /// Returns `true` if this word finished playing by `delivered_ms`.
    #[must_use]
    pub fn delivered_by(&self, delivered_ms: u64) -> bool {
        self.end_ms <= delivered_ms
    }
}

/// Computes the delivered prefix of a timed word track.
///
/// Keeps exactly the words with `end_ms <= delivered_ms` — a word that
/// was cut off mid-playback is not part of the delivered prefix.
/// Returns the prefix as text plus the last fully delivered word, if
/// any.
///
/// # Example
///
/// ```
/// use confab_event::{delivered_prefix, WordTiming};
///
/// let track = vec![
///     WordTiming::new("your", 0, 200, 0, 4),
///     WordTiming::new("flight", 200, 600, 5, 11),
///     WordTiming::new("departs", 600, 1100, 12, 19),
/// ];
///
/// let (text, last) = delivered_prefix(&track, 700);
/// assert_eq!(text, "your flight");
/// assert_eq!(last.as_deref(), Some("flight"));
/// ```
#[must_use]
pub fn delivered_prefix(track: &[WordTiming], delivered_ms: u64) -> (String, Option<String>) {
    let mut words = Vec::new();
    for timing in track {
        if timing.delivered_by(delivered_ms) {
            words.push(timing.word.as_str());
        } else {
            break;
        }
    }
    let last = words.last().map(|w| (*w).to_string());
    (words.join(" "), last)
}
