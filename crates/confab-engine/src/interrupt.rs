//! Interruption controller.
//!
//! Watches the event stream for user speech during active playback and
//! decides, deterministically, whether it becomes a barge-in:
//!
//! - The burst's accumulated word count must reach the configured
//!   minimum (default 2) — shorter bursts are noise, pure no-ops.
//! - The current state must be interruptible; otherwise the signal is
//!   counted in the suppressed-interrupts metric and ignored, with
//!   state and context untouched.
//! - A burst starting within the grace window of a previously
//!   suppressed burst is ignored outright.
//!
//! On a qualifying burst the controller emits one `barge_in` event
//! carrying the delivered playback duration and last delivered word,
//! both computed from the TTS word timing track. The engine's
//! truncation action then commits exactly the delivered prefix to
//! history.

use confab_event::{delivered_prefix, Event, EventKind, WordTiming};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Interruption tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptSettings {
    /// Minimum words in a burst before it may barge in.
    pub min_barge_in_words: u32,
    /// Ignore bursts starting this soon after a suppressed one, in ms.
    pub barge_in_grace_ms: u64,
}

impl Default for InterruptSettings {
    fn default() -> Self {
        Self {
            min_barge_in_words: 2,
            barge_in_grace_ms: 1_000,
        }
    }
}

/// Active playback being tracked.
#[derive(Debug, Clone, Default)]
struct Playback {
    words: Vec<WordTiming>,
    played_ms: u64,
}

/// A user speech burst being tracked.
#[derive(Debug, Clone)]
struct Burst {
    id: u32,
    words: u32,
    resolved: bool,
}

/// Decides whether user speech interrupts playback.
#[derive(Debug, Default)]
pub struct InterruptionController {
    settings: InterruptSettings,
    playback: Option<Playback>,
    burst: Option<Burst>,
    last_suppressed_at_ms: Option<u64>,
    suppressed: u64,
}

impl InterruptionController {
    /// Creates a controller with the given settings.
    #[must_use]
    pub fn new(settings: InterruptSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Number of suppressed interrupt signals so far.
    #[must_use]
    pub fn suppressed_interrupts(&self) -> u64 {
        self.suppressed
    }

    /// Returns `true` while playback is active.
    #[must_use]
    pub fn playback_active(&self) -> bool {
        self.playback.is_some()
    }

    /// Observes one event before the engine applies it.
    ///
    /// Returns a `barge_in` kind to enqueue when the burst qualifies.
    /// Never mutates engine state; suppression only touches the
    /// controller's own metric.
    pub fn observe(&mut self, event: &Event, state_interruptible: bool) -> Option<EventKind> {
        match &event.kind {
            EventKind::TtsStarted { words, .. } => {
                self.playback = Some(Playback {
                    words: words.clone(),
                    played_ms: 0,
                });
                None
            }
            EventKind::TtsProgress { played_ms } => {
                if let Some(playback) = &mut self.playback {
                    playback.played_ms = *played_ms;
                }
                None
            }
            EventKind::TtsComplete | EventKind::BargeIn { .. } => {
                self.playback = None;
                None
            }
            EventKind::SpeechStarted { burst_id } => {
                let in_grace = self.last_suppressed_at_ms.is_some_and(|at| {
                    event.timestamp_ms.saturating_sub(at) < self.settings.barge_in_grace_ms
                });
                if in_grace {
                    debug!(burst_id, "burst within grace window of suppressed interrupt");
                    self.burst = None;
                } else {
                    self.burst = Some(Burst {
                        id: *burst_id,
                        words: 0,
                        resolved: false,
                    });
                }
                None
            }
            EventKind::SpeechWords { burst_id, words } => {
                let settings = self.settings;
                let playing = self.playback.is_some();
                let burst = self.burst.as_mut().filter(|b| b.id == *burst_id)?;
                burst.words = (*words).max(burst.words);

                if burst.resolved || burst.words < settings.min_barge_in_words {
                    return None;
                }
                if !playing {
                    // Normal turn-taking, nothing to interrupt.
                    return None;
                }
                burst.resolved = true;

                if !state_interruptible {
                    self.suppressed += 1;
                    self.last_suppressed_at_ms = Some(event.timestamp_ms);
                    info!(
                        burst_id,
                        suppressed_total = self.suppressed,
                        "interrupt suppressed in non-interruptible state"
                    );
                    return None;
                }

                let playback = self.playback.as_ref().expect("playing checked above");
                let (_, last_delivered_word) =
                    delivered_prefix(&playback.words, playback.played_ms);
                info!(
                    burst_id,
                    delivered_ms = playback.played_ms,
                    "barge-in detected"
                );
                Some(EventKind::BargeIn {
                    delivered_ms: playback.played_ms,
                    last_delivered_word,
                })
            }
            EventKind::SpeechStopped { burst_id } => {
                if self.burst.as_ref().is_some_and(|b| b.id == *burst_id) {
                    self.burst = None;
                }
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_types::{EventSource, TraceId};

    fn event_at(kind: EventKind, at_ms: u64) -> Event {
        let mut e = Event::new(kind, EventSource::Stt, TraceId::new());
        e.timestamp_ms = at_ms;
        e
    }

    fn track() -> Vec<WordTiming> {
        vec![
            WordTiming::new("your", 0, 200, 0, 4),
            WordTiming::new("flight", 200, 600, 5, 11),
            WordTiming::new("departs", 600, 1100, 12, 19),
        ]
    }

    fn start_playback(controller: &mut InterruptionController) {
        controller.observe(
            &event_at(
                EventKind::TtsStarted {
                    text: "your flight departs".into(),
                    words: track(),
                },
                0,
            ),
            true,
        );
        controller.observe(&event_at(EventKind::TtsProgress { played_ms: 700 }, 700), true);
    }

    #[test]
    fn two_words_during_playback_barge_in() {
        let mut controller = InterruptionController::new(InterruptSettings::default());
        start_playback(&mut controller);

        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 1 }, 710), true);
        let none = controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 1, words: 1 }, 720),
            true,
        );
        assert!(none.is_none(), "one word is below the threshold");

        let barge = controller
            .observe(
                &event_at(EventKind::SpeechWords { burst_id: 1, words: 2 }, 730),
                true,
            )
            .expect("two words should barge in");

        match barge {
            EventKind::BargeIn {
                delivered_ms,
                last_delivered_word,
            } => {
                assert_eq!(delivered_ms, 700);
                assert_eq!(last_delivered_word.as_deref(), Some("flight"));
            }
            other => panic!("expected barge_in, got {other:?}"),
        }
    }

    #[test]
    fn one_barge_in_per_burst() {
        let mut controller = InterruptionController::new(InterruptSettings::default());
        start_playback(&mut controller);

        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 1 }, 710), true);
        assert!(controller
            .observe(
                &event_at(EventKind::SpeechWords { burst_id: 1, words: 2 }, 720),
                true
            )
            .is_some());
        assert!(controller
            .observe(
                &event_at(EventKind::SpeechWords { burst_id: 1, words: 5 }, 730),
                true
            )
            .is_none());
    }

    #[test]
    fn non_interruptible_state_suppresses() {
        let mut controller = InterruptionController::new(InterruptSettings::default());
        start_playback(&mut controller);

        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 1 }, 710), false);
        let result = controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 1, words: 3 }, 720),
            false,
        );

        assert!(result.is_none());
        assert_eq!(controller.suppressed_interrupts(), 1);
    }

    #[test]
    fn grace_window_ignores_followup_burst() {
        let mut controller = InterruptionController::new(InterruptSettings::default());
        start_playback(&mut controller);

        // Suppressed burst at t=720.
        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 1 }, 710), false);
        controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 1, words: 2 }, 720),
            false,
        );
        assert_eq!(controller.suppressed_interrupts(), 1);

        // New burst 300ms later, inside the 1000ms grace window: a
        // pure no-op even in an interruptible state.
        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 2 }, 1_020), true);
        let result = controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 2, words: 4 }, 1_030),
            true,
        );
        assert!(result.is_none());
        assert_eq!(controller.suppressed_interrupts(), 1, "no new suppression");
    }

    #[test]
    fn burst_after_grace_window_interrupts() {
        let mut controller = InterruptionController::new(InterruptSettings::default());
        start_playback(&mut controller);

        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 1 }, 710), false);
        controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 1, words: 2 }, 720),
            false,
        );

        // Well past the grace window, playback still active.
        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 2 }, 2_000), true);
        let result = controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 2, words: 2 }, 2_010),
            true,
        );
        assert!(result.is_some());
    }

    #[test]
    fn speech_without_playback_is_turn_taking() {
        let mut controller = InterruptionController::new(InterruptSettings::default());

        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 1 }, 10), true);
        let result = controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 1, words: 5 }, 20),
            true,
        );

        assert!(result.is_none());
        assert_eq!(controller.suppressed_interrupts(), 0);
    }

    #[test]
    fn playback_cleared_on_completion() {
        let mut controller = InterruptionController::new(InterruptSettings::default());
        start_playback(&mut controller);
        assert!(controller.playback_active());

        controller.observe(&event_at(EventKind::TtsComplete, 1_200), true);
        assert!(!controller.playback_active());

        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 1 }, 1_300), true);
        let result = controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 1, words: 3 }, 1_310),
            true,
        );
        assert!(result.is_none());
    }

    #[test]
    fn stale_burst_words_ignored() {
        let mut controller = InterruptionController::new(InterruptSettings::default());
        start_playback(&mut controller);

        controller.observe(&event_at(EventKind::SpeechStarted { burst_id: 2 }, 710), true);
        // Words for an older burst id are dropped.
        let result = controller.observe(
            &event_at(EventKind::SpeechWords { burst_id: 1, words: 9 }, 720),
            true,
        );
        assert!(result.is_none());
    }
}
