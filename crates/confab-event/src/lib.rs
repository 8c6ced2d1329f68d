//! Event system for confab.
//!
//! Everything the engine learns about the outside world arrives as an
//! [`Event`] on a single ordered queue. Everything the engine decides
//! to do that must be replayable goes back onto the same queue as a
//! synthetic event. That single rule — one queue, one consumer, one
//! global order — is what makes the engine deterministic and
//! interruption-safe.
//!
//! ```text
//! ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐
//! │   VAD    │ │   STT    │ │   LLM    │ │   TTS    │ │  Timers  │
//! └────┬─────┘ └────┬─────┘ └────┬─────┘ └────┬─────┘ └────┬─────┘
//!      │ enqueue    │            │            │            │
//!      ▼            ▼            ▼            ▼            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │   EventQueue     seq 1, 2, 3, …  (monotonic, enqueue order)  │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ recv (single consumer)
//!                                ▼
//!                         SessionEngine ──► synthetic events
//!                                              (tail of same queue)
//! ```
//!
//! # Contents
//!
//! - [`Event`], [`EventKind`], [`ToolCall`] — the event vocabulary
//! - [`EventQueue`], [`EventSender`] — the ordered queue
//! - [`WordTiming`], [`delivered_prefix`] — the TTS timing track
//! - [`EventError`] — event layer errors

mod error;
mod event;
pub mod observe;
mod queue;
mod timing;

pub use error::EventError;
pub use event::{Event, EventKind, ToolCall};
pub use observe::{ObservabilitySink, ObservationRecord};
pub use queue::{EventQueue, EventSender, DEFAULT_WARN_DEPTH};
pub use timing::{delivered_prefix, WordTiming};

// Re-export from confab_types for convenience
pub use confab_types::{EventSource, SequenceNumber};
