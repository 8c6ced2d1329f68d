//! Real-time conversation orchestration engine.
//!
//! confab decides, deterministically, what a conversational session is
//! doing right now, whether it may be interrupted, which external
//! action it may safely invoke, and how it recovers from partial
//! failure.
//!
//! ```text
//! ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌───────────┐
//! │    VAD    │ │    STT    │ │    LLM    │ │    TTS    │   producers
//! └─────┬─────┘ └─────┬─────┘ └─────┬─────┘ └─────┬─────┘
//!       └─────────────┴──────┬──────┴─────────────┘
//!                            ▼ enqueue (ordered, never blocks)
//!                     ┌────────────┐
//!                     │ EventQueue │  seq 1, 2, 3, …
//!                     └─────┬──────┘
//!                           ▼ single consumer
//!                  ┌─────────────────┐     ┌──────────────────┐
//!                  │  SessionEngine  │────►│ CheckpointStore  │
//!                  │  StateChart     │     │ (write-through)  │
//!                  │  Interruption   │     └──────────────────┘
//!                  │  Controller     │
//!                  └───────┬─────────┘
//!                          ▼ actions (background dispatch)
//!                  ┌─────────────────┐
//!                  │   Tool Gateway  │──► completions re-enter
//!                  │   + Sagas       │    the queue as events
//!                  └─────────────────┘
//! ```
//!
//! # Crate map
//!
//! - [`machine`] — states, transitions, guards, actions, the chart
//!   lints, and the shipped [`machine::charts::voice_call`] chart
//! - [`engine`] — [`engine::SessionEngine`], the per-session consumer
//! - [`interrupt`] — barge-in detection and suppression
//! - [`checkpoint`] — durable snapshots with conditional writes
//! - [`config`] — the layered configuration surface
//!
//! # Invariants
//!
//! - All session mutation happens on one consumer task; producers only
//!   enqueue.
//! - Events are processed in strict enqueue order; synthetic events
//!   append to the tail of the same queue.
//! - Conversation history records only content actually delivered to
//!   the user.
//! - A checkpoint is durably written after every accepted transition,
//!   and the latest checkpoint always suffices to resume.

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod interrupt;
pub mod machine;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, LocalFileStore, MemoryStore};
pub use config::{ConfabConfig, ConfigError, ConfigLoader, EngineSettings};
pub use engine::{EngineError, SessionEngine, TransitionOutcome};
pub use interrupt::{InterruptSettings, InterruptionController};
pub use machine::{Action, ChartError, Context, StateChart, StateDef, Transition, Trigger};
