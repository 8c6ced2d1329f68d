//! The session engine: single consumer, single owner of context.

#[allow(clippy::module_inception)]
mod engine;
mod error;

pub use engine::{SessionEngine, TransitionOutcome};
pub use error::EngineError;
