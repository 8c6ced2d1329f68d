//! Engine errors.

use crate::checkpoint::CheckpointError;
use confab_types::ErrorCode;
use thiserror::Error;

/// Engine failure.
///
/// Most event-level problems are no-ops by design; an `EngineError`
/// means the session itself can no longer make progress.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The current state is not in the chart — a broken invariant,
    /// only possible when resuming against a different chart.
    #[error("current state '{0}' is not in the chart")]
    UnknownState(String),

    /// Checkpoint persistence failed; processing must stop rather
    /// than continue without durability.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownState(_) => "ENGINE_UNKNOWN_STATE",
            Self::Checkpoint(inner) => inner.code(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::UnknownState(_) => false,
            Self::Checkpoint(inner) => inner.is_recoverable(),
        }
    }
}
