//! Checkpoint data and the storage abstraction.

use crate::machine::{Context, StatePath};
use confab_types::{ErrorCode, SequenceNumber, SessionId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// A durable snapshot of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Session this snapshot belongs to.
    pub session_id: SessionId,
    /// Hierarchical path of the current state.
    pub state_path: StatePath,
    /// Full context snapshot.
    pub context: Context,
    /// Sequence number of the last applied event.
    pub sequence_number: SequenceNumber,
    /// Write time (unix ms), informational.
    pub created_at_ms: u64,
}

impl Checkpoint {
    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self).map_err(|e| CheckpointError::Serde(e.to_string()))
    }

    /// Deserializes from JSON.
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        serde_json::from_str(json).map_err(|e| CheckpointError::Serde(e.to_string()))
    }
}

/// Checkpoint storage failure.
#[derive(Debug, Clone, Error)]
pub enum CheckpointError {
    /// No checkpoint exists for the session.
    #[error("no checkpoint for session {0}")]
    NotFound(SessionId),

    /// Conditional write lost: the store already holds this sequence
    /// or a later one.
    #[error("sequence conflict for {session_id}: stored {stored}, attempted {attempted}")]
    SequenceConflict {
        /// Session with the conflict.
        session_id: SessionId,
        /// Sequence already stored.
        stored: SequenceNumber,
        /// Sequence the caller tried to write.
        attempted: SequenceNumber,
    },

    /// Underlying I/O failure.
    #[error("checkpoint io error: {0}")]
    Io(String),

    /// Serialization failure.
    #[error("checkpoint serialization error: {0}")]
    Serde(String),
}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl ErrorCode for CheckpointError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CHECKPOINT_NOT_FOUND",
            Self::SequenceConflict { .. } => "CHECKPOINT_SEQUENCE_CONFLICT",
            Self::Io(_) => "CHECKPOINT_IO",
            Self::Serde(_) => "CHECKPOINT_SERDE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Checkpoint persistence abstraction.
///
/// Implementations must be thread-safe (`Send + Sync`) and must
/// enforce the conditional-write contract in `put`.
pub trait CheckpointStore: Send + Sync {
    /// Writes a checkpoint.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::SequenceConflict`] when the stored
    /// checkpoint's sequence number is greater than or equal to the
    /// incoming one.
    fn put(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = Result<(), CheckpointError>> + Send;

    /// Reads the latest checkpoint for a session.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`] when the session has never
    /// checkpointed.
    fn latest(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Checkpoint, CheckpointError>> + Send;

    /// Checks whether a session has a checkpoint.
    fn exists(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<bool, CheckpointError>> + Send;

    /// Removes a session's checkpoint (session teardown).
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`] when nothing was stored.
    fn delete(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<(), CheckpointError>> + Send;
}
