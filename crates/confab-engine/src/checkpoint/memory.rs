//! In-memory checkpoint store.

use super::{Checkpoint, CheckpointError, CheckpointStore};
use confab_types::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Non-durable store for tests and embedded use.
///
/// The conditional-write check and the insert happen under one lock
/// acquisition, matching the atomic compare-and-write contract.
#[derive(Debug, Default)]
pub struct MemoryStore {
    checkpoints: Mutex<HashMap<SessionId, Checkpoint>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with a checkpoint.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    /// Returns `true` when no session has checkpointed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }
}

impl CheckpointStore for MemoryStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut map = self.checkpoints.lock();
        if let Some(stored) = map.get(&checkpoint.session_id) {
            if stored.sequence_number >= checkpoint.sequence_number {
                return Err(CheckpointError::SequenceConflict {
                    session_id: checkpoint.session_id,
                    stored: stored.sequence_number,
                    attempted: checkpoint.sequence_number,
                });
            }
        }
        map.insert(checkpoint.session_id, checkpoint.clone());
        Ok(())
    }

    async fn latest(&self, session_id: SessionId) -> Result<Checkpoint, CheckpointError> {
        self.checkpoints
            .lock()
            .get(&session_id)
            .cloned()
            .ok_or(CheckpointError::NotFound(session_id))
    }

    async fn exists(&self, session_id: SessionId) -> Result<bool, CheckpointError> {
        Ok(self.checkpoints.lock().contains_key(&session_id))
    }

    async fn delete(&self, session_id: SessionId) -> Result<(), CheckpointError> {
        self.checkpoints
            .lock()
            .remove(&session_id)
            .map(|_| ())
            .ok_or(CheckpointError::NotFound(session_id))
    }
}
