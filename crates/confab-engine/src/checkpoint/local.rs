//! Local file-based checkpoint store.
//!
//! One JSON file per session:
//!
//! ```text
//! ~/.confab/checkpoints/
//! ├── 550e8400-e29b-41d4-a716-446655440000.json
//! ├── 6ba7b810-9dad-11d1-80b4-00c04fd430c8.json
//! └── ...
//! ```
//!
//! Writes go to a temp file first and are renamed into place, so a
//! crash mid-write never leaves a torn checkpoint. The sequence
//! condition is checked against the current file before writing; the
//! single-consumer-per-session model means no two writers race on one
//! file in normal operation.

use super::{Checkpoint, CheckpointError, CheckpointStore};
use confab_types::SessionId;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Durable single-machine checkpoint store.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    base_path: PathBuf,
}

impl LocalFileStore {
    /// Creates a store, creating the directory if needed.
    ///
    /// A leading `~` expands to the home directory.
    pub fn new(base_path: PathBuf) -> Result<Self, CheckpointError> {
        let expanded = expand_tilde(&base_path);
        if !expanded.exists() {
            std::fs::create_dir_all(&expanded)?;
        }
        Ok(Self {
            base_path: expanded,
        })
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn checkpoint_path(&self, session_id: SessionId) -> PathBuf {
        self.base_path.join(format!("{}.json", session_id.uuid()))
    }

    fn temp_path(&self, session_id: SessionId) -> PathBuf {
        self.base_path
            .join(format!(".{}.json.tmp", session_id.uuid()))
    }
}

impl CheckpointStore for LocalFileStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.checkpoint_path(checkpoint.session_id);

        // Conditional write: refuse stale or duplicate sequences.
        if path.exists() {
            let stored = Checkpoint::from_json(&fs::read_to_string(&path).await?)?;
            if stored.sequence_number >= checkpoint.sequence_number {
                return Err(CheckpointError::SequenceConflict {
                    session_id: checkpoint.session_id,
                    stored: stored.sequence_number,
                    attempted: checkpoint.sequence_number,
                });
            }
        }

        let temp_path = self.temp_path(checkpoint.session_id);
        fs::write(&temp_path, checkpoint.to_json()?).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn latest(&self, session_id: SessionId) -> Result<Checkpoint, CheckpointError> {
        let path = self.checkpoint_path(session_id);
        if !path.exists() {
            return Err(CheckpointError::NotFound(session_id));
        }
        Checkpoint::from_json(&fs::read_to_string(&path).await?)
    }

    async fn exists(&self, session_id: SessionId) -> Result<bool, CheckpointError> {
        Ok(self.checkpoint_path(session_id).exists())
    }

    async fn delete(&self, session_id: SessionId) -> Result<(), CheckpointError> {
        let path = self.checkpoint_path(session_id);
        if !path.exists() {
            return Err(CheckpointError::NotFound(session_id));
        }
        fs::remove_file(&path).await?;
        Ok(())
    }
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
