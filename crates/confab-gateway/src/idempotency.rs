//! Idempotency table.
//!
//! The table is the gateway's memory of side effects: one record per
//! idempotency key, persisting beyond the owning session so replays
//! after crash recovery and late duplicate requests resolve the same
//! way. It is one of only two resources mutated outside the
//! per-session consumer loop; every state change happens under a
//! single lock acquisition so concurrent attempts on the same key
//! cannot interleave (compare-and-set semantics).
//!
//! # Lifecycle of a key
//!
//! ```text
//! begin(key, hash)
//!   │ no record            → Fresh        (Pending record inserted)
//!   │ Succeeded, same hash → Replay(result)
//!   │ any, different hash  → Conflict     (bug/attack, never overwrite)
//!   │ Pending or Failed,
//!   │   same hash          → Fresh        (prior attempt died or failed;
//!   │                                      re-execution is permitted)
//!   ▼
//! complete(key, result) | fail(key)
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Stored status of an idempotency record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    /// An execution attempt is (or was) in flight.
    Pending,
    /// Execution succeeded; the result is stored for replay.
    Succeeded,
    /// The last execution attempt failed terminally.
    Failed,
}

/// One durable idempotency record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// The stable key.
    pub key: String,
    /// Canonical parameter hash bound to the key.
    pub parameters_hash: String,
    /// Current status.
    pub status: IdempotencyStatus,
    /// Stored result, present when `status == Succeeded`.
    pub result: Option<serde_json::Value>,
    /// Creation time (unix ms), for retention sweeps.
    pub created_at_ms: u64,
}

/// Outcome of claiming a key before execution.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// No completed record; the caller should execute.
    Fresh,
    /// A matching result exists; return it without executing.
    Replay(serde_json::Value),
    /// The key exists with a different parameter hash.
    Conflict,
}

/// In-memory idempotency table.
///
/// Suitable for a single-process deployment; the interface (claim,
/// complete, fail, purge) is what a persistent backend would expose.
#[derive(Debug, Default)]
pub struct IdempotencyTable {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl IdempotencyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a key for execution.
    ///
    /// Inserts a `Pending` record for fresh keys. The whole decision
    /// runs under one lock acquisition, so two concurrent begins on
    /// the same key cannot both observe "no record".
    pub fn begin(&self, key: &str, parameters_hash: &str, now_ms: u64) -> BeginOutcome {
        let mut records = self.records.lock();

        match records.get_mut(key) {
            None => {
                records.insert(
                    key.to_string(),
                    IdempotencyRecord {
                        key: key.to_string(),
                        parameters_hash: parameters_hash.to_string(),
                        status: IdempotencyStatus::Pending,
                        result: None,
                        created_at_ms: now_ms,
                    },
                );
                BeginOutcome::Fresh
            }
            Some(record) if record.parameters_hash != parameters_hash => {
                warn!(key, "idempotency conflict: same key, different parameters");
                BeginOutcome::Conflict
            }
            Some(record) => match record.status {
                IdempotencyStatus::Succeeded => {
                    debug!(key, "idempotent replay");
                    BeginOutcome::Replay(record.result.clone().unwrap_or(serde_json::Value::Null))
                }
                IdempotencyStatus::Pending | IdempotencyStatus::Failed => {
                    record.status = IdempotencyStatus::Pending;
                    BeginOutcome::Fresh
                }
            },
        }
    }

    /// Records a successful execution.
    pub fn complete(&self, key: &str, result: serde_json::Value) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            record.status = IdempotencyStatus::Succeeded;
            record.result = Some(result);
        }
    }

    /// Records a terminal failure; the key may be retried later with
    /// the same parameters.
    pub fn fail(&self, key: &str) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            record.status = IdempotencyStatus::Failed;
        }
    }

    /// Returns a copy of the record for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<IdempotencyRecord> {
        self.records.lock().get(key).cloned()
    }

    /// Removes records older than the retention window.
    ///
    /// Returns the number of records purged.
    pub fn purge_expired(&self, now_ms: u64, retention_ms: u64) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| now_ms.saturating_sub(r.created_at_ms) < retention_ms);
        let purged = before - records.len();
        if purged > 0 {
            debug!(purged, "purged expired idempotency records");
        }
        purged
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
