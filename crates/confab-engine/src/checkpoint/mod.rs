//! Durable checkpoints.
//!
//! One checkpoint is written after every accepted transition, keyed by
//! the triggering event's sequence number. The most recent checkpoint
//! is always sufficient to resume a session without re-deriving lost
//! work: it carries the full state path and context.
//!
//! Stores enforce compare-and-write on the sequence number — a write
//! at or below the stored sequence is a conflict, which protects
//! against two engine instances accidentally driving one session.

mod local;
mod memory;
mod store;

pub use local::LocalFileStore;
pub use memory::MemoryStore;
pub use store::{Checkpoint, CheckpointError, CheckpointStore};
