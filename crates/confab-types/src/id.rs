//! Identifier types for confab.
//!
//! All identifiers are UUID-backed for network compatibility. Sequence
//! numbers are plain `u64` wrappers assigned by the event queue, never
//! by producers.

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// Confab namespace UUID for deterministic UUID v5 generation.
///
/// Used to derive stable session identifiers from names (tooling,
/// conformance fixtures) via UUID v5 (SHA-1 based).
const CONFAB_NAMESPACE: Uuid = uuid!("7c9e4b1a-52d3-4f0e-9b6a-1d8f3c2e5a70");

/// Identifier for a conversation session.
///
/// One session corresponds to one conversation (one call), one event
/// queue, one checkpoint stream, and one context. Two sessions are
/// fully independent.
///
/// # UUID Strategy
///
/// - Live sessions use UUID v4 (random).
/// - Named sessions (fixtures, replay tooling) use UUID v5, so the same
///   name always maps to the same session across processes.
///
/// # Example
///
/// ```
/// use confab_types::SessionId;
///
/// let live = SessionId::new();
/// let a = SessionId::from_name("replay-happy-path");
/// let b = SessionId::from_name("replay-happy-path");
///
/// assert_ne!(live, a);
/// assert_eq!(a, b); // Same name, same session
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new [`SessionId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic [`SessionId`] from a name (UUID v5).
    ///
    /// The same name always produces the same id. Intended for replay
    /// fixtures and operator tooling, not live traffic.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&CONFAB_NAMESPACE, name.as_bytes()))
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Identifier for a distributed trace.
///
/// Carried on every event and attached to every transition and tool
/// invocation record, so a single user interaction can be followed
/// across the engine, the gateway, and external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(pub Uuid);

impl TraceId {
    /// Creates a new [`TraceId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trace:{}", self.0)
    }
}

/// Identifier for a conversational turn.
///
/// A turn is one utterance in the conversation history (user or
/// assistant). Events produced while a turn is in flight carry its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    /// Creates a new [`TurnId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn:{}", self.0)
    }
}

/// Identifier for a single enqueued event.
///
/// Distinct from [`SequenceNumber`]: the id is assigned at creation by
/// the producer, the sequence number at enqueue time by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new [`EventId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event:{}", self.0)
    }
}

/// Identifier for one tool invocation attempt group.
///
/// Stable across gateway-internal retries: retrying a timed-out call
/// reuses the same [`InvocationId`] (and the same idempotency key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    /// Creates a new [`InvocationId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invocation:{}", self.0)
    }
}

/// Identifier for a tenant (customer account).
///
/// Rate-limit buckets and idempotency records are partitioned by
/// tenant above the session level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// Creates a new [`TenantId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic [`TenantId`] from a name (UUID v5).
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&CONFAB_NAMESPACE, name.as_bytes()))
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tenant:{}", self.0)
    }
}

/// Position of an event in a session's global order.
///
/// Assigned by the event queue at enqueue time from a monotonic
/// counter. Processing order is strictly ascending sequence order;
/// wall-clock timestamps are informational only.
///
/// # Example
///
/// ```
/// use confab_types::SequenceNumber;
///
/// let first = SequenceNumber(1);
/// let second = first.next();
///
/// assert!(second > first);
/// assert_eq!(second.value(), 2);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence number before any event has been enqueued.
    pub const ZERO: Self = Self(0);

    /// Returns the next sequence number.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the inner value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
