//! Tool gateway for confab.
//!
//! The gateway is the only path from the conversation engine to the
//! outside world. Every external action — a lookup, a booking, a
//! charge — goes through the same pipeline:
//!
//! ```text
//! engine action
//!     │ ToolInvocation + CancelToken
//!     ▼
//! ┌────────────────────────────────────────────────────────┐
//! │ Gateway                                                │
//! │  existence → authorization → schema → business rule    │
//! │  → rate limit → idempotency → execute → result schema  │
//! │                   (retry loop with backoff + jitter)   │
//! └────────────────────────────────────────────────────────┘
//!     │ ToolOutcome | GatewayError
//!     ▼
//! completion re-enters the engine as an ordinary queued event
//! ```
//!
//! Multi-step sequences with side effects run through the
//! [`SagaExecutor`], which compensates completed steps in reverse
//! dependency order when a later step fails.
//!
//! # Shared state
//!
//! One gateway serves every session. Its mutable state — rate-limit
//! buckets and the idempotency table — lives behind atomics and short
//! critical sections, never the per-session consumer loop.

mod cancel;
mod error;
mod gateway;
mod idempotency;
mod invocation;
mod ratelimit;
mod retry;
mod saga;
mod spec;

pub use cancel::{CancelHandle, CancelToken};
pub use error::GatewayError;
pub use gateway::{Gateway, GatewayConfig};
pub use idempotency::{BeginOutcome, IdempotencyRecord, IdempotencyStatus, IdempotencyTable};
pub use invocation::{parameters_hash, ToolInvocation, ToolOutcome};
pub use ratelimit::{HierarchicalLimiter, QuotaSettings, RateLimitExceeded, RateLimitSettings};
pub use retry::RetryPolicy;
pub use saga::{
    SagaError, SagaExecutor, SagaPlan, SagaReport, SagaStatus, SagaStep, StepReport, StepStatus,
};
pub use spec::{
    BusinessRule, RegisteredTool, RegistryError, TimeoutClass, ToolError, ToolHandler,
    ToolRegistry, ToolSpec,
};
