//! Core types for confab.
//!
//! This crate is the SDK layer of the confab (CONversation Flow &
//! Action Broker) workspace: small, dependency-light types shared by
//! every other crate.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      SDK Layer                          │
//! ├─────────────────────────────────────────────────────────┤
//! │  confab-types  : ids, Permission, ErrorCode  ◄── HERE   │
//! │  confab-event  : Event, EventKind, EventQueue           │
//! ├─────────────────────────────────────────────────────────┤
//! │  confab-engine : state chart, engine loop, checkpoints  │
//! │  confab-gateway: tool validation/execution pipeline     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Contents
//!
//! - Identifier newtypes: [`SessionId`], [`TraceId`], [`TurnId`],
//!   [`EventId`], [`InvocationId`], [`TenantId`], [`SequenceNumber`]
//! - [`EventSource`] — producer classes
//! - [`Permission`] — bitflags permission set with superset-check
//!   authorization
//! - [`ErrorCode`] — unified error code + recoverability interface,
//!   with [`assert_error_code`]/[`assert_error_codes`] test helpers

mod error;
mod id;
mod permission;
mod source;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{EventId, InvocationId, SequenceNumber, SessionId, TenantId, TraceId, TurnId};
pub use permission::Permission;
pub use source::EventSource;
