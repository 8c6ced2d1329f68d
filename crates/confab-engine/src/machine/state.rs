//! State definitions.
//!
//! States are declarative nodes: the engine never special-cases a
//! state by name. Interruptibility, timeouts, entry/exit actions, and
//! the set of event kinds a state promises to handle all live here and
//! are checked by the chart lints at build time.

use crate::machine::Action;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One node of the state chart.
#[derive(Debug, Clone)]
pub struct StateDef {
    /// Unique state name.
    pub name: String,
    /// Optional parent group for hierarchical paths
    /// (`parent/name` in checkpoints and logs).
    pub parent: Option<String>,
    /// Whether barge-in may interrupt output while in this state.
    pub interruptible: bool,
    /// Declared dwell timeout. Entering the state schedules a
    /// `state_timeout` event; the chart lints require an explicit
    /// transition for it.
    pub timeout: Option<Duration>,
    /// Marks an error state; the lints require error states to have a
    /// defined exit (no reachable dead ends).
    pub is_error: bool,
    /// Event kinds this state promises to handle. Each must have a
    /// specific transition or be covered by a catch-all; kinds not
    /// listed here are allowed to no-op.
    pub declared_events: Vec<String>,
    /// Actions applied when the state is entered.
    pub entry_actions: Vec<Action>,
    /// Actions applied when the state is left.
    pub exit_actions: Vec<Action>,
}

impl StateDef {
    /// Creates an interruptible state with no timeout or declarations.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            interruptible: true,
            timeout: None,
            is_error: false,
            declared_events: Vec::new(),
            entry_actions: Vec::new(),
            exit_actions: Vec::new(),
        }
    }

    /// Sets the parent group.
    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Sets interruptibility.
    #[must_use]
    pub fn interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }

    /// Declares a dwell timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Marks this as an error state.
    #[must_use]
    pub fn error_state(mut self) -> Self {
        self.is_error = true;
        self
    }

    /// Declares the event kinds this state must cover.
    #[must_use]
    pub fn declares(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.declared_events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Sets entry actions.
    #[must_use]
    pub fn on_entry(mut self, actions: Vec<Action>) -> Self {
        self.entry_actions = actions;
        self
    }

    /// Sets exit actions.
    #[must_use]
    pub fn on_exit(mut self, actions: Vec<Action>) -> Self {
        self.exit_actions = actions;
        self
    }

    /// Returns the hierarchical path: `parent/name`, or just `name`.
    #[must_use]
    pub fn path(&self) -> StatePath {
        StatePath::new(self.parent.as_deref(), &self.name)
    }
}

/// Hierarchical state path stored in checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatePath(pub String);

impl StatePath {
    /// Builds a path from an optional parent and a leaf name.
    #[must_use]
    pub fn new(parent: Option<&str>, name: &str) -> Self {
        match parent {
            Some(parent) => Self(format!("{parent}/{name}")),
            None => Self(name.to_string()),
        }
    }

    /// Returns the leaf state name.
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for StatePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let state = StateDef::new("listening");
        assert_eq!(state.name, "listening");
        assert!(state.interruptible);
        assert!(state.timeout.is_none());
        assert!(!state.is_error);
        assert!(state.declared_events.is_empty());
    }

    #[test]
    fn path_with_parent() {
        let state = StateDef::new("charge").parent("payment");
        assert_eq!(state.path(), StatePath("payment/charge".into()));
        assert_eq!(state.path().leaf(), "charge");
    }

    #[test]
    fn path_without_parent() {
        let state = StateDef::new("idle");
        assert_eq!(state.path().to_string(), "idle");
        assert_eq!(state.path().leaf(), "idle");
    }

    #[test]
    fn error_state_flag() {
        let state = StateDef::new("api_error")
            .error_state()
            .timeout(Duration::from_secs(10));
        assert!(state.is_error);
        assert_eq!(state.timeout, Some(Duration::from_secs(10)));
    }
}
