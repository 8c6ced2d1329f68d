//! State chart construction and startup lints.
//!
//! A chart is built once at startup and validated before any event is
//! processed. Configuration mistakes the lints catch:
//!
//! - a transition referencing an unknown state or event kind
//! - a state with a `timeout` but no explicit `state_timeout`
//!   transition
//! - a declared event kind with neither a specific transition nor a
//!   catch-all
//! - an error state with no outgoing transition (a reachable dead end)
//!
//! "No transition defined" for a recognized event class is a build
//! failure here, never a runtime condition; events a state did not
//! declare simply no-op at runtime.

use crate::machine::{StateDef, Transition, Trigger};
use confab_event::EventKind;
use confab_types::ErrorCode;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Chart validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    /// No states were added.
    #[error("chart has no states")]
    Empty,

    /// The initial state is missing or unknown.
    #[error("unknown initial state: {0}")]
    UnknownInitial(String),

    /// Two states share a name.
    #[error("duplicate state: {0}")]
    DuplicateState(String),

    /// A transition references an unknown state.
    #[error("transition {from} -> {to} references unknown state '{unknown}'")]
    UnknownState {
        /// Transition source.
        from: String,
        /// Transition target.
        to: String,
        /// The name that resolved to nothing.
        unknown: String,
    },

    /// A trigger or declaration names an event kind that does not
    /// exist.
    #[error("state '{state}' references unknown event kind '{kind}'")]
    UnknownEventKind {
        /// Offending state.
        state: String,
        /// The misspelled kind.
        kind: String,
    },

    /// A state declares a timeout but no `state_timeout` transition.
    #[error("state '{0}' has a timeout but no state_timeout transition")]
    TimeoutWithoutTransition(String),

    /// A declared event kind has no transition and no catch-all.
    #[error("state '{state}' declares '{kind}' but defines no transition for it")]
    UncoveredEvent {
        /// Offending state.
        state: String,
        /// The uncovered kind.
        kind: String,
    },

    /// An error state has no way out.
    #[error("error state '{0}' has no outgoing transition")]
    DeadEndErrorState(String),
}

impl ErrorCode for ChartError {
    fn code(&self) -> &'static str {
        match self {
            Self::Empty => "CHART_EMPTY",
            Self::UnknownInitial(_) => "CHART_UNKNOWN_INITIAL",
            Self::DuplicateState(_) => "CHART_DUPLICATE_STATE",
            Self::UnknownState { .. } => "CHART_UNKNOWN_STATE",
            Self::UnknownEventKind { .. } => "CHART_UNKNOWN_EVENT_KIND",
            Self::TimeoutWithoutTransition(_) => "CHART_TIMEOUT_WITHOUT_TRANSITION",
            Self::UncoveredEvent { .. } => "CHART_UNCOVERED_EVENT",
            Self::DeadEndErrorState(_) => "CHART_DEAD_END_ERROR_STATE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A validated state chart.
#[derive(Debug, Clone)]
pub struct StateChart {
    states: HashMap<String, StateDef>,
    /// Specific transitions per `(state, kind_name)`, declaration
    /// order preserved.
    transitions: HashMap<(String, String), Vec<Transition>>,
    /// Catch-all transitions per state, declaration order preserved.
    catch_alls: HashMap<String, Vec<Transition>>,
    initial: String,
}

impl StateChart {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> StateChartBuilder {
        StateChartBuilder::default()
    }

    /// The initial state name.
    #[must_use]
    pub fn initial(&self) -> &str {
        &self.initial
    }

    /// Looks up a state definition.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&StateDef> {
        self.states.get(name)
    }

    /// Candidate transitions for `(state, kind_name)`: specific ones
    /// first, then the state's catch-alls, each in declaration order.
    pub fn candidates(&self, state: &str, kind_name: &str) -> impl Iterator<Item = &Transition> {
        let specific = self
            .transitions
            .get(&(state.to_string(), kind_name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let catch_all = self
            .catch_alls
            .get(state)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        specific.iter().chain(catch_all.iter())
    }

    /// Number of states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

/// Accumulates states and transitions, then validates.
#[derive(Default)]
pub struct StateChartBuilder {
    states: Vec<StateDef>,
    transitions: Vec<Transition>,
    initial: Option<String>,
}

impl StateChartBuilder {
    /// Adds a state.
    #[must_use]
    pub fn state(mut self, state: StateDef) -> Self {
        self.states.push(state);
        self
    }

    /// Adds a transition. Declaration order is guard evaluation order.
    #[must_use]
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Sets the initial state.
    #[must_use]
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Validates and builds the chart.
    ///
    /// # Errors
    ///
    /// Any [`ChartError`]; the first lint violation found is returned.
    pub fn build(self) -> Result<StateChart, ChartError> {
        if self.states.is_empty() {
            return Err(ChartError::Empty);
        }

        let mut states: HashMap<String, StateDef> = HashMap::new();
        for state in self.states {
            if states.contains_key(&state.name) {
                return Err(ChartError::DuplicateState(state.name));
            }
            for kind in &state.declared_events {
                if !EventKind::ALL_KIND_NAMES.contains(&kind.as_str()) {
                    return Err(ChartError::UnknownEventKind {
                        state: state.name.clone(),
                        kind: kind.clone(),
                    });
                }
            }
            states.insert(state.name.clone(), state);
        }

        let initial = self.initial.unwrap_or_default();
        if !states.contains_key(&initial) {
            return Err(ChartError::UnknownInitial(initial));
        }

        let mut transitions: HashMap<(String, String), Vec<Transition>> = HashMap::new();
        let mut catch_alls: HashMap<String, Vec<Transition>> = HashMap::new();
        for transition in self.transitions {
            for endpoint in [&transition.from, &transition.to] {
                if !states.contains_key(endpoint) {
                    return Err(ChartError::UnknownState {
                        from: transition.from.clone(),
                        to: transition.to.clone(),
                        unknown: endpoint.clone(),
                    });
                }
            }
            match &transition.trigger {
                Trigger::Kind(kind) => {
                    if !EventKind::ALL_KIND_NAMES.contains(&kind.as_str()) {
                        return Err(ChartError::UnknownEventKind {
                            state: transition.from.clone(),
                            kind: kind.clone(),
                        });
                    }
                    transitions
                        .entry((transition.from.clone(), kind.clone()))
                        .or_default()
                        .push(transition);
                }
                Trigger::Any => {
                    catch_alls
                        .entry(transition.from.clone())
                        .or_default()
                        .push(transition);
                }
            }
        }

        // Lints over the assembled tables.
        for state in states.values() {
            let has_specific = |kind: &str| {
                transitions.contains_key(&(state.name.clone(), kind.to_string()))
            };
            let has_catch_all = catch_alls.contains_key(&state.name);

            if state.timeout.is_some() && !has_specific("state_timeout") {
                return Err(ChartError::TimeoutWithoutTransition(state.name.clone()));
            }

            for kind in &state.declared_events {
                if !has_specific(kind) && !has_catch_all {
                    return Err(ChartError::UncoveredEvent {
                        state: state.name.clone(),
                        kind: kind.clone(),
                    });
                }
            }

            if state.is_error {
                let has_any_exit = has_catch_all
                    || transitions
                        .keys()
                        .any(|(from, _)| from == &state.name);
                if !has_any_exit {
                    return Err(ChartError::DeadEndErrorState(state.name.clone()));
                }
            }
        }

        debug!(
            states = states.len(),
            "state chart validated"
        );
        Ok(StateChart {
            states,
            transitions,
            catch_alls,
            initial,
        })
    }
}
