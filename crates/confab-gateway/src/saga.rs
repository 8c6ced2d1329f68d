//! Saga compensation executor.
//!
//! Multi-step tool sequences with side effects cannot use ACID
//! transactions across external systems; instead each forward step may
//! declare a compensating invocation, and on failure the executor
//! semantically reverses what already ran.
//!
//! # Ordering
//!
//! Steps form a DAG via `depends_on` edges. Forward execution follows
//! a topological order; on failure after at least one success,
//! compensations run in **reverse dependency order** — every completed
//! step is compensated only after all completed steps that depend on
//! it. This is the topological reverse of the DAG, not call-stack
//! LIFO: with `C depends_on [A, B]`, C is always compensated before
//! either A or B regardless of execution interleaving.
//!
//! Compensations go through the same gateway pipeline (validation,
//! idempotency, retries) and must themselves be idempotent. A failed
//! compensation marks the saga `Unrecoverable` for manual operator
//! intervention; the executor never retries compensations beyond the
//! gateway's own bounded policy.

use crate::{CancelToken, Gateway, GatewayError, ToolInvocation};
use confab_types::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{error, info, warn};

/// One forward step of a saga.
#[derive(Debug, Clone)]
pub struct SagaStep {
    /// Step name, unique within the plan.
    pub id: String,
    /// Forward invocation.
    pub invocation: ToolInvocation,
    /// Compensating invocation, if the step's effect is reversible.
    pub compensation: Option<ToolInvocation>,
    /// Ids of steps that must complete before this one runs.
    pub depends_on: Vec<String>,
}

impl SagaStep {
    /// Creates a step with no dependencies or compensation.
    #[must_use]
    pub fn new(id: impl Into<String>, invocation: ToolInvocation) -> Self {
        Self {
            id: id.into(),
            invocation,
            compensation: None,
            depends_on: Vec::new(),
        }
    }

    /// Attaches a compensating invocation.
    #[must_use]
    pub fn compensated_by(mut self, compensation: ToolInvocation) -> Self {
        self.compensation = Some(compensation);
        self
    }

    /// Declares dependencies.
    #[must_use]
    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Plan construction failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// Two steps share an id.
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    /// A dependency references an unknown step.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// Step with the bad edge.
        step: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// The dependency graph has a cycle.
    #[error("dependency cycle involving steps: {0:?}")]
    Cycle(Vec<String>),
}

impl ErrorCode for SagaError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateStep(_) => "SAGA_DUPLICATE_STEP",
            Self::UnknownDependency { .. } => "SAGA_UNKNOWN_DEPENDENCY",
            Self::Cycle(_) => "SAGA_CYCLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A validated saga plan.
///
/// Construction proves the dependency graph is a DAG and fixes a
/// deterministic forward order (topological, declaration order among
/// ready steps).
#[derive(Debug, Clone)]
pub struct SagaPlan {
    steps: Vec<SagaStep>,
    forward_order: Vec<usize>,
}

impl SagaPlan {
    /// Validates steps into a plan.
    ///
    /// # Errors
    ///
    /// - [`SagaError::DuplicateStep`] on repeated ids
    /// - [`SagaError::UnknownDependency`] on edges to unknown steps
    /// - [`SagaError::Cycle`] when the graph is not a DAG
    pub fn new(steps: Vec<SagaStep>) -> Result<Self, SagaError> {
        let mut index_of: HashMap<&str, usize> = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index_of.insert(step.id.as_str(), i).is_some() {
                return Err(SagaError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &steps {
            for dep in &step.depends_on {
                if !index_of.contains_key(dep.as_str()) {
                    return Err(SagaError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm; declaration order among ready steps keeps
        // the schedule deterministic.
        let n = steps.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                let d = index_of[dep.as_str()];
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut forward_order = Vec::with_capacity(n);
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        while let Some(&next) = ready.iter().min() {
            ready.retain(|&i| i != next);
            forward_order.push(next);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        if forward_order.len() != n {
            let cyclic = (0..n)
                .filter(|i| !forward_order.contains(i))
                .map(|i| steps[i].id.clone())
                .collect();
            return Err(SagaError::Cycle(cyclic));
        }

        Ok(Self {
            steps,
            forward_order,
        })
    }

    /// The steps in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    /// Indices of steps in forward (topological) execution order.
    #[must_use]
    pub fn forward_order(&self) -> &[usize] {
        &self.forward_order
    }

    /// Orders the given completed steps for compensation: a step
    /// appears only after every completed step that depends on it.
    ///
    /// Deterministic: among ready steps, the latest-declared is
    /// compensated first.
    #[must_use]
    pub fn compensation_order(&self, completed: &HashSet<usize>) -> Vec<usize> {
        // Count, for each completed step, its completed dependents
        // that are not yet compensated.
        let mut pending_dependents: HashMap<usize, usize> = completed
            .iter()
            .map(|&i| (i, 0usize))
            .collect();
        for &i in completed {
            for dep in &self.steps[i].depends_on {
                let d = self
                    .steps
                    .iter()
                    .position(|s| &s.id == dep)
                    .expect("validated dependency");
                if let Some(count) = pending_dependents.get_mut(&d) {
                    *count += 1;
                }
            }
        }

        let mut order = Vec::with_capacity(completed.len());
        let mut ready: Vec<usize> = pending_dependents
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&i, _)| i)
            .collect();

        while let Some(&next) = ready.iter().max() {
            ready.retain(|&i| i != next);
            order.push(next);
            for dep in &self.steps[next].depends_on {
                let d = self
                    .steps
                    .iter()
                    .position(|s| &s.id == dep)
                    .expect("validated dependency");
                if let Some(count) = pending_dependents.get_mut(&d) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(d);
                    }
                }
            }
        }
        order
    }
}

/// Final status of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Forward invocation succeeded and was not compensated.
    Succeeded,
    /// Forward invocation failed; this failure aborted the saga.
    Failed,
    /// Never attempted because an earlier step failed.
    Skipped,
    /// Succeeded forward, then successfully compensated.
    Compensated,
    /// Succeeded forward, but its compensation failed.
    CompensationFailed,
}

/// Per-step outcome in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step id.
    pub id: String,
    /// Final status.
    pub status: StepStatus,
    /// The error that decided the status, if any.
    pub error: Option<GatewayError>,
}

/// Overall saga outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    /// All forward steps succeeded.
    Completed,
    /// A step failed and every completed step (possibly none) was
    /// compensated.
    Compensated,
    /// A compensation failed; operator intervention required.
    Unrecoverable,
}

/// Result of a saga run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaReport {
    /// Overall outcome.
    pub status: SagaStatus,
    /// Per-step outcomes, in declaration order.
    pub steps: Vec<StepReport>,
}

/// Runs saga plans through a gateway.
pub struct SagaExecutor<'a> {
    gateway: &'a Gateway,
}

impl<'a> SagaExecutor<'a> {
    /// Creates an executor over a gateway.
    #[must_use]
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    /// Executes the plan.
    ///
    /// Forward steps run sequentially in topological order with the
    /// caller's cancellation token. Compensations run with a
    /// non-cancellable token: once rollback starts, an interruption
    /// must not leave external systems half-reversed.
    pub async fn run(&self, plan: &SagaPlan, cancel: CancelToken) -> SagaReport {
        let n = plan.steps().len();
        let mut statuses: Vec<StepStatus> = vec![StepStatus::Skipped; n];
        let mut errors: Vec<Option<GatewayError>> = vec![None; n];
        let mut completed: HashSet<usize> = HashSet::new();
        let mut failure: Option<usize> = None;

        for &i in plan.forward_order() {
            let step = &plan.steps()[i];
            match self.gateway.invoke(&step.invocation, cancel.clone()).await {
                Ok(_) => {
                    statuses[i] = StepStatus::Succeeded;
                    completed.insert(i);
                }
                Err(err) => {
                    warn!(step = %step.id, code = err.code(), "saga step failed");
                    statuses[i] = StepStatus::Failed;
                    errors[i] = Some(err);
                    failure = Some(i);
                    break;
                }
            }
        }

        let status = match failure {
            None => SagaStatus::Completed,
            Some(_) if completed.is_empty() => SagaStatus::Compensated,
            Some(_) => {
                let mut unrecoverable = false;
                for i in plan.compensation_order(&completed) {
                    let step = &plan.steps()[i];
                    let Some(compensation) = &step.compensation else {
                        info!(step = %step.id, "no compensation declared, leaving as-is");
                        continue;
                    };
                    match self
                        .gateway
                        .invoke(compensation, CancelToken::never())
                        .await
                    {
                        Ok(_) => {
                            statuses[i] = StepStatus::Compensated;
                        }
                        Err(err) => {
                            error!(
                                step = %step.id,
                                code = err.code(),
                                "compensation failed, saga unrecoverable"
                            );
                            statuses[i] = StepStatus::CompensationFailed;
                            errors[i] = Some(err);
                            unrecoverable = true;
                        }
                    }
                }
                if unrecoverable {
                    SagaStatus::Unrecoverable
                } else {
                    SagaStatus::Compensated
                }
            }
        };

        SagaReport {
            status,
            steps: plan
                .steps()
                .iter()
                .enumerate()
                .map(|(i, step)| StepReport {
                    id: step.id.clone(),
                    status: statuses[i].clone(),
                    error: errors[i].clone(),
                })
                .collect(),
        }
    }
}
