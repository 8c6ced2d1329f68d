//! SessionEngine — the single consumer.
//!
//! One engine per session. The engine owns the context, reads events
//! in sequence order, and is the only code that mutates session state.
//!
//! # Apply cycle
//!
//! ```text
//! recv(event)
//!   1. stale-timeout filter (generation check)
//!   2. interruption controller observes (may enqueue barge_in)
//!   3. guard evaluation in declaration order, first match wins
//!      └─ no match → logged no-op, never an error
//!   4. exit actions → transition actions → entry actions
//!   5. schedule the new state's timeout (fresh generation)
//!   6. checkpoint (conditional write on sequence number)
//!   7. synthetic events to the queue tail
//!   8. background tool dispatch; completion re-enters as events
//! ```
//!
//! The engine never blocks on external I/O: tool invocations run in
//! spawned tasks and come back as `tool_completed` / `tool_failed`
//! events; timers come back as `state_timeout` events.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::EngineSettings;
use crate::engine::EngineError;
use crate::interrupt::InterruptionController;
use crate::machine::{ActionEffects, Context, StateChart};
use confab_event::observe::{NullSink, ObservabilitySink, ObservationRecord, TransitionRecord};
use confab_event::{Event, EventKind, EventQueue, EventSender, ToolCall};
use confab_gateway::{CancelHandle, Gateway, ToolInvocation};
use confab_types::{ErrorCode, EventSource, InvocationId, SequenceNumber, TraceId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// No transition matched; state and context are unchanged.
    NoOp,
    /// A transition fired.
    Transitioned {
        /// State before.
        from: String,
        /// State after.
        to: String,
    },
    /// The session terminated; the final checkpoint is written.
    SessionEnded,
}

/// The per-session orchestration engine.
pub struct SessionEngine<S: CheckpointStore> {
    chart: Arc<StateChart>,
    context: Context,
    current: String,
    queue: EventQueue,
    sender: EventSender,
    store: S,
    gateway: Arc<Gateway>,
    interrupts: InterruptionController,
    sink: Arc<dyn ObservabilitySink>,
    /// Bumped on every transition; stale `state_timeout` events carry
    /// an older generation and are dropped.
    timeout_generation: u64,
    /// Cancellation handles for in-flight invocations.
    pending_cancels: HashMap<InvocationId, CancelHandle>,
}

impl<S: CheckpointStore> SessionEngine<S> {
    /// Creates an engine for a fresh session.
    ///
    /// Returns the engine and the producer handle for its queue.
    #[must_use]
    pub fn new(
        chart: Arc<StateChart>,
        context: Context,
        store: S,
        gateway: Arc<Gateway>,
        settings: &EngineSettings,
    ) -> (Self, EventSender) {
        let (queue, sender) = EventQueue::with_warn_depth(settings.queue_warn_depth);
        let current = chart.initial().to_string();
        let engine = Self {
            chart,
            context,
            current,
            queue,
            sender: sender.clone(),
            store,
            gateway,
            interrupts: InterruptionController::new(settings.interrupt_settings()),
            sink: Arc::new(NullSink),
            timeout_generation: 0,
            pending_cancels: HashMap::new(),
        };
        (engine, sender)
    }

    /// Resumes a session from its latest checkpoint.
    ///
    /// The restored context, state, and sequence numbering continue
    /// exactly where the checkpoint left off; pending tool invocations
    /// are re-dispatched under their original idempotency keys when
    /// [`run`](Self::run) starts, so completed work is never re-run.
    ///
    /// # Errors
    ///
    /// - [`CheckpointError::NotFound`](crate::checkpoint::CheckpointError::NotFound)
    ///   when the session never checkpointed
    /// - [`EngineError::UnknownState`] when the checkpointed state is
    ///   not in the chart
    pub async fn resume(
        chart: Arc<StateChart>,
        store: S,
        gateway: Arc<Gateway>,
        settings: &EngineSettings,
        session_id: confab_types::SessionId,
    ) -> Result<(Self, EventSender), EngineError> {
        let checkpoint = store.latest(session_id).await?;
        let current = checkpoint.state_path.leaf().to_string();
        if chart.state(&current).is_none() {
            return Err(EngineError::UnknownState(current));
        }

        let (queue, sender) =
            EventQueue::resume_from(checkpoint.sequence_number, settings.queue_warn_depth);
        info!(
            %session_id,
            state = %current,
            seq = %checkpoint.sequence_number,
            "session resumed from checkpoint"
        );

        let engine = Self {
            chart,
            context: checkpoint.context,
            current,
            queue,
            sender: sender.clone(),
            store,
            gateway,
            interrupts: InterruptionController::new(settings.interrupt_settings()),
            sink: Arc::new(NullSink),
            timeout_generation: 0,
            pending_cancels: HashMap::new(),
        };
        Ok((engine, sender))
    }

    /// Attaches an observability sink (builder pattern).
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Current state name.
    #[must_use]
    pub fn current_state(&self) -> &str {
        &self.current
    }

    /// Read-only view of the context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Suppressed-interrupt metric.
    #[must_use]
    pub fn suppressed_interrupts(&self) -> u64 {
        self.interrupts.suppressed_interrupts()
    }

    /// Runs the consumer loop until the session ends or every
    /// producer handle is dropped.
    ///
    /// # Errors
    ///
    /// [`EngineError`] when the session cannot make progress
    /// (checkpoint persistence failure, broken state invariant).
    pub async fn run(&mut self) -> Result<(), EngineError> {
        info!(session_id = %self.context.session_id, state = %self.current, "engine started");

        // After a resume, requested-but-unsettled invocations are
        // re-dispatched under their stored keys; the idempotency table
        // replays any that already completed.
        let pending: Vec<ToolCall> = self.context.pending_invocations.clone();
        for call in pending {
            self.dispatch_tool(call, TraceId::new());
        }

        while let Some(event) = self.queue.recv().await {
            if self.apply(event).await? == TransitionOutcome::SessionEnded {
                break;
            }
        }

        self.cancel_pending_invocations();
        info!(session_id = %self.context.session_id, "engine stopped");
        Ok(())
    }

    /// Applies one event.
    ///
    /// Events must have been stamped by this session's queue; the
    /// checkpoint's conditional write rejects replays of already
    /// processed sequence numbers.
    ///
    /// # Errors
    ///
    /// [`EngineError`] on checkpoint failure or a broken state
    /// invariant. Unmatched events are no-ops, not errors.
    pub async fn apply(&mut self, event: Event) -> Result<TransitionOutcome, EngineError> {
        let started = Instant::now();

        // Stale timers from states already left are no-ops.
        if let EventKind::StateTimeout { state, generation } = &event.kind {
            if *generation != self.timeout_generation || state != &self.current {
                debug!(%state, generation, "stale state_timeout dropped");
                return Ok(TransitionOutcome::NoOp);
            }
        }

        // Settled invocations no longer need their cancel handles.
        if let EventKind::ToolCompleted { invocation_id, .. }
        | EventKind::ToolFailed { invocation_id, .. } = &event.kind
        {
            self.pending_cancels.remove(invocation_id);
        }

        let state_def = self
            .chart
            .state(&self.current)
            .ok_or_else(|| EngineError::UnknownState(self.current.clone()))?;

        // Barge-in detection happens before transition lookup so the
        // synthetic event lands at the queue tail in order.
        if let Some(kind) = self.interrupts.observe(&event, state_def.interruptible) {
            self.emit_synthetic(kind, event.trace_id);
        }

        let winner = self
            .chart
            .candidates(&self.current, event.kind_name())
            .find(|t| t.guard_passes(&self.context, &event))
            .cloned();

        let Some(transition) = winner else {
            debug!(
                state = %self.current,
                kind = event.kind_name(),
                seq = %event.seq,
                "no transition matched, event discarded"
            );
            let current = self.current.clone();
            self.record_transition(&event, &current, None, started);
            return Ok(TransitionOutcome::NoOp);
        };

        let from = self.current.clone();
        let to_def = self
            .chart
            .state(&transition.to)
            .ok_or_else(|| EngineError::UnknownState(transition.to.clone()))?
            .clone();

        // Exit actions of the old state, the transition's own actions,
        // then entry actions of the new state.
        let mut effects = ActionEffects::default();
        for action in &state_def.exit_actions.clone() {
            action.apply(&mut self.context, &event, &mut effects);
        }
        for action in &transition.actions {
            action.apply(&mut self.context, &event, &mut effects);
        }
        for action in &to_def.entry_actions {
            action.apply(&mut self.context, &event, &mut effects);
        }

        // Accepted tool lifecycle events maintain the pending list, so
        // a checkpoint always knows exactly what is in flight.
        match &event.kind {
            EventKind::ToolRequested { call } => {
                let known = self
                    .context
                    .pending_invocations
                    .iter()
                    .any(|c| c.invocation_id == call.invocation_id);
                if !known {
                    self.context.pending_invocations.push(call.clone());
                }
            }
            EventKind::ToolCompleted { invocation_id, .. }
            | EventKind::ToolFailed { invocation_id, .. } => {
                self.context.settle_invocation(*invocation_id);
            }
            _ => {}
        }

        self.current = transition.to.clone();

        // Fresh generation invalidates timers from the state we left.
        self.timeout_generation += 1;
        if let Some(timeout) = to_def.timeout {
            self.schedule_timeout(timeout, event.trace_id);
        }

        // Write-through checkpoint before any effect leaves the
        // engine: the latest checkpoint must always cover this
        // transition.
        self.write_checkpoint(event.seq).await?;

        if effects.cancel_pending {
            self.cancel_pending_invocations();
        }
        for kind in effects.emitted {
            self.emit_synthetic(kind, event.trace_id);
        }

        // A consumed tool request is dispatched once its transition is
        // accepted; the completion re-enters the queue as an event.
        if let EventKind::ToolRequested { call } = &event.kind {
            self.dispatch_tool(call.clone(), event.trace_id);
        }

        let to = self.current.clone();
        self.record_transition(&event, &from, Some(to.as_str()), started);

        if effects.end_session {
            info!(session_id = %self.context.session_id, "session ended");
            self.cancel_pending_invocations();
            return Ok(TransitionOutcome::SessionEnded);
        }

        Ok(TransitionOutcome::Transitioned {
            from,
            to: self.current.clone(),
        })
    }

    /// Writes the post-transition checkpoint.
    async fn write_checkpoint(&mut self, seq: SequenceNumber) -> Result<(), EngineError> {
        let state_def = self
            .chart
            .state(&self.current)
            .ok_or_else(|| EngineError::UnknownState(self.current.clone()))?;
        let checkpoint = Checkpoint {
            session_id: self.context.session_id,
            state_path: state_def.path(),
            context: self.context.clone(),
            sequence_number: seq,
            created_at_ms: chrono::Utc::now().timestamp_millis() as u64,
        };
        self.store.put(&checkpoint).await?;
        debug!(seq = %seq, state = %self.current, "checkpoint written");
        Ok(())
    }

    /// Schedules a `state_timeout` event for the current state.
    fn schedule_timeout(&self, timeout: std::time::Duration, trace_id: TraceId) {
        let sender = self.sender.clone();
        let state = self.current.clone();
        let generation = self.timeout_generation;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let kind = EventKind::StateTimeout { state, generation };
            // A closed queue means the session already ended.
            let _ = sender.enqueue(Event::new(kind, EventSource::Timer, trace_id));
        });
    }

    /// Appends a synthetic event to the queue tail.
    fn emit_synthetic(&self, kind: EventKind, trace_id: TraceId) {
        let event = Event::new(kind, EventSource::Engine, trace_id);
        if self.sender.enqueue(event).is_err() {
            warn!("queue closed while emitting synthetic event");
        }
    }

    /// Dispatches one tool call to the gateway in the background.
    fn dispatch_tool(&mut self, call: ToolCall, trace_id: TraceId) {
        let invocation = ToolInvocation::from_call(
            call,
            self.context.session_id,
            self.context.tenant_id,
            trace_id,
            self.context.granted,
        );
        let invocation_id = invocation.invocation_id;

        let (handle, token) = CancelHandle::new();
        self.pending_cancels.insert(invocation_id, handle);

        let gateway = Arc::clone(&self.gateway);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let kind = match gateway.invoke(&invocation, token).await {
                Ok(outcome) => EventKind::ToolCompleted {
                    invocation_id,
                    result: outcome.result,
                },
                Err(err) => EventKind::ToolFailed {
                    invocation_id,
                    error_code: err.code().to_string(),
                    message: err.to_string(),
                    terminal: !err.correctable(),
                },
            };
            let _ = sender.enqueue(Event::new(kind, EventSource::Tool, trace_id));
        });
    }

    /// Signals cancellation to every in-flight invocation.
    ///
    /// Tools registered with `cancel_on_interruption: false` ignore
    /// the signal inside the gateway and run to completion.
    fn cancel_pending_invocations(&mut self) {
        for (id, handle) in &self.pending_cancels {
            debug!(invocation_id = %id, "cancelling in-flight invocation");
            handle.cancel();
        }
    }

    fn record_transition(&self, event: &Event, from: &str, to: Option<&str>, started: Instant) {
        self.sink
            .record(ObservationRecord::Transition(TransitionRecord {
                trace_id: event.trace_id,
                session_id: self.context.session_id,
                state_from: from.to_string(),
                state_to: to.unwrap_or(from).to_string(),
                event_kind: event.kind_name().to_string(),
                guard_result: to.is_some(),
                latency_ms: started.elapsed().as_millis() as u64,
            }));
    }
}
