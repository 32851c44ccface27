//! Deterministic, replay-based durable execution core.
//!
//! Workflow routines written as ordinary sequential async code over
//! activity calls survive being restarted from scratch arbitrarily many
//! times: every completed activity is recorded in an append-only history
//! of `HistoryEvent`s, and each invocation re-runs the routine from the
//! beginning, substituting recorded outcomes for previously executed
//! calls. An invocation executes at most one new activity, then stops and
//! requests its own continuation, bounding each invocation's duration to
//! one activity's cost. The crate provides:
//!
//! - Public data model: [`HistoryEvent`], [`EventKind`]
//! - The single-assignment [`DeferredValue`] used to represent in-flight
//!   activity outcomes
//! - An [`OrchestrationContext`] with a positional activity-call table
//!   rebuilt from history before each invocation
//! - The [`Engine`] replay driver with injected [`HistoryStore`] and
//!   [`ContinuationScheduler`] collaborators
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub mod deferred;
pub mod errors;
pub mod futures;
pub mod logging;
pub mod providers;
pub mod runtime;
pub mod scheduler;

pub use deferred::{Chain, DeferredState, DeferredValue};
pub use errors::{CancellationSignal, EngineError, ProgrammingError, ScheduleError, StoreError};
pub use futures::ActivityFuture;
pub use providers::HistoryStore;
pub use runtime::registry::{ActivityRegistry, WorkflowRegistry};
pub use runtime::{
    Engine, IdMinter, InvocationOutcome, InvocationStatus, OrchestrationStatus, WorkflowHandler,
};
pub use scheduler::ContinuationScheduler;

// Internal JSON codec for typed I/O (kept private; the public API stays
// string-based like the event log itself).
pub(crate) mod codec {
    use serde::{de::DeserializeOwned, Serialize};
    use serde_json::Value;

    pub fn encode<T: Serialize>(v: &T) -> Result<String, String> {
        // A value that is already a JSON string is stored raw so that
        // string-typed and untyped call sites record identical history.
        match serde_json::to_value(v) {
            Ok(Value::String(s)) => Ok(s),
            Ok(val) => serde_json::to_string(&val).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String> {
        match serde_json::from_str::<T>(s) {
            Ok(v) => Ok(v),
            Err(_) => {
                // Fallback: treat the raw text as a JSON string value.
                let val = Value::String(s.to_string());
                serde_json::from_value(val).map_err(|e| e.to_string())
            }
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One entry of an orchestration's append-only history.
///
/// `event_id` is the zero-based append position and the total order of the
/// log; `timestamp_ms` is wall-clock at append time and is never consulted
/// during replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEvent {
    pub orchestration_id: String,
    pub event_id: u64,
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// Payload of a [`HistoryEvent`]. Activity events carry `activity_id`, the
/// zero-based sequence position of the call in program order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    /// Orchestration was created with a workflow name and input.
    OrchestrationStarted { name: String, input: String },
    /// Orchestration completed with a final output.
    OrchestrationCompleted { output: String },
    /// Orchestration failed with a final error.
    OrchestrationFailed { error: String },
    /// Orchestration was cancelled before reaching a result.
    OrchestrationCanceled { reason: String },
    /// The activity at this position was scheduled for execution.
    ActivityScheduled {
        activity_id: u64,
        name: String,
        input: String,
    },
    /// The activity at this position completed with a result.
    ActivityCompleted { activity_id: u64, result: String },
    /// The activity at this position failed with an error.
    ActivityFailed { activity_id: u64, error: String },
    /// The activity at this position was cancelled without executing.
    ActivityCanceled { activity_id: u64 },
}

impl HistoryEvent {
    pub fn new(orchestration_id: impl Into<String>, event_id: u64, kind: EventKind) -> Self {
        Self {
            orchestration_id: orchestration_id.into(),
            event_id,
            timestamp_ms: now_ms(),
            kind,
        }
    }

    /// Whether this event terminates the orchestration. Once one exists,
    /// no further `ActivityScheduled` may ever be appended for the id.
    pub fn is_orchestration_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::OrchestrationCompleted { .. }
                | EventKind::OrchestrationFailed { .. }
                | EventKind::OrchestrationCanceled { .. }
        )
    }

    /// The activity position this event belongs to, if it is an
    /// activity-kind event.
    pub fn activity_id(&self) -> Option<u64> {
        match self.kind {
            EventKind::ActivityScheduled { activity_id, .. }
            | EventKind::ActivityCompleted { activity_id, .. }
            | EventKind::ActivityFailed { activity_id, .. }
            | EventKind::ActivityCanceled { activity_id } => Some(activity_id),
            _ => None,
        }
    }
}

/// One position of the activity-call table: a call the routine has made
/// (or is about to make) at a given sequence index, with its eventual
/// outcome as a deferred value.
#[derive(Clone)]
pub struct ActivityCall {
    pub activity_id: u64,
    pub name: String,
    pub input: String,
    pub outcome: DeferredValue<String>,
}

/// A new step the routine requested that history does not cover yet.
/// `already_scheduled` marks the crash-recovery case: history holds the
/// schedule event but no terminal, so execution is retried without
/// appending a second schedule event.
#[derive(Debug, Clone)]
pub(crate) struct PendingCall {
    pub(crate) activity_id: u64,
    pub(crate) name: String,
    pub(crate) input: String,
    pub(crate) already_scheduled: bool,
}

pub(crate) struct CtxInner {
    pub(crate) orchestration_id: String,
    pub(crate) calls: Vec<ActivityCall>,
    pub(crate) cursor: usize,
    pub(crate) replaying: bool,
    pub(crate) pending_call: Option<PendingCall>,
    pub(crate) divergence: Option<ProgrammingError>,
}

/// Per-invocation workflow-facing context.
///
/// Constructed fresh from loaded history before each invocation; holds no
/// state across invocations; all durable state lives in the event log.
#[derive(Clone)]
pub struct OrchestrationContext {
    pub(crate) inner: Arc<Mutex<CtxInner>>,
}

impl OrchestrationContext {
    /// Rebuild the activity-call table from history: each
    /// `ActivityScheduled(i)` creates entry `i`, and the matching terminal
    /// event settles its deferred value before driving begins. An entry
    /// with no terminal stays pending; that position is the resume point.
    pub(crate) fn rebuild(
        orchestration_id: &str,
        history: &[HistoryEvent],
    ) -> Result<Self, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            orchestration_id: orchestration_id.to_string(),
            message,
        };
        let mut calls: Vec<ActivityCall> = Vec::new();
        for ev in history {
            match &ev.kind {
                EventKind::ActivityScheduled {
                    activity_id,
                    name,
                    input,
                } => {
                    if *activity_id as usize != calls.len() {
                        return Err(corrupt(format!(
                            "ActivityScheduled out of order: got {activity_id}, expected {}",
                            calls.len()
                        )));
                    }
                    calls.push(ActivityCall {
                        activity_id: *activity_id,
                        name: name.clone(),
                        input: input.clone(),
                        outcome: DeferredValue::new(),
                    });
                }
                EventKind::ActivityCompleted {
                    activity_id,
                    result,
                } => {
                    let call = calls.get(*activity_id as usize).ok_or_else(|| {
                        corrupt(format!("completion for unknown activity {activity_id}"))
                    })?;
                    call.outcome.fulfil(result.clone()).map_err(|_| {
                        corrupt(format!("duplicate terminal for activity {activity_id}"))
                    })?;
                }
                EventKind::ActivityFailed { activity_id, error } => {
                    let call = calls.get(*activity_id as usize).ok_or_else(|| {
                        corrupt(format!("failure for unknown activity {activity_id}"))
                    })?;
                    call.outcome.reject(error.clone()).map_err(|_| {
                        corrupt(format!("duplicate terminal for activity {activity_id}"))
                    })?;
                }
                EventKind::ActivityCanceled { activity_id } => {
                    let call = calls.get(*activity_id as usize).ok_or_else(|| {
                        corrupt(format!("cancel for unknown activity {activity_id}"))
                    })?;
                    call.outcome.cancel();
                }
                _ => {}
            }
        }
        let replaying = !calls.is_empty();
        Ok(Self {
            inner: Arc::new(Mutex::new(CtxInner {
                orchestration_id: orchestration_id.to_string(),
                calls,
                cursor: 0,
                replaying,
                pending_call: None,
                divergence: None,
            })),
        })
    }

    pub fn orchestration_id(&self) -> String {
        self.inner.lock().unwrap().orchestration_id.clone()
    }

    /// True while the routine is still inside recorded history. Flips to
    /// false the moment a call claims a position history does not cover.
    pub fn is_replaying(&self) -> bool {
        self.inner.lock().unwrap().replaying
    }

    /// Number of activity positions currently in the call table.
    pub fn recorded_calls(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    /// Schedule (or replay) the next activity call in program order.
    ///
    /// Activity identity is strictly positional: the i-th call the routine
    /// makes corresponds to `ActivityScheduled` event `i`. On replay the
    /// recorded name and input must match what the routine requests.
    pub fn call_activity(
        &self,
        name: impl Into<String>,
        input: impl Into<String>,
    ) -> ActivityFuture {
        ActivityFuture::new(self.clone(), name.into(), input.into())
    }

    /// Typed variant: serializes the input; pair with
    /// [`ActivityFuture::into_typed`] for the output.
    pub fn call_activity_typed<In: Serialize>(
        &self,
        name: impl Into<String>,
        input: &In,
    ) -> ActivityFuture {
        let payload = codec::encode(input).expect("encode");
        self.call_activity(name, payload)
    }

    pub(crate) fn take_pending_call(&self) -> Option<PendingCall> {
        self.inner.lock().unwrap().pending_call.take()
    }

    pub(crate) fn take_divergence(&self) -> Option<ProgrammingError> {
        self.inner.lock().unwrap().divergence.take()
    }

    /// Install the outcome of the one new step this invocation executed.
    /// For a crash-recovery retry the table entry already exists and only
    /// its deferred value is settled; otherwise a fresh settled entry is
    /// appended.
    pub(crate) fn apply_new_step(&self, call: &PendingCall, outcome: &Result<String, String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.replaying = false;
        if call.already_scheduled {
            let entry = &inner.calls[call.activity_id as usize];
            match outcome {
                Ok(v) => {
                    let _ = entry.outcome.fulfil(v.clone());
                }
                Err(e) => {
                    let _ = entry.outcome.reject(e.clone());
                }
            }
        } else {
            let settled = DeferredValue::new();
            match outcome {
                Ok(v) => {
                    let _ = settled.fulfil(v.clone());
                }
                Err(e) => {
                    let _ = settled.reject(e.clone());
                }
            }
            inner.calls.push(ActivityCall {
                activity_id: call.activity_id,
                name: call.name.clone(),
                input: call.input.clone(),
                outcome: settled,
            });
        }
    }
}
