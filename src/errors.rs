//! Error taxonomy for the replay core.
//!
//! Activity failures are not represented here: an activity that rejects is
//! recorded in history as `ActivityFailed` and surfaces inside the workflow
//! routine as an ordinary `Err(String)` at the call site, subject to the
//! routine's own recovery logic.

use thiserror::Error;

/// Violations of the engine's usage contract by workflow or host code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgrammingError {
    /// A deferred value was fulfilled or rejected a second time. The first
    /// outcome is left unchanged.
    #[error("deferred value already settled as {state}")]
    DoubleSettlement { state: &'static str },

    /// During replay the routine requested a different activity at a
    /// position than history recorded there. The routine is not
    /// deterministic with respect to its own history.
    #[error(
        "nondeterministic replay at activity {activity_id}: history recorded {recorded}, routine requested {requested}"
    )]
    ReplayDivergence {
        activity_id: u64,
        recorded: String,
        requested: String,
    },
}

/// Raised when routine code inspects a deferred value that has been
/// cancelled. The single voluntary unwind mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct CancellationSignal;

/// Failures reported by a [`HistoryStore`](crate::providers::HistoryStore).
///
/// Appends are per-event, so a failed append never partially writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("orchestration not found: {0}")]
    NotFound(String),

    #[error("{operation}: {message}")]
    Io {
        operation: &'static str,
        message: String,
    },

    #[error("serialization: {0}")]
    Serde(String),

    /// The stored event sequence violates a history invariant (gap in
    /// event ids, duplicate activity terminal, out-of-order schedule).
    #[error("corrupt history for {orchestration_id}: {message}")]
    Corrupt {
        orchestration_id: String,
        message: String,
    },

    #[error("history cap exceeded (cap={cap}, have={have})")]
    CapExceeded { cap: usize, have: usize },
}

/// Failure to schedule a continuation. The invocation that observed it
/// still reports `running`; the caller owns retry and alerting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("continuation scheduling failed: {0}")]
pub struct ScheduleError(pub String);

/// Umbrella error returned by engine entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Programming(#[from] ProgrammingError),

    #[error("unknown orchestration: {0}")]
    UnknownOrchestration(String),

    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// A second invocation of the same orchestration id was attempted
    /// while one is in flight. Invocations for one id must never overlap;
    /// this guard covers the in-process case only; cross-process
    /// serialization is the caller's contract.
    #[error("orchestration {0} is already running an invocation")]
    InvocationOverlap(String),

    /// The routine suspended on something other than an activity call, so
    /// no invocation could ever make progress on it.
    #[error("routine suspended on a non-durable future")]
    Stalled,
}
