//! Continuation scheduling: how an invocation, after one unit of progress,
//! causes the same orchestration id to be re-invoked later.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::errors::ScheduleError;

/// External collaborator that re-invokes an orchestration id.
///
/// Implementations must provide at-least-once eventual re-invocation. The
/// core never retries scheduling internally: a failure is surfaced on the
/// invocation outcome and the caller owns retry and alerting policy.
#[async_trait::async_trait]
pub trait ContinuationScheduler: Send + Sync {
    async fn continue_orchestration(&self, orchestration_id: &str) -> Result<(), ScheduleError>;
}

/// Channel-backed scheduler for in-process hosts and tests.
///
/// Each scheduled continuation is delivered to the receiver returned by
/// [`new`](Self::new); a host loop drains it and calls
/// [`Engine::resume`](crate::Engine::resume) for each id.
pub struct InProcessScheduler {
    tx: mpsc::UnboundedSender<String>,
}

impl InProcessScheduler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait::async_trait]
impl ContinuationScheduler for InProcessScheduler {
    async fn continue_orchestration(&self, orchestration_id: &str) -> Result<(), ScheduleError> {
        self.tx
            .send(orchestration_id.to_string())
            .map_err(|e| ScheduleError(format!("continuation channel closed: {e}")))
    }
}

/// Scheduler that acknowledges and drops every continuation. For callers
/// that drive progress themselves (e.g.
/// [`Engine::drive_to_completion`](crate::Engine::drive_to_completion)).
#[derive(Default)]
pub struct NoopScheduler;

#[async_trait::async_trait]
impl ContinuationScheduler for NoopScheduler {
    async fn continue_orchestration(&self, _orchestration_id: &str) -> Result<(), ScheduleError> {
        Ok(())
    }
}
