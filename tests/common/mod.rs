//! Shared helpers and collaborator fakes for the integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use revenant::providers::in_memory::InMemoryHistoryStore;
use revenant::{
    ContinuationScheduler, Engine, EventKind, HistoryEvent, HistoryStore, IdMinter,
    InvocationOutcome, InvocationStatus, ScheduleError, StoreError,
};
use tokio::sync::mpsc;

/// Mints the same id every time, so tests know it up front.
#[allow(dead_code)]
pub struct FixedIdMinter(pub String);

impl IdMinter for FixedIdMinter {
    fn mint(&self) -> String {
        self.0.clone()
    }
}

/// Records every continuation request and acknowledges it.
#[allow(dead_code)]
pub struct RecordingScheduler {
    pub calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ContinuationScheduler for RecordingScheduler {
    async fn continue_orchestration(&self, orchestration_id: &str) -> Result<(), ScheduleError> {
        self.calls.lock().unwrap().push(orchestration_id.to_string());
        Ok(())
    }
}

/// Rejects every continuation request.
#[allow(dead_code)]
pub struct FailingScheduler;

#[async_trait::async_trait]
impl ContinuationScheduler for FailingScheduler {
    async fn continue_orchestration(&self, _orchestration_id: &str) -> Result<(), ScheduleError> {
        Err(ScheduleError("scheduler unavailable".into()))
    }
}

/// In-memory store whose appends can be made to fail mid-test.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingAppendStore {
    pub inner: InMemoryHistoryStore,
    pub fail_appends: AtomicBool,
}

#[async_trait::async_trait]
impl HistoryStore for FailingAppendStore {
    async fn append_event(
        &self,
        orchestration_id: &str,
        event: HistoryEvent,
    ) -> Result<(), StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                operation: "append",
                message: "injected append failure".into(),
            });
        }
        self.inner.append_event(orchestration_id, event).await
    }

    async fn load_events(&self, orchestration_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        self.inner.load_events(orchestration_id).await
    }

    async fn list_orchestrations(&self) -> Vec<String> {
        self.inner.list_orchestrations().await
    }

    async fn reset(&self) {
        self.inner.reset().await
    }
}

/// Append a handcrafted history, numbering events sequentially.
#[allow(dead_code)]
pub async fn seed_history(store: &dyn HistoryStore, orchestration_id: &str, kinds: Vec<EventKind>) {
    for (i, kind) in kinds.into_iter().enumerate() {
        store
            .append_event(
                orchestration_id,
                HistoryEvent::new(orchestration_id, i as u64, kind),
            )
            .await
            .unwrap();
    }
}

/// Strip envelopes for kind-sequence comparisons.
#[allow(dead_code)]
pub fn kinds(history: &[HistoryEvent]) -> Vec<EventKind> {
    history.iter().map(|e| e.kind.clone()).collect()
}

/// Re-invoke the engine for every scheduled continuation until the
/// orchestration reports a terminal status. Returns the final outcome and
/// the number of resumes performed.
#[allow(dead_code)]
pub async fn pump_until_terminal(
    engine: &Arc<Engine>,
    rx: &mut mpsc::UnboundedReceiver<String>,
    mut outcome: InvocationOutcome,
) -> (InvocationOutcome, usize) {
    let mut resumes = 0;
    while matches!(outcome.status, InvocationStatus::Running { .. }) {
        let id = rx.recv().await.expect("scheduled continuation");
        outcome = engine.resume(&id).await.unwrap();
        resumes += 1;
    }
    (outcome, resumes)
}
