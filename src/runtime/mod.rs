//! The engine: invocation entry points over injected collaborators.
//!
//! All durable state lives in the history store; the engine itself keeps
//! only an in-process guard against overlapping invocations of one id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::{EngineError, StoreError};
use crate::providers::HistoryStore;
use crate::scheduler::ContinuationScheduler;
use crate::{EventKind, HistoryEvent, OrchestrationContext};

pub mod registry;
pub(crate) mod replay;

pub use registry::{ActivityRegistry, WorkflowRegistry};

use replay::DriveOutcome;

/// Trait implemented by workflow routines the engine can drive.
///
/// A routine must be deterministic given identical history: no unrecorded
/// randomness, no unrecorded wall-clock reads between calls, no dependence
/// on invocation-local state.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn invoke(&self, ctx: OrchestrationContext, input: String) -> Result<String, String>;
}

/// External collaborator that mints unique orchestration ids.
pub trait IdMinter: Send + Sync {
    fn mint(&self) -> String;
}

/// Default id minter: random v4 UUIDs.
pub struct UuidIdMinter;

impl IdMinter for UuidIdMinter {
    fn mint(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// High-level orchestration status derived from history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationStatus {
    NotFound,
    Running,
    Completed { output: String },
    Failed { error: String },
    Canceled { reason: String },
}

/// What one invocation reports. Never hangs: every invocation concludes
/// as exactly one of running, complete, or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationStatus {
    /// One new step was taken and the routine is not finished; a
    /// continuation was requested. `result` carries that step's result
    /// when the activity succeeded.
    Running { result: Option<String> },
    Complete { output: String },
    Failed { error: String },
}

/// Result of [`Engine::start`] / [`Engine::resume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub orchestration_id: String,
    pub status: InvocationStatus,
    /// Set when the status is `Running` but requesting the continuation
    /// failed: progress stalls until the caller re-triggers it.
    pub schedule_failure: Option<String>,
}

/// Replay engine over injected collaborator handles.
pub struct Engine {
    store: Arc<dyn HistoryStore>,
    scheduler: Arc<dyn ContinuationScheduler>,
    activities: Arc<ActivityRegistry>,
    workflows: WorkflowRegistry,
    id_minter: Arc<dyn IdMinter>,
    active: Mutex<HashSet<String>>,
}

/// Releases the per-id invocation slot when an invocation ends, even on an
/// early return.
struct ActiveGuard<'a> {
    engine: &'a Engine,
    orchestration_id: String,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .active
            .lock()
            .unwrap()
            .remove(&self.orchestration_id);
    }
}

impl Engine {
    /// Create an engine over the given collaborators, minting ids with
    /// random UUIDs. Installs a default tracing subscriber if none is set.
    pub fn new(
        store: Arc<dyn HistoryStore>,
        scheduler: Arc<dyn ContinuationScheduler>,
        activities: Arc<ActivityRegistry>,
        workflows: WorkflowRegistry,
    ) -> Arc<Self> {
        Self::with_id_minter(store, scheduler, activities, workflows, Arc::new(UuidIdMinter))
    }

    /// Same as [`new`](Self::new) with an explicit id minter (tests
    /// substitute a deterministic one).
    pub fn with_id_minter(
        store: Arc<dyn HistoryStore>,
        scheduler: Arc<dyn ContinuationScheduler>,
        activities: Arc<ActivityRegistry>,
        workflows: WorkflowRegistry,
        id_minter: Arc<dyn IdMinter>,
    ) -> Arc<Self> {
        crate::logging::init();
        Arc::new(Self {
            store,
            scheduler,
            activities,
            workflows,
            id_minter,
            active: Mutex::new(HashSet::new()),
        })
    }

    /// Start a new orchestration: mint an id, append
    /// `OrchestrationStarted`, and run the first invocation.
    pub async fn start(
        &self,
        workflow: &str,
        input: impl Into<String>,
    ) -> Result<InvocationOutcome, EngineError> {
        if self.workflows.get(workflow).is_none() {
            return Err(EngineError::UnknownWorkflow(workflow.to_string()));
        }
        let orchestration_id = self.id_minter.mint();
        let input = input.into();
        info!(%orchestration_id, workflow, "starting orchestration");
        self.store
            .append_event(
                &orchestration_id,
                HistoryEvent::new(
                    &orchestration_id,
                    0,
                    EventKind::OrchestrationStarted {
                        name: workflow.to_string(),
                        input,
                    },
                ),
            )
            .await?;
        self.run_invocation(&orchestration_id).await
    }

    /// Resume an existing orchestration by id: replay recorded steps,
    /// execute at most one new one.
    pub async fn resume(
        &self,
        orchestration_id: &str,
    ) -> Result<InvocationOutcome, EngineError> {
        self.run_invocation(orchestration_id).await
    }

    async fn run_invocation(
        &self,
        orchestration_id: &str,
    ) -> Result<InvocationOutcome, EngineError> {
        {
            let mut active = self.active.lock().unwrap();
            if !active.insert(orchestration_id.to_string()) {
                return Err(EngineError::InvocationOverlap(orchestration_id.to_string()));
            }
        }
        let _guard = ActiveGuard {
            engine: self,
            orchestration_id: orchestration_id.to_string(),
        };
        self.run_invocation_inner(orchestration_id).await
    }

    async fn run_invocation_inner(
        &self,
        orchestration_id: &str,
    ) -> Result<InvocationOutcome, EngineError> {
        let history = self.store.load_events(orchestration_id).await?;
        if history.is_empty() {
            return Err(EngineError::UnknownOrchestration(
                orchestration_id.to_string(),
            ));
        }

        // Completion monotonicity: a terminal log never drives again.
        for ev in history.iter().rev() {
            match &ev.kind {
                EventKind::OrchestrationCompleted { output } => {
                    return Ok(InvocationOutcome {
                        orchestration_id: orchestration_id.to_string(),
                        status: InvocationStatus::Complete {
                            output: output.clone(),
                        },
                        schedule_failure: None,
                    });
                }
                EventKind::OrchestrationFailed { error } => {
                    return Ok(InvocationOutcome {
                        orchestration_id: orchestration_id.to_string(),
                        status: InvocationStatus::Failed {
                            error: error.clone(),
                        },
                        schedule_failure: None,
                    });
                }
                EventKind::OrchestrationCanceled { reason } => {
                    return Ok(InvocationOutcome {
                        orchestration_id: orchestration_id.to_string(),
                        status: InvocationStatus::Failed {
                            error: format!("canceled: {reason}"),
                        },
                        schedule_failure: None,
                    });
                }
                _ => {}
            }
        }

        let (name, input) = history
            .iter()
            .find_map(|e| match &e.kind {
                EventKind::OrchestrationStarted { name, input } => {
                    Some((name.clone(), input.clone()))
                }
                _ => None,
            })
            .ok_or_else(|| StoreError::Corrupt {
                orchestration_id: orchestration_id.to_string(),
                message: "missing OrchestrationStarted".into(),
            })?;
        let handler = self
            .workflows
            .get(&name)
            .ok_or_else(|| EngineError::UnknownWorkflow(name.clone()))?;

        let ctx = OrchestrationContext::rebuild(orchestration_id, &history)?;
        let next_event_id = history.len() as u64;
        let outcome = replay::drive_invocation(
            self.store.as_ref(),
            &self.activities,
            &ctx,
            handler,
            input,
            next_event_id,
        )
        .await?;

        match outcome {
            DriveOutcome::Completed { output } => Ok(InvocationOutcome {
                orchestration_id: orchestration_id.to_string(),
                status: InvocationStatus::Complete { output },
                schedule_failure: None,
            }),
            DriveOutcome::Failed { error } => Ok(InvocationOutcome {
                orchestration_id: orchestration_id.to_string(),
                status: InvocationStatus::Failed { error },
                schedule_failure: None,
            }),
            DriveOutcome::Running { last_result } => {
                let schedule_failure = match self
                    .scheduler
                    .continue_orchestration(orchestration_id)
                    .await
                {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(orchestration_id, error = %e, "continuation scheduling failed");
                        Some(e.to_string())
                    }
                };
                Ok(InvocationOutcome {
                    orchestration_id: orchestration_id.to_string(),
                    status: InvocationStatus::Running {
                        result: last_result,
                    },
                    schedule_failure,
                })
            }
        }
    }

    /// Derive the orchestration's status from its history.
    pub async fn status(&self, orchestration_id: &str) -> OrchestrationStatus {
        let history = match self.store.load_events(orchestration_id).await {
            Ok(h) => h,
            Err(_) => return OrchestrationStatus::NotFound,
        };
        if history.is_empty() {
            return OrchestrationStatus::NotFound;
        }
        for ev in history.iter().rev() {
            match &ev.kind {
                EventKind::OrchestrationCompleted { output } => {
                    return OrchestrationStatus::Completed {
                        output: output.clone(),
                    }
                }
                EventKind::OrchestrationFailed { error } => {
                    return OrchestrationStatus::Failed {
                        error: error.clone(),
                    }
                }
                EventKind::OrchestrationCanceled { reason } => {
                    return OrchestrationStatus::Canceled {
                        reason: reason.clone(),
                    }
                }
                _ => {}
            }
        }
        OrchestrationStatus::Running
    }

    /// Cancel an orchestration that has not reached a terminal event:
    /// settle every scheduled-but-open activity index with
    /// `ActivityCanceled`, then append `OrchestrationCanceled`. A no-op on
    /// an already-terminal log.
    pub async fn cancel(
        &self,
        orchestration_id: &str,
        reason: impl Into<String>,
    ) -> Result<(), EngineError> {
        let reason = reason.into();
        let history = self.store.load_events(orchestration_id).await?;
        if history.is_empty() {
            return Err(EngineError::UnknownOrchestration(
                orchestration_id.to_string(),
            ));
        }
        if history.iter().any(|e| e.is_orchestration_terminal()) {
            return Ok(());
        }

        let mut settled: HashSet<u64> = HashSet::new();
        let mut scheduled: Vec<u64> = Vec::new();
        for ev in &history {
            match ev.kind {
                EventKind::ActivityScheduled { activity_id, .. } => scheduled.push(activity_id),
                EventKind::ActivityCompleted { activity_id, .. }
                | EventKind::ActivityFailed { activity_id, .. }
                | EventKind::ActivityCanceled { activity_id } => {
                    settled.insert(activity_id);
                }
                _ => {}
            }
        }

        let mut next_event_id = history.len() as u64;
        for activity_id in scheduled {
            if !settled.contains(&activity_id) {
                self.store
                    .append_event(
                        orchestration_id,
                        HistoryEvent::new(
                            orchestration_id,
                            next_event_id,
                            EventKind::ActivityCanceled { activity_id },
                        ),
                    )
                    .await?;
                next_event_id += 1;
            }
        }
        self.store
            .append_event(
                orchestration_id,
                HistoryEvent::new(
                    orchestration_id,
                    next_event_id,
                    EventKind::OrchestrationCanceled {
                        reason: reason.clone(),
                    },
                ),
            )
            .await?;
        info!(orchestration_id, %reason, "orchestration cancelled");
        Ok(())
    }

    /// Drive an orchestration from start to a terminal status by invoking
    /// it repeatedly in-process. For samples and tests; production hosts
    /// run one invocation per trigger and rely on the scheduler.
    pub async fn drive_to_completion(
        &self,
        workflow: &str,
        input: impl Into<String>,
    ) -> Result<InvocationOutcome, EngineError> {
        let mut outcome = self.start(workflow, input).await?;
        while matches!(outcome.status, InvocationStatus::Running { .. }) {
            outcome = self.resume(&outcome.orchestration_id).await?;
        }
        Ok(outcome)
    }
}
