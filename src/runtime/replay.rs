//! The per-invocation replay driver.
//!
//! One invocation is one pass of the state machine
//! Loading → Replaying → {Executing-one-new-step | Completed | Failed}:
//! the routine is driven serially with a no-op waker; positions covered by
//! history resolve from the call table with no side effects, the first
//! uncovered position is executed (exactly once per invocation) and the
//! routine is re-polled so the step's immediate continuations run. If it
//! is still suspended after that, the invocation reports `running` and the
//! engine requests a continuation.

use std::sync::Arc;
use std::task::Poll;

use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::futures::poll_once;
use crate::providers::HistoryStore;
use crate::runtime::registry::ActivityRegistry;
use crate::runtime::WorkflowHandler;
use crate::{EventKind, HistoryEvent, OrchestrationContext};

/// What a single invocation concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DriveOutcome {
    Completed { output: String },
    Failed { error: String },
    Running { last_result: Option<String> },
}

pub(crate) async fn drive_invocation(
    store: &dyn HistoryStore,
    activities: &ActivityRegistry,
    ctx: &OrchestrationContext,
    handler: Arc<dyn WorkflowHandler>,
    input: String,
    mut next_event_id: u64,
) -> Result<DriveOutcome, EngineError> {
    let orchestration_id = ctx.orchestration_id();
    let mut routine = handler.invoke(ctx.clone(), input);
    let mut step_taken = false;
    let mut last_result: Option<String> = None;

    loop {
        match poll_once(&mut routine) {
            Poll::Ready(Ok(output)) => {
                store
                    .append_event(
                        &orchestration_id,
                        HistoryEvent::new(
                            &orchestration_id,
                            next_event_id,
                            EventKind::OrchestrationCompleted {
                                output: output.clone(),
                            },
                        ),
                    )
                    .await?;
                debug!(%orchestration_id, "orchestration completed");
                return Ok(DriveOutcome::Completed { output });
            }
            Poll::Ready(Err(error)) => {
                store
                    .append_event(
                        &orchestration_id,
                        HistoryEvent::new(
                            &orchestration_id,
                            next_event_id,
                            EventKind::OrchestrationFailed {
                                error: error.clone(),
                            },
                        ),
                    )
                    .await?;
                debug!(%orchestration_id, %error, "orchestration failed");
                return Ok(DriveOutcome::Failed { error });
            }
            Poll::Pending => {
                if let Some(divergence) = ctx.take_divergence() {
                    // The routine is not deterministic against its own
                    // history; terminalize the log so later invocations do
                    // not replay into the same wall.
                    let error = divergence.to_string();
                    warn!(%orchestration_id, %error, "replay divergence");
                    store
                        .append_event(
                            &orchestration_id,
                            HistoryEvent::new(
                                &orchestration_id,
                                next_event_id,
                                EventKind::OrchestrationFailed {
                                    error: error.clone(),
                                },
                            ),
                        )
                        .await?;
                    return Ok(DriveOutcome::Failed { error });
                }
                if step_taken {
                    // One new step per invocation: stop here and let the
                    // continuation pick up the next one.
                    return Ok(DriveOutcome::Running { last_result });
                }
                let call = ctx.take_pending_call().ok_or(EngineError::Stalled)?;

                if !call.already_scheduled {
                    store
                        .append_event(
                            &orchestration_id,
                            HistoryEvent::new(
                                &orchestration_id,
                                next_event_id,
                                EventKind::ActivityScheduled {
                                    activity_id: call.activity_id,
                                    name: call.name.clone(),
                                    input: call.input.clone(),
                                },
                            ),
                        )
                        .await?;
                    next_event_id += 1;
                } else {
                    debug!(
                        %orchestration_id,
                        activity_id = call.activity_id,
                        "retrying activity scheduled by a crashed invocation"
                    );
                }

                debug!(
                    %orchestration_id,
                    activity_id = call.activity_id,
                    name = %call.name,
                    "executing activity"
                );
                let outcome = match activities.get(&call.name) {
                    Some(activity) => activity.invoke(call.input.clone()).await,
                    None => Err(format!("unregistered:{}", call.name)),
                };

                let terminal = match &outcome {
                    Ok(result) => EventKind::ActivityCompleted {
                        activity_id: call.activity_id,
                        result: result.clone(),
                    },
                    Err(error) => EventKind::ActivityFailed {
                        activity_id: call.activity_id,
                        error: error.clone(),
                    },
                };
                store
                    .append_event(
                        &orchestration_id,
                        HistoryEvent::new(&orchestration_id, next_event_id, terminal),
                    )
                    .await?;
                next_event_id += 1;

                ctx.apply_new_step(&call, &outcome);
                last_result = outcome.ok();
                step_taken = true;
            }
        }
    }
}
