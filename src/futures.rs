//! The activity-call suspension point and the machinery that drives the
//! workflow routine one cooperative poll at a time.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use serde::de::DeserializeOwned;

use crate::errors::{CancellationSignal, ProgrammingError};
use crate::{OrchestrationContext, PendingCall};

/// Future returned by [`OrchestrationContext::call_activity`].
///
/// On first poll it claims the next cursor position, exactly once. A
/// position inside recorded history replays without side effects: the
/// recorded name and input are verified and the already-settled outcome is
/// handed back unmodified. The first position past recorded history files
/// a pending-call request with the driver and suspends; the driver
/// executes it (at most one per invocation), settles the table entry and
/// re-polls, at which point this future resolves.
pub struct ActivityFuture {
    name: String,
    input: String,
    claimed: Cell<Option<u64>>,
    ctx: OrchestrationContext,
}

impl ActivityFuture {
    pub(crate) fn new(ctx: OrchestrationContext, name: String, input: String) -> Self {
        Self {
            name,
            input,
            claimed: Cell::new(None),
            ctx,
        }
    }

    /// Await the activity result decoded to a typed value.
    pub fn into_typed<Out: DeserializeOwned>(self) -> impl Future<Output = Result<Out, String>> {
        async move {
            let raw = self.await?;
            crate::codec::decode::<Out>(&raw)
        }
    }
}

impl Future for ActivityFuture {
    type Output = Result<String, String>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut inner = this.ctx.inner.lock().unwrap();

        if this.claimed.get().is_none() {
            let pos = inner.cursor as u64;
            inner.cursor += 1;
            this.claimed.set(Some(pos));
        }
        let pos = this.claimed.get().unwrap();

        if (pos as usize) < inner.calls.len() {
            let (recorded_name, recorded_input, outcome) = {
                let call = &inner.calls[pos as usize];
                (call.name.clone(), call.input.clone(), call.outcome.clone())
            };
            if recorded_name != this.name || recorded_input != this.input {
                let err = ProgrammingError::ReplayDivergence {
                    activity_id: pos,
                    recorded: format!("{recorded_name}({recorded_input})"),
                    requested: format!("{}({})", this.name, this.input),
                };
                // Recorded into the context and surfaced by the driver;
                // the routine itself is never resumed past this point.
                if inner.divergence.is_none() {
                    inner.divergence = Some(err);
                }
                return Poll::Pending;
            }
            if outcome.is_cancelled() {
                return Poll::Ready(Err(CancellationSignal.to_string()));
            }
            match outcome.try_outcome() {
                Some(outcome) => Poll::Ready(outcome),
                None => {
                    // Scheduled but never terminated: a previous invocation
                    // crashed mid-activity. Retry it as this invocation's
                    // one step, without a second schedule event.
                    inner.replaying = false;
                    if inner.pending_call.is_none() {
                        inner.pending_call = Some(PendingCall {
                            activity_id: pos,
                            name: this.name.clone(),
                            input: this.input.clone(),
                            already_scheduled: true,
                        });
                    }
                    Poll::Pending
                }
            }
        } else {
            // First unrecorded step this invocation may take.
            inner.replaying = false;
            if inner.pending_call.is_none() {
                inner.pending_call = Some(PendingCall {
                    activity_id: pos,
                    name: this.name.clone(),
                    input: this.input.clone(),
                    already_scheduled: false,
                });
            }
            Poll::Pending
        }
    }
}

fn noop_waker() -> Waker {
    unsafe fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe fn wake(_: *const ()) {}
    unsafe fn wake_by_ref(_: *const ()) {}
    unsafe fn drop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}

/// Poll the routine once with a no-op waker. The routine never needs a
/// real waker: progress comes from the driver settling table entries
/// between polls, not from an external event source.
pub(crate) fn poll_once<F>(fut: &mut Pin<Box<F>>) -> Poll<F::Output>
where
    F: Future + ?Sized,
{
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    fut.as_mut().poll(&mut cx)
}
