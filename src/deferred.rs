//! Single-assignment deferred values.
//!
//! A [`DeferredValue`] represents the eventual outcome of an activity call:
//! it starts `Pending` and is settled exactly once as `Fulfilled` or
//! `Rejected`, or forced to `Canceled`. Continuations registered before
//! settlement fire in registration order when the value settles;
//! continuations registered after settlement fire immediately with the
//! known outcome. The replay driver keeps one deferred value per activity
//! position in the call table, settled from recorded history before the
//! routine is driven.

use std::sync::{Arc, Mutex};

use crate::errors::{CancellationSignal, ProgrammingError};

/// Observable lifecycle state of a [`DeferredValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Fulfilled,
    Rejected,
    Canceled,
}

/// What a continuation handler produces: either a plain value, or another
/// deferred value whose eventual outcome the downstream value adopts
/// (flattening, rather than wrapping the deferred itself).
pub enum Chain<T> {
    Value(T),
    Deferred(DeferredValue<T>),
}

enum State<T> {
    Pending,
    Fulfilled(T),
    Rejected(String),
    Canceled,
}

/// Internal notification delivered to registered continuations. Handlers
/// registered by users never observe `Canceled`; it exists so chains can
/// propagate cancellation downstream.
enum Settlement<T> {
    Fulfilled(T),
    Rejected(String),
    Canceled,
}

type Continuation<T> = Box<dyn FnOnce(Settlement<T>) + Send>;

struct Inner<T> {
    state: State<T>,
    continuations: Vec<Continuation<T>>,
}

/// Single-assignment future for an eventual activity outcome.
///
/// Cloning is shallow: all clones observe the same state.
pub struct DeferredValue<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for DeferredValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for DeferredValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> DeferredValue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                continuations: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> DeferredState {
        match self.inner.lock().unwrap().state {
            State::Pending => DeferredState::Pending,
            State::Fulfilled(_) => DeferredState::Fulfilled,
            State::Rejected(_) => DeferredState::Rejected,
            State::Canceled => DeferredState::Canceled,
        }
    }

    /// Settle as fulfilled. A second settlement attempt is signalled as a
    /// [`ProgrammingError::DoubleSettlement`] and leaves the first outcome
    /// unchanged; settling a cancelled value is an accepted no-op.
    pub fn fulfil(&self, value: T) -> Result<(), ProgrammingError> {
        let continuations = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Pending => {}
                State::Canceled => return Ok(()),
                State::Fulfilled(_) => {
                    return Err(ProgrammingError::DoubleSettlement { state: "fulfilled" })
                }
                State::Rejected(_) => {
                    return Err(ProgrammingError::DoubleSettlement { state: "rejected" })
                }
            }
            inner.state = State::Fulfilled(value.clone());
            std::mem::take(&mut inner.continuations)
        };
        // Fire outside the lock: handlers may touch downstream values.
        for c in continuations {
            c(Settlement::Fulfilled(value.clone()));
        }
        Ok(())
    }

    /// Settle as rejected. Same exactly-once contract as [`fulfil`](Self::fulfil).
    pub fn reject(&self, reason: impl Into<String>) -> Result<(), ProgrammingError> {
        let reason = reason.into();
        let continuations = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Pending => {}
                State::Canceled => return Ok(()),
                State::Fulfilled(_) => {
                    return Err(ProgrammingError::DoubleSettlement { state: "fulfilled" })
                }
                State::Rejected(_) => {
                    return Err(ProgrammingError::DoubleSettlement { state: "rejected" })
                }
            }
            inner.state = State::Rejected(reason.clone());
            std::mem::take(&mut inner.continuations)
        };
        for c in continuations {
            c(Settlement::Rejected(reason.clone()));
        }
        Ok(())
    }

    /// Force `Canceled`. Terminal; applies only to not-yet-settled values
    /// (a settled value keeps its outcome). Registered continuation chains
    /// are cancelled downstream without running user handlers.
    pub fn cancel(&self) {
        let continuations = {
            let mut inner = self.inner.lock().unwrap();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.state = State::Canceled;
            std::mem::take(&mut inner.continuations)
        };
        for c in continuations {
            c(Settlement::Canceled);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Canceled)
    }

    pub fn assert_not_cancelled(&self) -> Result<(), CancellationSignal> {
        if self.is_cancelled() {
            Err(CancellationSignal)
        } else {
            Ok(())
        }
    }

    /// Non-blocking read of a settled outcome. `None` while pending or
    /// cancelled.
    pub fn try_outcome(&self) -> Option<Result<T, String>> {
        match &self.inner.lock().unwrap().state {
            State::Fulfilled(v) => Some(Ok(v.clone())),
            State::Rejected(e) => Some(Err(e.clone())),
            _ => None,
        }
    }

    /// Register a pair of handlers and obtain a new deferred value whose
    /// outcome is computed by mapping this value's outcome through them.
    ///
    /// A handler error rejects the downstream value; a handler returning
    /// [`Chain::Deferred`] makes the downstream value adopt the inner
    /// value's eventual outcome. If this value is (or becomes) cancelled,
    /// the downstream value is cancelled and neither handler runs.
    pub fn register_continuation<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> DeferredValue<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Chain<U>, String> + Send + 'static,
        R: FnOnce(String) -> Result<Chain<U>, String> + Send + 'static,
    {
        let next = DeferredValue::<U>::new();
        let downstream = next.clone();
        self.on_settled(Box::new(move |settlement| match settlement {
            Settlement::Fulfilled(v) => settle_downstream(&downstream, on_fulfilled(v)),
            Settlement::Rejected(e) => settle_downstream(&downstream, on_rejected(e)),
            Settlement::Canceled => downstream.cancel(),
        }));
        next
    }

    /// Fulfilled-only continuation; a rejection passes through unchanged.
    pub fn map<U, F>(&self, on_fulfilled: F) -> DeferredValue<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Chain<U>, String> + Send + 'static,
    {
        self.register_continuation(on_fulfilled, Err)
    }

    /// Rejected-only continuation; a fulfillment passes through unchanged.
    pub fn recover<R>(&self, on_rejected: R) -> DeferredValue<T>
    where
        R: FnOnce(String) -> Result<Chain<T>, String> + Send + 'static,
    {
        self.register_continuation(|v| Ok(Chain::Value(v)), on_rejected)
    }

    /// Attach a handler that runs on both fulfillment and rejection and
    /// preserves the original outcome.
    pub fn run_finally<F>(&self, f: F) -> DeferredValue<T>
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(f)));
        let slot2 = slot.clone();
        self.register_continuation(
            move |v| {
                if let Some(f) = slot.lock().unwrap().take() {
                    f();
                }
                Ok(Chain::Value(v))
            },
            move |e| {
                if let Some(f) = slot2.lock().unwrap().take() {
                    f();
                }
                Err(e)
            },
        )
    }

    /// Deliver to `handler` at settlement, or immediately if already
    /// settled. Handlers queued while pending fire in registration order.
    fn on_settled(&self, handler: Continuation<T>) {
        let mut inner = self.inner.lock().unwrap();
        let settlement = match &inner.state {
            State::Pending => {
                inner.continuations.push(handler);
                return;
            }
            State::Fulfilled(v) => Settlement::Fulfilled(v.clone()),
            State::Rejected(e) => Settlement::Rejected(e.clone()),
            State::Canceled => Settlement::Canceled,
        };
        drop(inner);
        handler(settlement);
    }
}

fn settle_downstream<U: Clone + Send + 'static>(
    next: &DeferredValue<U>,
    produced: Result<Chain<U>, String>,
) {
    match produced {
        Ok(Chain::Value(v)) => {
            let _ = next.fulfil(v);
        }
        Ok(Chain::Deferred(adopted)) => {
            let next = next.clone();
            adopted.on_settled(Box::new(move |settlement| match settlement {
                Settlement::Fulfilled(v) => {
                    let _ = next.fulfil(v);
                }
                Settlement::Rejected(e) => {
                    let _ = next.reject(e);
                }
                Settlement::Canceled => next.cancel(),
            }));
        }
        Err(e) => {
            let _ = next.reject(e);
        }
    }
}
