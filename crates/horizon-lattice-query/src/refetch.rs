//! Refetches requested before a binding has a live subscription.
//!
//! A component may call `refetch` from its own mount hook, before the binding
//! wrapping it has subscribed. Such calls park here and are issued against the
//! handle once a subscription is attached. Snapshots rendered that early keep
//! routing through the slot, so while a subscription is attached the slot
//! forwards straight to its handle.

use std::sync::Arc;

use futures_util::future::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::engine::{self, EngineFuture, QueryHandle};
use crate::error::QueryError;
use crate::logging::targets;
use crate::options::Variables;
use crate::result::QueryResult;

#[derive(Default)]
struct RefetchRequest {
    variables: Option<Variables>,
    waiters: Vec<oneshot::Sender<EngineFuture<QueryResult>>>,
}

#[derive(Default)]
struct SlotState {
    request: Option<RefetchRequest>,
    attached: Option<Arc<dyn QueryHandle>>,
    closed: bool,
}

/// A slot holding at most one pending refetch.
///
/// Every caller gets its own future; all of them settle with the same engine
/// refetch, issued with the arguments of the latest call.
#[derive(Clone, Default)]
pub struct PendingRefetch {
    state: Arc<Mutex<SlotState>>,
}

impl PendingRefetch {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refetch through the slot.
    ///
    /// Goes straight to the attached handle if there is one. Otherwise the
    /// call parks until [`flush`](Self::flush) or [`cancel`](Self::cancel).
    /// A cancelled slot rejects at once.
    pub fn enqueue(&self, variables: Option<Variables>) -> EngineFuture<QueryResult> {
        let mut state = self.state.lock();
        if state.closed {
            return engine::failed(QueryError::Cancelled);
        }
        let attached = state.attached.clone();
        if let Some(handle) = attached {
            drop(state);
            return handle.refetch(variables);
        }

        let (tx, rx) = oneshot::channel();
        let request = state.request.get_or_insert_with(RefetchRequest::default);
        request.variables = variables;
        request.waiters.push(tx);
        tracing::debug!(
            target: targets::LIFECYCLE,
            waiters = request.waiters.len(),
            "refetch parked until subscribed"
        );
        drop(state);

        async move {
            match rx.await {
                Ok(refetch) => refetch.await,
                Err(_) => Err(QueryError::Cancelled),
            }
        }
        .boxed()
    }

    /// Attach `handle` and issue the parked refetch against it.
    ///
    /// Later calls to [`enqueue`](Self::enqueue) go straight to `handle` until
    /// [`detach`](Self::detach). Returns `false` if nothing was pending.
    pub fn flush(&self, handle: &Arc<dyn QueryHandle>) -> bool {
        let request = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.attached = Some(handle.clone());
            state.request.take()
        };
        let Some(request) = request else {
            return false;
        };

        tracing::debug!(
            target: targets::LIFECYCLE,
            waiters = request.waiters.len(),
            "issuing parked refetch"
        );
        let refetch = handle.refetch(request.variables).shared();
        for waiter in request.waiters {
            // A waiter that dropped its future no longer cares.
            let _ = waiter.send(refetch.clone().boxed());
        }
        true
    }

    /// Stop forwarding; later calls park again.
    pub fn detach(&self) {
        self.state.lock().attached = None;
    }

    /// Close the slot, rejecting the parked refetch and every later call with
    /// [`QueryError::Cancelled`].
    ///
    /// Returns `false` if nothing was pending.
    pub fn cancel(&self) -> bool {
        let request = {
            let mut state = self.state.lock();
            state.closed = true;
            state.attached = None;
            state.request.take()
        };
        let Some(request) = request else {
            return false;
        };

        tracing::debug!(
            target: targets::LIFECYCLE,
            waiters = request.waiters.len(),
            "cancelling parked refetch"
        );
        for waiter in request.waiters {
            let _ = waiter.send(engine::failed(QueryError::Cancelled));
        }
        true
    }

    /// Whether a refetch is parked.
    pub fn is_pending(&self) -> bool {
        self.state.lock().request.is_some()
    }

    /// Whether calls currently go straight to a handle.
    pub fn is_attached(&self) -> bool {
        self.state.lock().attached.is_some()
    }
}

impl std::fmt::Debug for PendingRefetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PendingRefetch")
            .field("pending", &state.request.is_some())
            .field("attached", &state.attached.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}
