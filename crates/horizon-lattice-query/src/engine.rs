//! The boundary with the query-execution engine.
//!
//! The binding never talks to a network or cache directly. It drives an
//! engine through [`QueryEngine`] and the handles it returns through
//! [`QueryHandle`].
//!
//! Engine futures are started when the method returning them is called; the
//! future only reports completion. Dropping one does not cancel the request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::Value;

use crate::error::{BindingError, QueryError};
use crate::operation::Document;
use crate::options::{DataMap, QueryOptions, Variables};
use crate::result::QueryResult;

/// A started engine request.
pub type EngineFuture<T> = BoxFuture<'static, Result<T, QueryError>>;

/// An engine future that has already failed.
pub fn failed<T: Send + 'static>(error: QueryError) -> EngineFuture<T> {
    future::ready(Err(error)).boxed()
}

/// Hook run by the engine with the result of a mutation.
pub type UpdateHook = Arc<dyn Fn(&QueryResult) + Send + Sync>;

/// Rewrites the cached data of a handle: `(previous, variables) -> next`.
pub type QueryUpdater = Box<dyn FnOnce(&DataMap, &Variables) -> DataMap + Send>;

/// Merges incoming data into existing data: `(previous, incoming) -> next`.
pub type MergeFn = Arc<dyn Fn(&DataMap, &DataMap) -> DataMap + Send + Sync>;

/// A request to watch a query or open a subscription.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// The operation document.
    pub document: Document,
    /// Resolved options.
    pub options: QueryOptions,
    /// Free-form metadata attached to the handle.
    pub metadata: Option<Value>,
}

/// A request to run a mutation.
#[derive(Clone)]
pub struct MutationRequest {
    /// The mutation document.
    pub document: Document,
    /// Resolved options.
    pub options: QueryOptions,
    /// Optional hook run with the mutation result.
    pub update: Option<UpdateHook>,
}

impl fmt::Debug for MutationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRequest")
            .field("document", &self.document)
            .field("options", &self.options)
            .field("update", &self.update.is_some())
            .finish()
    }
}

/// Options for loading additional data into a handle.
#[derive(Clone, Default)]
pub struct FetchMoreOptions {
    /// A different document to fetch with, if any.
    pub document: Option<Document>,
    /// Variables merged over the handle's variables.
    pub variables: Option<Variables>,
    /// How to merge the fetched data into the existing data.
    pub update_query: Option<MergeFn>,
}

impl fmt::Debug for FetchMoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchMoreOptions")
            .field("document", &self.document)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// Options for layering a subscription onto a query handle.
#[derive(Clone)]
pub struct SubscribeToMoreOptions {
    /// The subscription document.
    pub document: Document,
    /// Subscription variables.
    pub variables: Option<Variables>,
    /// How to merge each pushed payload into the query data.
    pub update_query: MergeFn,
    /// Called when the subscription fails.
    pub on_error: Option<Arc<dyn Fn(&QueryError) + Send + Sync>>,
}

impl fmt::Debug for SubscribeToMoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeToMoreOptions")
            .field("document", &self.document)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

type NextFn = Box<dyn Fn(QueryResult) -> Result<(), BindingError> + Send + Sync>;
type ErrorFn = Box<dyn Fn(QueryError) -> Result<(), BindingError> + Send + Sync>;

/// Receives pushed results from a handle.
///
/// Returning `Err` re-raises the failure to whoever drives the engine.
pub struct Observer {
    next: NextFn,
    error: ErrorFn,
}

impl Observer {
    /// Create an observer from result and error callbacks.
    pub fn new<N, E>(next: N, error: E) -> Self
    where
        N: Fn(QueryResult) -> Result<(), BindingError> + Send + Sync + 'static,
        E: Fn(QueryError) -> Result<(), BindingError> + Send + Sync + 'static,
    {
        Self {
            next: Box::new(next),
            error: Box::new(error),
        }
    }

    /// An observer that ignores everything. Used to keep dormant handles alive.
    pub fn noop() -> Self {
        Self::new(|_| Ok(()), |_| Ok(()))
    }

    /// Deliver a result.
    pub fn next(&self, result: QueryResult) -> Result<(), BindingError> {
        (self.next)(result)
    }

    /// Deliver an error.
    pub fn error(&self, error: QueryError) -> Result<(), BindingError> {
        (self.error)(error)
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

/// An active push registration on a handle.
///
/// Consumed on release, so it can be released at most once.
pub trait Subscription: Send {
    /// Stop receiving pushes.
    fn unsubscribe(self: Box<Self>);
}

/// A live or dormant query or subscription unit owned by the engine.
pub trait QueryHandle: Send + Sync {
    /// Variables the handle is currently bound to.
    fn variables(&self) -> Variables;

    /// Pull the current result snapshot.
    fn current_result(&self) -> QueryResult;

    /// The last result the handle delivered, if any.
    fn last_result(&self) -> Option<QueryResult>;

    /// The last error the handle delivered, if any.
    fn last_error(&self) -> Option<QueryError>;

    /// Put back last-known state, e.g. after a resubscription reset it.
    fn restore_last(&self, result: Option<QueryResult>, error: Option<QueryError>);

    /// Attach an observer.
    fn subscribe(&self, observer: Observer) -> Box<dyn Subscription>;

    /// Reconfigure the handle.
    ///
    /// Returns `None` when the handle has no option-update path.
    fn set_options(&self, options: QueryOptions) -> Option<EngineFuture<()>> {
        let _ = options;
        None
    }

    /// Re-run the request, optionally with new variables.
    fn refetch(&self, variables: Option<Variables>) -> EngineFuture<QueryResult>;

    /// Load more data into the handle.
    fn fetch_more(&self, options: FetchMoreOptions) -> EngineFuture<QueryResult>;

    /// Rewrite the handle's data in place.
    fn update_query(&self, updater: QueryUpdater);

    /// Start polling at the given interval.
    fn start_polling(&self, interval: Duration);

    /// Stop polling.
    fn stop_polling(&self);

    /// Layer a subscription onto this handle.
    fn subscribe_to_more(&self, options: SubscribeToMoreOptions) -> Box<dyn Subscription>;
}

/// The query-execution engine.
pub trait QueryEngine: Send + Sync {
    /// Create a handle watching a query. Nothing is fetched until it is subscribed.
    fn watch_query(&self, request: WatchRequest) -> Arc<dyn QueryHandle>;

    /// Create a handle for a subscription operation.
    fn subscribe(&self, request: WatchRequest) -> Arc<dyn QueryHandle>;

    /// Run a mutation.
    fn mutate(&self, request: MutationRequest) -> EngineFuture<QueryResult>;
}

/// Whether two handle references point at the same handle.
pub fn same_handle(a: &Arc<dyn QueryHandle>, b: &Arc<dyn QueryHandle>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Whether two engine references point at the same engine.
pub fn same_engine(a: &Arc<dyn QueryEngine>, b: &Arc<dyn QueryEngine>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
