//! An in-memory execution engine for tests.
//!
//! [`MockEngine`] hands out [`MockHandle`]s that never touch a network. Tests
//! drive them by pushing results and inspect them through the event log each
//! handle keeps.
//!
//! Only compiled with the `mock` feature.
//!
//! # Example
//!
//! ```ignore
//! let engine = MockEngine::new();
//! let provider = QueryProvider::new(Arc::new(engine.clone()));
//! let mut binding = provider.bind(config, props, Context::new());
//! binding.render()?;
//! binding.mount()?;
//!
//! let handle = engine.last_handle().unwrap();
//! handle.push_data(json!({"user": {"name": "Ada"}}))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::{
    self, EngineFuture, FetchMoreOptions, MutationRequest, Observer, QueryEngine, QueryHandle,
    QueryUpdater, SubscribeToMoreOptions, Subscription, WatchRequest,
};
use crate::error::{BindingError, QueryError};
use crate::operation::OperationType;
use crate::options::{DataMap, QueryOptions, Variables};
use crate::result::{NetworkStatus, QueryResult};

/// Something that happened to a [`MockHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum HandleEvent {
    /// An observer was attached.
    Subscribed(u64),
    /// An observer was detached.
    Unsubscribed(u64),
    /// Options were updated.
    OptionsSet(QueryOptions),
    /// Last-known state was put back.
    Restored,
    /// A refetch was issued.
    Refetched(Option<Variables>),
    /// A fetch-more was issued.
    FetchedMore(Option<Variables>),
    /// The data was rewritten in place.
    QueryUpdated,
    /// Polling started.
    PollingStarted(Duration),
    /// Polling stopped.
    PollingStopped,
    /// A subscription was layered on.
    SubscribedToMore,
    /// A layered subscription was closed.
    UnsubscribedFromMore,
}

struct HandleState {
    variables: Variables,
    options: QueryOptions,
    current: QueryResult,
    last_result: Option<QueryResult>,
    last_error: Option<QueryError>,
    observers: BTreeMap<u64, Arc<Observer>>,
    next_observer: u64,
    events: Vec<HandleEvent>,
    set_options_failure: Option<QueryError>,
}

/// A handle created by [`MockEngine`].
pub struct MockHandle {
    kind: OperationType,
    request: WatchRequest,
    supports_set_options: bool,
    state: Arc<Mutex<HandleState>>,
}

impl MockHandle {
    fn new(kind: OperationType, request: WatchRequest, supports_set_options: bool) -> Self {
        let state = HandleState {
            variables: request.options.variables_or_empty(),
            options: request.options.clone(),
            current: QueryResult::loading(),
            last_result: None,
            last_error: None,
            observers: BTreeMap::new(),
            next_observer: 0,
            events: Vec::new(),
            set_options_failure: None,
        };
        Self {
            kind,
            request,
            supports_set_options,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Whether `other` refers to this handle.
    pub fn is(&self, other: &Arc<dyn QueryHandle>) -> bool {
        std::ptr::addr_eq(self as *const Self, Arc::as_ptr(other))
    }

    /// Whether this handle was created by `watch_query` or `subscribe`.
    pub fn kind(&self) -> OperationType {
        self.kind
    }

    /// The request the handle was created with.
    pub fn request(&self) -> &WatchRequest {
        &self.request
    }

    /// The options currently in effect.
    pub fn options(&self) -> QueryOptions {
        self.state.lock().options.clone()
    }

    /// Everything that happened to the handle so far.
    pub fn events(&self) -> Vec<HandleEvent> {
        self.state.lock().events.clone()
    }

    /// Variables of every refetch issued so far.
    pub fn refetch_calls(&self) -> Vec<Option<Variables>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                HandleEvent::Refetched(vars) => Some(vars.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of attached observers.
    pub fn active_observers(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Make the next option update fail with `error`.
    pub fn fail_next_set_options(&self, error: QueryError) {
        self.state.lock().set_options_failure = Some(error);
    }

    /// Replace the current result without notifying observers.
    pub fn set_current(&self, result: QueryResult) {
        self.state.lock().current = result;
    }

    /// Make `result` current and deliver it to every observer.
    ///
    /// Returns the first error an observer raised.
    pub fn push(&self, result: QueryResult) -> Result<(), BindingError> {
        let observers = {
            let mut state = self.state.lock();
            state.current = result.clone();
            state.last_result = Some(result.clone());
            state.observers.values().cloned().collect::<Vec<_>>()
        };

        let mut outcome = Ok(());
        for observer in observers {
            if let Err(err) = observer.next(result.clone()) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }

    /// Push a ready result with `data`, which must be a JSON object.
    pub fn push_data(&self, data: Value) -> Result<(), BindingError> {
        let data = match data {
            Value::Object(map) => map,
            _ => DataMap::new(),
        };
        self.push(QueryResult::ready(data))
    }

    /// Fail the handle with `error` and deliver it to every observer.
    pub fn push_error(&self, error: QueryError) -> Result<(), BindingError> {
        let observers = {
            let mut state = self.state.lock();
            state.current = QueryResult::failed(error.clone());
            state.last_error = Some(error.clone());
            state.observers.values().cloned().collect::<Vec<_>>()
        };

        let mut outcome = Ok(());
        for observer in observers {
            if let Err(err) = observer.error(error.clone()) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }

    fn record(&self, event: HandleEvent) {
        self.state.lock().events.push(event);
    }

    fn current_future(&self) -> EngineFuture<QueryResult> {
        future::ready(Ok(self.state.lock().current.clone())).boxed()
    }
}

impl std::fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHandle")
            .field("kind", &self.kind)
            .field("observers", &self.active_observers())
            .finish_non_exhaustive()
    }
}

struct MockSubscription {
    state: Arc<Mutex<HandleState>>,
    id: u64,
}

impl Subscription for MockSubscription {
    fn unsubscribe(self: Box<Self>) {
        let mut state = self.state.lock();
        state.observers.remove(&self.id);
        state.events.push(HandleEvent::Unsubscribed(self.id));
    }
}

struct MoreSubscription {
    state: Arc<Mutex<HandleState>>,
}

impl Subscription for MoreSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.state.lock().events.push(HandleEvent::UnsubscribedFromMore);
    }
}

impl QueryHandle for MockHandle {
    fn variables(&self) -> Variables {
        self.state.lock().variables.clone()
    }

    fn current_result(&self) -> QueryResult {
        self.state.lock().current.clone()
    }

    fn last_result(&self) -> Option<QueryResult> {
        self.state.lock().last_result.clone()
    }

    fn last_error(&self) -> Option<QueryError> {
        self.state.lock().last_error.clone()
    }

    fn restore_last(&self, result: Option<QueryResult>, error: Option<QueryError>) {
        let mut state = self.state.lock();
        state.last_result = result;
        state.last_error = error;
        state.events.push(HandleEvent::Restored);
    }

    fn subscribe(&self, observer: Observer) -> Box<dyn Subscription> {
        let mut state = self.state.lock();
        let id = state.next_observer;
        state.next_observer += 1;
        state.observers.insert(id, Arc::new(observer));
        state.events.push(HandleEvent::Subscribed(id));
        Box::new(MockSubscription {
            state: self.state.clone(),
            id,
        })
    }

    fn set_options(&self, options: QueryOptions) -> Option<EngineFuture<()>> {
        if !self.supports_set_options {
            return None;
        }

        let mut state = self.state.lock();
        if let Some(vars) = &options.variables {
            state.variables = vars.clone();
        }
        state.options = state.options.clone().overlay(options.clone());
        state.events.push(HandleEvent::OptionsSet(options));

        Some(match state.set_options_failure.take() {
            Some(error) => engine::failed(error),
            None => future::ready(Ok(())).boxed(),
        })
    }

    fn refetch(&self, variables: Option<Variables>) -> EngineFuture<QueryResult> {
        {
            let mut state = self.state.lock();
            if let Some(vars) = &variables {
                state.variables.extend(vars.clone());
            }
            state.events.push(HandleEvent::Refetched(variables));
        }
        self.current_future()
    }

    fn fetch_more(&self, options: FetchMoreOptions) -> EngineFuture<QueryResult> {
        self.record(HandleEvent::FetchedMore(options.variables));
        self.current_future()
    }

    fn update_query(&self, updater: QueryUpdater) {
        let mut state = self.state.lock();
        let previous = state.current.data.clone().unwrap_or_default();
        let next = updater(&previous, &state.variables);
        state.current.data = Some(next);
        state.events.push(HandleEvent::QueryUpdated);
    }

    fn start_polling(&self, interval: Duration) {
        self.record(HandleEvent::PollingStarted(interval));
    }

    fn stop_polling(&self) {
        self.record(HandleEvent::PollingStopped);
    }

    fn subscribe_to_more(&self, _options: SubscribeToMoreOptions) -> Box<dyn Subscription> {
        self.record(HandleEvent::SubscribedToMore);
        Box::new(MoreSubscription {
            state: self.state.clone(),
        })
    }
}

#[derive(Default)]
struct EngineState {
    handles: Vec<Arc<MockHandle>>,
    mutations: Vec<MutationRequest>,
    mutation_result: Option<Result<QueryResult, QueryError>>,
    without_set_options: bool,
}

/// An engine whose handles live entirely in memory.
///
/// Clones share state, so a test can keep one clone while a provider owns
/// another.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    /// Create an engine with no handles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine whose handles have no option-update path.
    pub fn without_set_options() -> Self {
        let engine = Self::default();
        engine.state.lock().without_set_options = true;
        engine
    }

    /// Every handle created so far, oldest first.
    pub fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.state.lock().handles.clone()
    }

    /// The most recently created handle.
    pub fn last_handle(&self) -> Option<Arc<MockHandle>> {
        self.state.lock().handles.last().cloned()
    }

    /// Number of handles created so far.
    pub fn handle_count(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Every mutation issued so far.
    pub fn mutations(&self) -> Vec<MutationRequest> {
        self.state.lock().mutations.clone()
    }

    /// Set what subsequent mutations resolve to.
    pub fn set_mutation_result(&self, result: Result<QueryResult, QueryError>) {
        self.state.lock().mutation_result = Some(result);
    }

    fn create(&self, kind: OperationType, request: WatchRequest) -> Arc<dyn QueryHandle> {
        let mut state = self.state.lock();
        let handle = Arc::new(MockHandle::new(kind, request, !state.without_set_options));
        state.handles.push(handle.clone());
        handle
    }
}

impl QueryEngine for MockEngine {
    fn watch_query(&self, request: WatchRequest) -> Arc<dyn QueryHandle> {
        self.create(OperationType::Query, request)
    }

    fn subscribe(&self, request: WatchRequest) -> Arc<dyn QueryHandle> {
        self.create(OperationType::Subscription, request)
    }

    fn mutate(&self, request: MutationRequest) -> EngineFuture<QueryResult> {
        let result = {
            let mut state = self.state.lock();
            state.mutations.push(request.clone());
            state.mutation_result.clone().unwrap_or_else(|| {
                Ok(QueryResult {
                    network_status: NetworkStatus::Ready,
                    ..QueryResult::default()
                })
            })
        };

        if let (Some(update), Ok(result)) = (&request.update, &result) {
            update(result);
        }
        future::ready(result).boxed()
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Document;
    use serde_json::json;

    fn request() -> WatchRequest {
        WatchRequest {
            document: Document::new("query Q { q }"),
            options: QueryOptions::new().variable("id", 1),
            metadata: None,
        }
    }

    #[test]
    fn test_push_reaches_observers() {
        let engine = MockEngine::new();
        let handle = engine.watch_query(request());
        let mock = engine.last_handle().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = handle.subscribe(Observer::new(
            move |result| {
                s.lock().push(result);
                Ok(())
            },
            |_| Ok(()),
        ));

        mock.push_data(json!({"q": 1})).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(handle.current_result().data.unwrap().get("q"), Some(&json!(1)));

        sub.unsubscribe();
        mock.push_data(json!({"q": 2})).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(mock.events(), vec![HandleEvent::Subscribed(0), HandleEvent::Unsubscribed(0)]);
    }

    #[test]
    fn test_error_keeps_last_result() {
        let engine = MockEngine::new();
        let handle = engine.watch_query(request());
        let mock = engine.last_handle().unwrap();

        mock.push_data(json!({"q": 1})).unwrap();
        mock.push_error(QueryError::graphql("bad")).unwrap();

        assert!(handle.current_result().error.is_some());
        assert_eq!(handle.last_result().unwrap().data.unwrap().get("q"), Some(&json!(1)));
        assert_eq!(handle.last_error(), Some(QueryError::graphql("bad")));
    }

    #[test]
    fn test_without_set_options() {
        let engine = MockEngine::without_set_options();
        let handle = engine.watch_query(request());
        assert!(handle.set_options(QueryOptions::standby()).is_none());
    }

    #[tokio::test]
    async fn test_set_options_failure() {
        let engine = MockEngine::new();
        let handle = engine.watch_query(request());
        let mock = engine.last_handle().unwrap();

        mock.fail_next_set_options(QueryError::network("offline"));
        let update = handle.set_options(QueryOptions::new().variable("id", 2)).unwrap();
        assert_eq!(update.await, Err(QueryError::network("offline")));
        assert_eq!(handle.variables().get("id"), Some(&json!(2)));

        let update = handle.set_options(QueryOptions::new()).unwrap();
        assert_eq!(update.await, Ok(()));
    }

    #[tokio::test]
    async fn test_update_query_rewrites_data() {
        let engine = MockEngine::new();
        let handle = engine.watch_query(request());
        let mock = engine.last_handle().unwrap();
        mock.push_data(json!({"count": 1})).unwrap();

        handle.update_query(Box::new(|prev, _vars| {
            let mut next = prev.clone();
            next.insert("count".into(), json!(2));
            next
        }));
        let result = handle.refetch(None).await.unwrap();
        assert_eq!(result.data.unwrap().get("count"), Some(&json!(2)));
    }
}
