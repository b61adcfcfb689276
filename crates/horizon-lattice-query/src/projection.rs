//! Projection of handle results into render-ready snapshots.
//!
//! A [`ResultProjector`] belongs to one binding and turns whatever the handle
//! currently holds into a [`DataSnapshot`]. It keeps the last successful data
//! around so that a reload shows stale data instead of nothing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::{
    EngineFuture, FetchMoreOptions, MutationRequest, QueryEngine, QueryHandle, QueryUpdater,
    SubscribeToMoreOptions, Subscription, UpdateHook,
};
use crate::error::{QueryError, Result};
use crate::logging::targets;
use crate::options::{Context, DataMap, OptionsResolver, Props, QueryOptions, Variables};
use crate::refetch::PendingRefetch;
use crate::result::{NetworkStatus, QueryResult};
use crate::timer::{TimerId, TimerQueue};

/// How long a snapshot error may go unread before it is reported.
pub const UNREAD_ERROR_DELAY: Duration = Duration::from_millis(10);

/// An error that no consumer read in time.
#[derive(Debug, Clone)]
pub struct UnhandledError {
    /// Display name of the binding that produced it.
    pub display_name: String,
    /// The error itself.
    pub error: QueryError,
}

/// Timers reporting unread errors, shared by a binding and its snapshots.
pub type ErrorTimers = Arc<Mutex<TimerQueue<UnhandledError>>>;

#[derive(Clone)]
struct ErrorWatch {
    timers: ErrorTimers,
    id: TimerId,
}

impl ErrorWatch {
    fn disarm(&self) {
        if self.timers.lock().stop(self.id).is_some() {
            tracing::trace!(target: targets::PROJECTION, "error read, warning cancelled");
        }
    }
}

/// Operations bound to a query handle, exposed next to the data.
#[derive(Clone)]
pub struct QueryControls {
    handle: Arc<dyn QueryHandle>,
    refetch_slot: Option<PendingRefetch>,
}

impl QueryControls {
    /// Variables the handle is bound to.
    pub fn variables(&self) -> Variables {
        self.handle.variables()
    }

    /// Re-run the query.
    ///
    /// On a snapshot rendered before the binding subscribed, the call goes
    /// through the binding's refetch slot: it parks until a subscription
    /// exists and goes straight to the handle while one is attached.
    pub fn refetch(&self, variables: Option<Variables>) -> EngineFuture<QueryResult> {
        match &self.refetch_slot {
            Some(slot) => slot.enqueue(variables),
            None => self.handle.refetch(variables),
        }
    }

    /// Load more data into the query.
    pub fn fetch_more(&self, options: FetchMoreOptions) -> EngineFuture<QueryResult> {
        self.handle.fetch_more(options)
    }

    /// Rewrite the query data in place.
    pub fn update_query(&self, updater: QueryUpdater) {
        self.handle.update_query(updater);
    }

    /// Start polling.
    pub fn start_polling(&self, interval: Duration) {
        self.handle.start_polling(interval);
    }

    /// Stop polling.
    pub fn stop_polling(&self) {
        self.handle.stop_polling();
    }

    /// Layer a subscription onto the query.
    pub fn subscribe_to_more(&self, options: SubscribeToMoreOptions) -> Box<dyn Subscription> {
        self.handle.subscribe_to_more(options)
    }
}

impl fmt::Debug for QueryControls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryControls")
            .field("deferred_refetch", &self.refetch_slot.is_some())
            .finish_non_exhaustive()
    }
}

/// The render-ready view of a query or subscription.
#[derive(Clone)]
pub struct DataSnapshot {
    /// Whether a request is outstanding (for subscriptions: no payload yet).
    pub loading: bool,
    /// Network state, for queries.
    pub network_status: Option<NetworkStatus>,
    /// Variables the operation runs with.
    pub variables: Option<Variables>,
    /// Result fields.
    pub fields: DataMap,
    error: Option<QueryError>,
    watch: Option<ErrorWatch>,
    controls: Option<QueryControls>,
}

impl DataSnapshot {
    /// The error carried by this snapshot.
    ///
    /// Reading it marks the error as handled; an error that is never read is
    /// reported through `tracing` once the warning delay has passed.
    pub fn error(&self) -> Option<&QueryError> {
        if let Some(watch) = &self.watch {
            watch.disarm();
        }
        self.error.as_ref()
    }

    /// A single result field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Operations bound to the query handle. `None` for subscriptions.
    pub fn controls(&self) -> Option<&QueryControls> {
        self.controls.as_ref()
    }
}

impl fmt::Debug for DataSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reads the raw field so that debugging does not count as handling.
        f.debug_struct("DataSnapshot")
            .field("loading", &self.loading)
            .field("network_status", &self.network_status)
            .field("variables", &self.variables)
            .field("fields", &self.fields)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Builds snapshots for one binding.
pub struct ResultProjector {
    display_name: String,
    previous_data: Option<DataMap>,
    timers: ErrorTimers,
}

impl ResultProjector {
    /// Create a projector reporting unread errors into `timers`.
    pub fn new(display_name: impl Into<String>, timers: ErrorTimers) -> Self {
        Self {
            display_name: display_name.into(),
            previous_data: None,
            timers,
        }
    }

    /// Data retained from the last successful projection.
    pub fn previous_data(&self) -> Option<&DataMap> {
        self.previous_data.as_ref()
    }

    /// Project a query handle's current result.
    ///
    /// `deferred_refetch` is the binding's pending-refetch slot when it has no
    /// subscription yet; refetches then park there instead of reaching the
    /// handle.
    pub fn project_query(
        &mut self,
        handle: &Arc<dyn QueryHandle>,
        deferred_refetch: Option<PendingRefetch>,
    ) -> DataSnapshot {
        let current = handle.current_result();
        let mut fields = DataMap::new();

        if current.loading {
            if let Some(previous) = &self.previous_data {
                fields.extend(previous.clone());
            }
            if let Some(data) = &current.data {
                fields.extend(data.clone());
            }
        } else if current.error.is_some() {
            if let Some(data) = handle.last_result().and_then(|r| r.data) {
                fields.extend(data);
            }
        } else {
            if let Some(data) = &current.data {
                fields.extend(data.clone());
            }
            self.previous_data = current.data.clone();
        }

        let watch = current.error.as_ref().map(|error| {
            let id = self.timers.lock().start_one_shot(
                UNREAD_ERROR_DELAY,
                UnhandledError {
                    display_name: self.display_name.clone(),
                    error: error.clone(),
                },
            );
            ErrorWatch {
                timers: self.timers.clone(),
                id,
            }
        });

        tracing::trace!(
            target: targets::PROJECTION,
            loading = current.loading,
            has_error = current.error.is_some(),
            fields = fields.len(),
            "query projected"
        );

        DataSnapshot {
            loading: current.loading,
            network_status: Some(current.network_status),
            variables: Some(handle.variables()),
            fields,
            error: current.error,
            watch,
            controls: Some(QueryControls {
                handle: handle.clone(),
                refetch_slot: deferred_refetch,
            }),
        }
    }

    /// Project the last payload pushed to a subscription.
    pub fn project_subscription(
        &self,
        last_payload: Option<&QueryResult>,
        variables: Option<Variables>,
    ) -> DataSnapshot {
        DataSnapshot {
            loading: last_payload.is_none(),
            network_status: None,
            variables,
            fields: last_payload
                .and_then(|payload| payload.data.clone())
                .unwrap_or_default(),
            error: last_payload.and_then(|payload| payload.error.clone()),
            watch: None,
            controls: None,
        }
    }
}

impl fmt::Debug for ResultProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultProjector")
            .field("display_name", &self.display_name)
            .field("previous_data", &self.previous_data)
            .finish_non_exhaustive()
    }
}

/// Per-call input to [`Mutator::mutate`].
#[derive(Clone, Default)]
pub struct MutationCall {
    /// Options layered over the binding's options.
    pub options: QueryOptions,
    /// Hook run with the mutation result.
    pub update: Option<UpdateHook>,
}

impl MutationCall {
    /// A call with only per-call options.
    pub fn with_options(options: QueryOptions) -> Self {
        Self {
            options,
            update: None,
        }
    }
}

/// The callable exposed to components bound to a mutation.
#[derive(Clone)]
pub struct Mutator {
    engine: Arc<dyn QueryEngine>,
    resolver: OptionsResolver,
    props: Props,
    context: Context,
}

impl Mutator {
    pub(crate) fn new(
        engine: Arc<dyn QueryEngine>,
        resolver: OptionsResolver,
        props: Props,
        context: Context,
    ) -> Self {
        Self {
            engine,
            resolver,
            props,
            context,
        }
    }

    /// Run the mutation.
    ///
    /// # Errors
    ///
    /// Fails without reaching the engine when a required variable is neither
    /// in the call options nor in the component's props.
    pub fn mutate(&self, call: MutationCall) -> Result<EngineFuture<QueryResult>> {
        let options = self
            .resolver
            .compute(&self.props, &self.context, Some(call.options))?;

        tracing::debug!(
            target: targets::PROJECTION,
            operation = self.resolver.operation().display_name(),
            "issuing mutation"
        );
        Ok(self.engine.mutate(MutationRequest {
            document: self.resolver.operation().document.clone(),
            options,
            update: call.update,
        }))
    }
}

impl fmt::Debug for Mutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutator")
            .field("operation", &self.resolver.operation().display_name())
            .finish_non_exhaustive()
    }
}

/// What a binding hands to its component under the result name.
#[derive(Debug, Clone)]
pub enum OperationResult {
    /// Query or subscription data.
    Data(DataSnapshot),
    /// The mutation callable.
    Mutate(Mutator),
}

impl OperationResult {
    /// The snapshot, for queries and subscriptions.
    pub fn as_data(&self) -> Option<&DataSnapshot> {
        match self {
            Self::Data(snapshot) => Some(snapshot),
            Self::Mutate(_) => None,
        }
    }

    /// The callable, for mutations.
    pub fn as_mutator(&self) -> Option<&Mutator> {
        match self {
            Self::Mutate(mutator) => Some(mutator),
            Self::Data(_) => None,
        }
    }
}
