//! The per-instance lifecycle of a bound operation.
//!
//! A [`QueryLifecycle`] owns at most one handle and at most one subscription
//! on it. The host drives it with the component's lifecycle hooks:
//!
//! | hook             | effect                                                   |
//! |------------------|----------------------------------------------------------|
//! | `render`         | creates the handle if needed, projects a snapshot        |
//! | `mount`          | subscribes (unless skipped), flushes a parked refetch    |
//! | `update_props`   | reconfigures the handle and resubscribes                 |
//! | `unmount`        | recycles (queries) or releases (subscriptions) the handle |
//!
//! Mutations never create a handle; their result is a [`Mutator`].
//!
//! Pushes arrive through the handle's observer and are reported with the
//! [`render_requested`](QueryLifecycle::render_requested) signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use crate::binding::{BindingConfig, ChildProps};
use crate::engine::{Observer, QueryHandle, Subscription, WatchRequest};
use crate::error::{BindingError, QueryError, Result};
use crate::logging::targets;
use crate::operation::OperationType;
use crate::options::{Context, OptionsResolver, Props, QueryOptions};
use crate::projection::{ErrorTimers, Mutator, OperationResult, ResultProjector};
use crate::provider::BindingServices;
use crate::refetch::PendingRefetch;
use crate::result::QueryResult;
use crate::signal::Signal;

/// Result fields owned by the binding; pushed data may not use them.
pub const RESERVED_FIELDS: [&str; 7] = [
    "variables",
    "refetch",
    "fetchMore",
    "updateQuery",
    "startPolling",
    "stopPolling",
    "subscribeToMore",
];

/// Where a lifecycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not mounted yet. A handle may already exist from an early render.
    Unmounted,
    /// Mounted without an active subscription (skipped, or a mutation).
    Idle,
    /// Mounted with an active subscription.
    Subscribed,
    /// Unmounted for good.
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unmounted,
    Mounted,
    Disposed,
}

struct LiveQuery {
    handle: Arc<dyn QueryHandle>,
    subscription: Option<Box<dyn Subscription>>,
}

/// State shared with the observer installed on the handle.
struct PushState {
    kind: OperationType,
    display_name: String,
    last_subscription_data: Mutex<Option<QueryResult>>,
    mounted: AtomicBool,
    render_requested: Signal<()>,
}

impl PushState {
    fn on_next(&self, result: QueryResult) -> Result<()> {
        if self.kind == OperationType::Subscription {
            *self.last_subscription_data.lock() = Some(result.clone());
        }

        let clashing: Vec<String> = result
            .field_names()
            .filter(|name| RESERVED_FIELDS.contains(name))
            .map(str::to_string)
            .collect();
        if !clashing.is_empty() {
            tracing::error!(
                target: targets::LIFECYCLE,
                display_name = %self.display_name,
                keys = ?clashing,
                "result contains reserved keys"
            );
            return Err(BindingError::ResultFieldClash {
                display_name: self.display_name.clone(),
                keys: clashing,
            });
        }

        if self.mounted.load(Ordering::SeqCst) {
            self.render_requested.emit(());
        }
        Ok(())
    }

    fn on_error(&self, error: QueryError) -> Result<()> {
        if error.has_graphql_errors() {
            return self.on_next(QueryResult::failed(error));
        }

        tracing::error!(
            target: targets::LIFECYCLE,
            display_name = %self.display_name,
            %error,
            "unhandled push error"
        );
        Err(BindingError::UnhandledQuery {
            display_name: self.display_name.clone(),
            source: error,
        })
    }
}

/// Binds one operation to one component instance.
pub struct QueryLifecycle {
    config: BindingConfig,
    services: BindingServices,
    resolver: OptionsResolver,
    props: Props,
    context: Context,
    phase: Phase,
    live: Option<LiveQuery>,
    refetch: PendingRefetch,
    projector: ResultProjector,
    push: Arc<PushState>,
    timers: ErrorTimers,
}

impl QueryLifecycle {
    /// Create a lifecycle. Nothing reaches the engine until the first render
    /// or mount.
    pub fn new(
        config: BindingConfig,
        services: BindingServices,
        props: Props,
        context: Context,
    ) -> Self {
        let display_name = config.display_name();
        let timers = ErrorTimers::default();
        let push = Arc::new(PushState {
            kind: config.kind(),
            display_name: display_name.clone(),
            last_subscription_data: Mutex::new(None),
            mounted: AtomicBool::new(false),
            render_requested: Signal::new(),
        });

        Self {
            resolver: config.resolver(),
            projector: ResultProjector::new(display_name, timers.clone()),
            config,
            services,
            props,
            context,
            phase: Phase::Unmounted,
            live: None,
            refetch: PendingRefetch::new(),
            push,
            timers,
        }
    }

    /// Where the lifecycle stands.
    pub fn state(&self) -> LifecycleState {
        match self.phase {
            Phase::Unmounted => LifecycleState::Unmounted,
            Phase::Disposed => LifecycleState::Disposed,
            Phase::Mounted if self.is_subscribed() => LifecycleState::Subscribed,
            Phase::Mounted => LifecycleState::Idle,
        }
    }

    /// The binding configuration.
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// The current props.
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// The handle currently owned, if any.
    pub fn handle(&self) -> Option<Arc<dyn QueryHandle>> {
        self.live.as_ref().map(|live| live.handle.clone())
    }

    /// Emitted whenever a push arrives while mounted.
    pub fn render_requested(&self) -> &Signal<()> {
        &self.push.render_requested
    }

    /// Number of unread-error warnings still pending.
    pub fn pending_warnings(&self) -> usize {
        self.timers.lock().active_count()
    }

    fn is_subscribed(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.subscription.is_some())
    }

    fn ensure_active(&self, action: &'static str) -> Result<()> {
        if self.phase == Phase::Disposed {
            return Err(BindingError::InvalidTransition {
                action,
                state: LifecycleState::Disposed,
            });
        }
        Ok(())
    }

    /// Produce what the component renders with.
    ///
    /// While skipped, the component's own props pass through untouched.
    ///
    /// # Errors
    ///
    /// Fails after unmount, or when options cannot be computed.
    pub fn render(&mut self) -> Result<ChildProps> {
        self.ensure_active("render")?;

        if self.config.should_skip(&self.props) {
            return Ok(ChildProps {
                props: self.props.clone(),
                result: None,
            });
        }

        let result = match self.config.kind() {
            OperationType::Mutation => OperationResult::Mutate(Mutator::new(
                self.services.engine.clone(),
                self.resolver.clone(),
                self.props.clone(),
                self.context.clone(),
            )),
            OperationType::Query => {
                let options = self.compute_options()?;
                let handle = self.ensure_handle(options);
                let deferred = (!self.is_subscribed()).then(|| self.refetch.clone());
                OperationResult::Data(self.projector.project_query(&handle, deferred))
            }
            OperationType::Subscription => {
                let options = self.compute_options()?;
                let variables = options.variables.clone();
                self.ensure_handle(options);
                let last = self.push.last_subscription_data.lock().clone();
                OperationResult::Data(self.projector.project_subscription(last.as_ref(), variables))
            }
        };

        Ok(self.config.child_props(&self.props, result, &self.context))
    }

    /// The component was attached.
    ///
    /// # Errors
    ///
    /// Fails when called twice or after unmount, or when options cannot be
    /// computed.
    pub fn mount(&mut self) -> Result<()> {
        if self.phase != Phase::Unmounted {
            return Err(BindingError::InvalidTransition {
                action: "mount",
                state: self.state(),
            });
        }

        self.phase = Phase::Mounted;
        self.push.mounted.store(true, Ordering::SeqCst);
        tracing::debug!(
            target: targets::LIFECYCLE,
            display_name = %self.config.display_name(),
            kind = %self.config.kind(),
            "mounted"
        );

        if self.config.kind() == OperationType::Mutation || self.config.should_skip(&self.props) {
            return Ok(());
        }

        if self.live.is_none() {
            let options = self.compute_options()?;
            self.ensure_handle(options);
        }
        self.attach();
        Ok(())
    }

    /// The component received new props. `props` replaces the current set.
    ///
    /// Option-update failures are not reported here; they reach the component
    /// through the next pushed result.
    ///
    /// # Errors
    ///
    /// Fails after unmount, or when options cannot be computed.
    pub fn update_props(&mut self, props: Props) -> Result<()> {
        self.ensure_active("update")?;
        self.props = props;

        if self.config.kind() == OperationType::Mutation {
            return Ok(());
        }

        if self.config.should_skip(&self.props) {
            if let Some(subscription) = self.live.as_mut().and_then(|live| live.subscription.take())
            {
                subscription.unsubscribe();
                self.refetch.detach();
                tracing::debug!(target: targets::LIFECYCLE, "skipped, subscription released");
            }
            return Ok(());
        }

        let options = self.compute_options()?;
        match self.handle() {
            Some(handle) => {
                // Engine futures run on their own; dropping this one discards
                // only the completion report.
                if handle.set_options(options).is_none() {
                    tracing::trace!(target: targets::LIFECYCLE, "handle has no option-update path");
                }
            }
            None => {
                self.ensure_handle(options);
            }
        }

        if self.phase == Phase::Mounted {
            self.resubscribe();
        }
        Ok(())
    }

    /// The component was detached.
    ///
    /// Queries hand their handle to the recycler pool before releasing their
    /// own subscription; subscriptions are released directly. A parked refetch
    /// is rejected with [`QueryError::Cancelled`] and pending warnings are
    /// dropped. Calling this again is a no-op.
    pub fn unmount(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }
        self.phase = Phase::Disposed;
        self.push.mounted.store(false, Ordering::SeqCst);

        if let Some(LiveQuery {
            handle,
            subscription,
        }) = self.live.take()
        {
            if self.config.kind() == OperationType::Query {
                self.services.pool.lock().recycle(handle);
            }
            if let Some(subscription) = subscription {
                subscription.unsubscribe();
            }
        }

        if self.refetch.cancel() {
            tracing::debug!(target: targets::LIFECYCLE, "parked refetch cancelled by unmount");
        }
        self.timers.lock().clear();

        tracing::debug!(
            target: targets::LIFECYCLE,
            display_name = %self.config.display_name(),
            "unmounted"
        );
    }

    /// Time until the next unread-error warning is due, if one is pending.
    ///
    /// Hosts use this to schedule [`process_timers`](Self::process_timers).
    pub fn time_until_next_warning(&self) -> Option<Duration> {
        self.timers.lock().time_until_next()
    }

    /// Report unread errors whose warning delay has passed.
    ///
    /// Returns how many were reported.
    pub fn process_timers(&self) -> usize {
        self.process_timers_at(Instant::now())
    }

    /// Like [`process_timers`](Self::process_timers) at a given instant.
    pub fn process_timers_at(&self, now: Instant) -> usize {
        let fired = self.timers.lock().process_expired_at(now);
        for (_, unhandled) in &fired {
            tracing::error!(
                target: targets::PROJECTION,
                error = %unhandled.error,
                "Unhandled (in {})",
                unhandled.display_name
            );
        }
        fired.len()
    }

    fn compute_options(&self) -> Result<QueryOptions> {
        self.resolver.compute(&self.props, &self.context, None)
    }

    /// Return the owned handle, creating or reusing one first if needed.
    fn ensure_handle(&mut self, options: QueryOptions) -> Arc<dyn QueryHandle> {
        if let Some(live) = &self.live {
            return live.handle.clone();
        }

        let handle = self.create_handle(options);
        self.live = Some(LiveQuery {
            handle: handle.clone(),
            subscription: None,
        });
        handle
    }

    fn create_handle(&self, options: QueryOptions) -> Arc<dyn QueryHandle> {
        let document = self.config.operation().document.clone();
        let engine = &self.services.engine;

        if self.config.kind() == OperationType::Subscription {
            tracing::debug!(target: targets::LIFECYCLE, "opening subscription handle");
            return engine.subscribe(WatchRequest {
                document,
                options,
                metadata: None,
            });
        }

        if let Some(handle) = self.services.pool.lock().reuse(&options) {
            return handle;
        }

        tracing::debug!(target: targets::LIFECYCLE, "creating query handle");
        engine.watch_query(WatchRequest {
            document,
            options,
            metadata: Some(json!({
                "component": { "displayName": self.config.display_name() }
            })),
        })
    }

    fn observer(&self) -> Observer {
        let on_next = self.push.clone();
        let on_error = self.push.clone();
        Observer::new(
            move |result| on_next.on_next(result),
            move |error| on_error.on_error(error),
        )
    }

    /// Attach a subscription unless one is active.
    fn attach(&mut self) {
        if self.is_subscribed() {
            return;
        }
        let observer = self.observer();
        let Some(live) = self.live.as_mut() else {
            return;
        };

        live.subscription = Some(live.handle.subscribe(observer));
        tracing::debug!(target: targets::LIFECYCLE, "subscribed");
        self.refetch.flush(&live.handle);
    }

    /// Replace the active subscription, attaching before detaching.
    fn resubscribe(&mut self) {
        let observer = self.observer();
        let Some(live) = self.live.as_mut() else {
            return;
        };

        let previous = live.subscription.take();
        let last_result = live.handle.last_result();
        let last_error = live.handle.last_error();

        live.subscription = Some(live.handle.subscribe(observer));
        live.handle.restore_last(last_result, last_error);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        tracing::trace!(target: targets::LIFECYCLE, "resubscribed");

        self.refetch.flush(&live.handle);
    }
}

impl Drop for QueryLifecycle {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for QueryLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryLifecycle")
            .field("display_name", &self.config.display_name())
            .field("state", &self.state())
            .field("refetch", &self.refetch)
            .finish_non_exhaustive()
    }
}
