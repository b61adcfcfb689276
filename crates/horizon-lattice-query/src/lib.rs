//! Declarative GraphQL operation binding for Horizon Lattice components.
//!
//! This crate attaches a query, mutation or subscription to a component type
//! and keeps the component's view of the operation current:
//!
//! - **Lifecycle**: one [`QueryLifecycle`] per component instance owns the
//!   engine handle, subscribes on mount, reconfigures on props updates and
//!   releases everything on unmount
//! - **Recycling**: handles of unmounted query components are parked in a
//!   [`RecyclerPool`] so an equivalent component mounting next reuses them
//!   instead of fetching again
//! - **Options**: an [`OptionsResolver`] layers props, binding options and
//!   per-call overrides, and fills declared variables from props
//! - **Projection**: a [`ResultProjector`] turns handle results into
//!   [`DataSnapshot`]s that keep stale data visible while reloading
//!
//! Network transport and caching are not part of this crate. Bindings drive an
//! execution engine through the [`QueryEngine`] and [`QueryHandle`] traits.
//! An in-memory engine for tests is available behind the `mock` feature.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_lattice_query::prelude::*;
//!
//! struct UserCard;
//!
//! let provider = QueryProvider::new(Arc::new(client));
//!
//! let config = BindingConfig::new::<UserCard>(
//!     Operation::query("query GetUser($id: ID!) { user(id: $id) { name } }")
//!         .named("GetUser")
//!         .required_variable("id"),
//! );
//!
//! let mut binding = provider.bind(config, props, Context::new());
//! binding.render_requested().connect(|_| schedule_render());
//!
//! let child = binding.render()?;
//! binding.mount()?;
//!
//! if let Some(data) = child.data() {
//!     if let Some(error) = data.error() {
//!         show_error(error);
//!     } else if !data.loading {
//!         show_user(data.field("user"));
//!     }
//! }
//! ```
//!
//! # Unread errors
//!
//! A snapshot carrying an error that nobody reads within
//! [`UNREAD_ERROR_DELAY`](projection::UNREAD_ERROR_DELAY) is reported at
//! `error` level on the `horizon_lattice_query::projection` target. Hosts call
//! [`QueryLifecycle::process_timers`] from their event loop to drive this.

pub mod binding;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod operation;
pub mod options;
pub mod projection;
pub mod provider;
pub mod recycler;
pub mod refetch;
pub mod result;
pub mod signal;
pub mod timer;

pub use binding::{BindingConfig, BoundResult, ChildProps, ResultEnvelope};
pub use engine::{
    EngineFuture, FetchMoreOptions, MutationRequest, Observer, QueryEngine, QueryHandle,
    SubscribeToMoreOptions, Subscription, WatchRequest,
};
pub use error::{BindingError, QueryError, Result};
pub use lifecycle::{LifecycleState, QueryLifecycle};
pub use operation::{Document, Operation, OperationType, VariableDecl};
pub use options::{
    Context, DataMap, FetchPolicy, OptionsResolver, OptionsSource, Props, QueryOptions, Variables,
};
pub use projection::{
    DataSnapshot, MutationCall, Mutator, OperationResult, QueryControls, ResultProjector,
};
pub use provider::{BindingServices, QueryProvider};
pub use recycler::{ConsumerKey, RecyclerPool, RecyclerRegistry};
pub use result::{GraphQLError, NetworkStatus, QueryResult};
pub use signal::{ConnectionId, Signal};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::binding::{BindingConfig, ChildProps};
    pub use crate::error::{BindingError, QueryError};
    pub use crate::lifecycle::{LifecycleState, QueryLifecycle};
    pub use crate::operation::Operation;
    pub use crate::options::{Context, FetchPolicy, Props, QueryOptions};
    pub use crate::projection::{DataSnapshot, MutationCall};
    pub use crate::provider::QueryProvider;
    pub use crate::engine::{QueryEngine, QueryHandle};
}
