//! The shared root that hands bindings their engine and recycler pool.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::binding::BindingConfig;
use crate::engine::{self, QueryEngine};
use crate::lifecycle::QueryLifecycle;
use crate::logging::targets;
use crate::options::{Context, Props};
use crate::recycler::{ConsumerKey, RecyclerPool, RecyclerRegistry, SharedPool};

/// Everything a lifecycle needs from its surroundings.
#[derive(Clone)]
pub struct BindingServices {
    /// The execution engine.
    pub engine: Arc<dyn QueryEngine>,
    /// The pool for this binding's consumer key.
    pub pool: SharedPool,
}

impl BindingServices {
    /// Services with a private, unshared pool.
    pub fn standalone(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            engine,
            pool: Arc::new(Mutex::new(RecyclerPool::new())),
        }
    }
}

impl std::fmt::Debug for BindingServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingServices")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Owns the current engine client and the recycler pools built against it.
///
/// # Example
///
/// ```ignore
/// let provider = QueryProvider::new(Arc::new(client));
/// let mut binding = provider.bind(config, props, Context::new());
/// let child = binding.render()?;
/// binding.mount()?;
/// ```
pub struct QueryProvider {
    engine: RwLock<Arc<dyn QueryEngine>>,
    recyclers: RecyclerRegistry,
}

impl QueryProvider {
    /// Create a provider around an engine.
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            engine: RwLock::new(engine),
            recyclers: RecyclerRegistry::new(),
        }
    }

    /// The current engine.
    pub fn engine(&self) -> Arc<dyn QueryEngine> {
        self.engine.read().clone()
    }

    /// Replace the engine.
    ///
    /// Handing in a different engine instance invalidates every pooled handle,
    /// since they belong to the old one. Returns whether that happened.
    pub fn set_engine(&self, engine: Arc<dyn QueryEngine>) -> bool {
        {
            let mut current = self.engine.write();
            if engine::same_engine(&current, &engine) {
                return false;
            }
            *current = engine;
        }
        self.recyclers.reset();
        tracing::info!(target: targets::PROVIDER, "engine replaced, recycler pools reset");
        true
    }

    /// The pools owned by this provider.
    pub fn recyclers(&self) -> &RecyclerRegistry {
        &self.recyclers
    }

    /// Services for bindings with the given consumer key.
    pub fn services(&self, key: ConsumerKey) -> BindingServices {
        BindingServices {
            engine: self.engine(),
            pool: self.recyclers.pool(key),
        }
    }

    /// Create a lifecycle for one component instance.
    pub fn bind(&self, config: BindingConfig, props: Props, context: Context) -> QueryLifecycle {
        let services = self.services(config.consumer_key());
        QueryLifecycle::new(config, services, props, context)
    }
}

impl std::fmt::Debug for QueryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryProvider")
            .field("pools", &self.recyclers.pool_count())
            .finish_non_exhaustive()
    }
}
