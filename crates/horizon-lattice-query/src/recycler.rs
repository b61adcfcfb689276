//! Pooling of retired query handles.
//!
//! When a bound component unmounts, its query handle is parked in a
//! [`RecyclerPool`] in standby mode instead of being torn down. The next
//! component of the same kind that mounts with the same variables picks it up
//! and avoids a second network request.
//!
//! Pools are keyed by [`ConsumerKey`] in a [`RecyclerRegistry`]; two kinds of
//! binding never share handles.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::engine::{Observer, QueryHandle, Subscription};
use crate::logging::targets;
use crate::options::{QueryOptions, Variables};

/// A retired handle kept alive by a no-op subscription.
struct PooledQuery {
    handle: Arc<dyn QueryHandle>,
    standby: Box<dyn Subscription>,
}

/// A LIFO stack of retired handles for one kind of binding.
#[derive(Default)]
pub struct RecyclerPool {
    entries: Vec<PooledQuery>,
}

impl RecyclerPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a handle into standby and park it.
    ///
    /// Ownership of the handle moves to the pool.
    pub fn recycle(&mut self, handle: Arc<dyn QueryHandle>) {
        // The update runs on its own; only its side effect matters here.
        drop(handle.set_options(QueryOptions::standby()));
        let standby = handle.subscribe(Observer::noop());
        self.entries.push(PooledQuery { handle, standby });

        tracing::trace!(target: targets::RECYCLER, pooled = self.entries.len(), "handle recycled");
    }

    /// Take the most recently recycled handle if it is bound to the same
    /// variables as `options`.
    ///
    /// The candidate's standby subscription is always released. A candidate
    /// with different variables is discarded for good and `None` is returned.
    pub fn reuse(&mut self, options: &QueryOptions) -> Option<Arc<dyn QueryHandle>> {
        let PooledQuery { handle, standby } = self.entries.pop()?;
        standby.unsubscribe();

        let requested = options.variables_or_empty();
        if !shallow_equal(&requested, &handle.variables()) {
            tracing::debug!(
                target: targets::RECYCLER,
                pooled = self.entries.len(),
                "recycled handle discarded, variables differ"
            );
            return None;
        }

        let mut wake = options.clone();
        wake.poll_interval = Some(options.poll_interval.unwrap_or(Duration::ZERO));
        wake.fetch_policy = Some(options.fetch_policy.unwrap_or_default());
        wake.fetch_results = Some(true);
        drop(handle.set_options(wake));

        tracing::debug!(target: targets::RECYCLER, pooled = self.entries.len(), "handle reused");
        Some(handle)
    }

    /// Number of parked handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every parked handle.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.standby.unsubscribe();
        }
    }
}

impl Drop for RecyclerPool {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for RecyclerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecyclerPool")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// One-level equality of two variable maps.
pub fn shallow_equal(a: &Variables, b: &Variables) -> bool {
    a.len() == b.len() && a.iter().all(|(key, value)| b.get(key) == Some(value))
}

/// Identity of a kind of binding.
///
/// The wrapped component's type plus a discriminator, so that one component
/// type bound to two different operations gets two pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerKey {
    type_id: TypeId,
    discriminator: u64,
}

impl ConsumerKey {
    /// The key for component type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            discriminator: 0,
        }
    }

    /// Refine the key with a discriminator.
    pub fn with_discriminator(mut self, discriminator: u64) -> Self {
        self.discriminator = discriminator;
        self
    }
}

/// A shared pool for one consumer key.
pub type SharedPool = Arc<Mutex<RecyclerPool>>;

/// All pools owned by one provider.
#[derive(Debug, Default)]
pub struct RecyclerRegistry {
    pools: Mutex<HashMap<ConsumerKey, SharedPool>>,
}

impl RecyclerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool for `key`, created on first use.
    pub fn pool(&self, key: ConsumerKey) -> SharedPool {
        self.pools.lock().entry(key).or_default().clone()
    }

    /// Drop every pool, releasing all parked handles.
    ///
    /// Lifecycles that still hold an old pool keep working against it, but
    /// new lookups get fresh pools.
    pub fn reset(&self) {
        let pools: Vec<SharedPool> = self.pools.lock().drain().map(|(_, pool)| pool).collect();
        for pool in &pools {
            pool.lock().clear();
        }
        tracing::debug!(target: targets::RECYCLER, pools = pools.len(), "recycler pools reset");
    }

    /// Number of pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.lock().len()
    }
}
