//! Option resolution for bound operations.
//!
//! Options are built fresh on every computation by layering, in increasing
//! precedence:
//!
//! 1. the component's own props,
//! 2. the binding's options value or function,
//! 3. per-call overrides,
//! 4. per-call variable overrides (merged into the computed variables).
//!
//! When no layer supplies `variables` and the operation declares some, they are
//! synthesized from props.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BindingError, Result};
use crate::operation::Operation;

/// Component input properties.
pub type Props = Map<String, Value>;

/// Ambient values supplied by the component tree.
pub type Context = Map<String, Value>;

/// Operation variables.
pub type Variables = Map<String, Value>;

/// Result fields of an operation.
pub type DataMap = Map<String, Value>;

/// How the engine should consult its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve from cache when possible, otherwise fetch.
    #[default]
    CacheFirst,
    /// Serve from cache and fetch in parallel.
    CacheAndNetwork,
    /// Always fetch, then write to the cache.
    NetworkOnly,
    /// Never fetch.
    CacheOnly,
    /// Always fetch and bypass the cache.
    NoCache,
    /// Stay dormant: no fetching or polling, but keep observers attached.
    Standby,
}

/// Options handed to the engine for a watch, subscribe or mutate request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOptions {
    /// Bound variables. `None` means no layer supplied any.
    pub variables: Option<Variables>,
    /// Cache policy.
    pub fetch_policy: Option<FetchPolicy>,
    /// Polling interval. Zero disables polling.
    pub poll_interval: Option<Duration>,
    /// Whether the handle should execute requests at all.
    pub fetch_results: Option<bool>,
    /// Passthrough keys the binding does not interpret.
    pub extra: Props,
}

impl QueryOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that put a handle into dormant standby mode.
    pub fn standby() -> Self {
        Self {
            fetch_policy: Some(FetchPolicy::Standby),
            poll_interval: Some(Duration::ZERO),
            fetch_results: Some(false),
            ..Self::default()
        }
    }

    /// Read options from a props-like map.
    ///
    /// `variables`, `fetchPolicy` and `pollInterval` (milliseconds) are
    /// recognized; values that do not parse, and every other key, are kept as
    /// passthrough.
    pub fn from_props(props: &Props) -> Self {
        let mut options = Self::default();
        for (key, value) in props {
            match key.as_str() {
                "variables" => {
                    if let Value::Object(vars) = value {
                        options.variables = Some(vars.clone());
                        continue;
                    }
                }
                "fetchPolicy" => {
                    if let Ok(policy) = serde_json::from_value(value.clone()) {
                        options.fetch_policy = Some(policy);
                        continue;
                    }
                }
                "pollInterval" => {
                    if let Some(ms) = value.as_u64() {
                        options.poll_interval = Some(Duration::from_millis(ms));
                        continue;
                    }
                }
                _ => {}
            }
            options.extra.insert(key.clone(), value.clone());
        }
        options
    }

    /// Layer `over` on top of `self`; fields set in `over` win.
    pub fn overlay(mut self, over: QueryOptions) -> Self {
        if over.variables.is_some() {
            self.variables = over.variables;
        }
        if over.fetch_policy.is_some() {
            self.fetch_policy = over.fetch_policy;
        }
        if over.poll_interval.is_some() {
            self.poll_interval = over.poll_interval;
        }
        if over.fetch_results.is_some() {
            self.fetch_results = over.fetch_results;
        }
        self.extra.extend(over.extra);
        self
    }

    /// Set all variables.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Set a single variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables
            .get_or_insert_with(Variables::new)
            .insert(name.into(), value.into());
        self
    }

    /// Set the fetch policy.
    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    /// Set the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// The bound variables, or an empty map.
    pub fn variables_or_empty(&self) -> Variables {
        self.variables.clone().unwrap_or_default()
    }
}

type OptionsFn = dyn Fn(&Props, &Context) -> QueryOptions + Send + Sync;

/// The binding author's options: a fixed value or a function of props and context.
#[derive(Clone)]
pub enum OptionsSource {
    /// Fixed options.
    Value(QueryOptions),
    /// Options computed per render.
    Computed(Arc<OptionsFn>),
}

impl OptionsSource {
    /// Wrap an options function.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Props, &Context) -> QueryOptions + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    fn resolve(&self, props: &Props, context: &Context) -> QueryOptions {
        match self {
            Self::Value(options) => options.clone(),
            Self::Computed(f) => f(props, context),
        }
    }
}

impl Default for OptionsSource {
    fn default() -> Self {
        Self::Value(QueryOptions::default())
    }
}

impl fmt::Debug for OptionsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(options) => f.debug_tuple("Value").field(options).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

/// Computes options for one binding.
#[derive(Debug, Clone)]
pub struct OptionsResolver {
    operation: Arc<Operation>,
    source: OptionsSource,
    component: String,
    display_name: String,
}

impl OptionsResolver {
    /// Create a resolver for an operation bound to a named component.
    pub fn new(
        operation: Arc<Operation>,
        source: OptionsSource,
        component: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            source,
            component: component.into(),
            display_name: display_name.into(),
        }
    }

    /// The operation being resolved for.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Compute options for the given props, context and per-call overrides.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::MissingVariable`] when a non-null variable is
    /// declared, no layer supplied `variables`, and props have no value for it.
    pub fn compute(
        &self,
        props: &Props,
        context: &Context,
        overrides: Option<QueryOptions>,
    ) -> Result<QueryOptions> {
        let mut options =
            QueryOptions::from_props(props).overlay(self.source.resolve(props, context));

        if let Some(mut overrides) = overrides {
            if let Some(vars) = overrides.variables.take() {
                let mut merged = options.variables.take().unwrap_or_default();
                merged.extend(vars);
                overrides.variables = Some(merged);
            }
            options = options.overlay(overrides);
        }

        if options.variables.is_some() || self.operation.variables.is_empty() {
            return Ok(options);
        }

        let mut variables = Variables::new();
        for decl in &self.operation.variables {
            match props.get(&decl.name) {
                Some(value) => {
                    variables.insert(decl.name.clone(), value.clone());
                }
                None if !decl.required => {
                    variables.insert(decl.name.clone(), Value::Null);
                }
                None => {
                    return Err(BindingError::missing_variable(
                        self.operation.display_name(),
                        &self.component,
                        &decl.name,
                        &self.display_name,
                    ));
                }
            }
        }
        options.variables = Some(variables);
        Ok(options)
    }
}
