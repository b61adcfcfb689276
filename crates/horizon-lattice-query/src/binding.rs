//! Author-facing binding configuration and the render contract.

use std::fmt;
use std::sync::Arc;

use crate::operation::{Operation, OperationType};
use crate::options::{Context, OptionsResolver, OptionsSource, Props, QueryOptions};
use crate::projection::{DataSnapshot, Mutator, OperationResult};
use crate::recycler::ConsumerKey;

const DEFAULT_ALIAS: &str = "GraphQL";

type SkipFn = dyn Fn(&Props) -> bool + Send + Sync;
type MapPropsFn = dyn Fn(ResultEnvelope, &Context) -> Props + Send + Sync;

/// How an operation is bound to a component type.
///
/// # Example
///
/// ```ignore
/// struct UserCard;
///
/// let config = BindingConfig::new::<UserCard>(
///     Operation::query("query GetUser($id: ID!) { user(id: $id) { name } }")
///         .named("GetUser")
///         .required_variable("id"),
/// )
/// .skip(|props| props.get("id").is_none())
/// .name("user");
/// ```
#[derive(Clone)]
pub struct BindingConfig {
    operation: Arc<Operation>,
    options: OptionsSource,
    skip: Option<Arc<SkipFn>>,
    alias: String,
    name: Option<String>,
    map_props: Option<Arc<MapPropsFn>>,
    component: String,
    consumer: ConsumerKey,
}

impl BindingConfig {
    /// Bind `operation` to component type `C`.
    pub fn new<C: 'static>(operation: Operation) -> Self {
        let consumer = ConsumerKey::of::<C>().with_discriminator(operation.document.fingerprint());
        Self {
            operation: Arc::new(operation),
            options: OptionsSource::default(),
            skip: None,
            alias: DEFAULT_ALIAS.to_string(),
            name: None,
            map_props: None,
            component: short_type_name::<C>().to_string(),
            consumer,
        }
    }

    /// Use fixed options.
    pub fn options_value(mut self, options: QueryOptions) -> Self {
        self.options = OptionsSource::Value(options);
        self
    }

    /// Compute options from props and context on every render.
    pub fn options<F>(mut self, f: F) -> Self
    where
        F: Fn(&Props, &Context) -> QueryOptions + Send + Sync + 'static,
    {
        self.options = OptionsSource::computed(f);
        self
    }

    /// Skip the operation when `predicate` returns `true`.
    pub fn skip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Props) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    /// Set the label used in the display name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Expose the result under `name` instead of `data`/`mutate`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Derive extra props from the result.
    pub fn map_props<F>(mut self, f: F) -> Self
    where
        F: Fn(ResultEnvelope, &Context) -> Props + Send + Sync + 'static,
    {
        self.map_props = Some(Arc::new(f));
        self
    }

    /// Override the component name derived from the type.
    pub fn component_name(mut self, name: impl Into<String>) -> Self {
        self.component = name.into();
        self
    }

    /// The bound operation.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Query, mutation or subscription.
    pub fn kind(&self) -> OperationType {
        self.operation.kind
    }

    /// The wrapped component's name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// `<alias>(<component>)`.
    pub fn display_name(&self) -> String {
        format!("{}({})", self.alias, self.component)
    }

    /// The prop name the result is exposed under.
    pub fn result_name(&self) -> &str {
        match (&self.name, self.operation.kind) {
            (Some(name), _) => name,
            (None, OperationType::Mutation) => "mutate",
            (None, _) => "data",
        }
    }

    /// Whether the operation is skipped for `props`.
    pub fn should_skip(&self, props: &Props) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(props))
    }

    /// Pool identity of this binding.
    pub fn consumer_key(&self) -> ConsumerKey {
        self.consumer
    }

    /// An options resolver for this binding.
    pub fn resolver(&self) -> OptionsResolver {
        OptionsResolver::new(
            self.operation.clone(),
            self.options.clone(),
            self.component.clone(),
            self.display_name(),
        )
    }

    pub(crate) fn child_props(
        &self,
        own_props: &Props,
        result: OperationResult,
        context: &Context,
    ) -> ChildProps {
        let name = self.result_name().to_string();
        let mut props = own_props.clone();
        if let Some(map_props) = &self.map_props {
            let envelope = ResultEnvelope {
                name: name.clone(),
                result: result.clone(),
                own_props: own_props.clone(),
            };
            props.extend(map_props(envelope, context));
        }
        ChildProps {
            props,
            result: Some(BoundResult {
                name,
                value: result,
            }),
        }
    }
}

impl fmt::Debug for BindingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingConfig")
            .field("display_name", &self.display_name())
            .field("kind", &self.operation.kind)
            .field("result_name", &self.result_name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn short_type_name<C>() -> &'static str {
    let full = std::any::type_name::<C>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Input handed to a `map_props` function.
#[derive(Debug, Clone)]
pub struct ResultEnvelope {
    /// The result name.
    pub name: String,
    /// The projected result.
    pub result: OperationResult,
    /// The component's own props.
    pub own_props: Props,
}

/// The result as exposed to the component.
#[derive(Debug, Clone)]
pub struct BoundResult {
    /// Prop name the result lives under.
    pub name: String,
    /// The result.
    pub value: OperationResult,
}

/// What the component renders with.
#[derive(Debug, Clone)]
pub struct ChildProps {
    /// The component's own props, plus any mapped props.
    pub props: Props,
    /// The operation result; `None` while skipped.
    pub result: Option<BoundResult>,
}

impl ChildProps {
    /// The snapshot, for queries and subscriptions.
    pub fn data(&self) -> Option<&DataSnapshot> {
        self.result.as_ref().and_then(|r| r.value.as_data())
    }

    /// The mutation callable.
    pub fn mutator(&self) -> Option<&Mutator> {
        self.result.as_ref().and_then(|r| r.value.as_mutator())
    }
}
