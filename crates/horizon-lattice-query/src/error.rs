//! Error types for operation bindings.

use crate::lifecycle::LifecycleState;
use crate::result::GraphQLError;

/// A specialized Result type for binding operations.
pub type Result<T> = std::result::Result<T, BindingError>;

/// Failures reported by the execution engine.
///
/// These travel inside results and snapshots; consumers read them from the
/// projected `error` field rather than receiving them as `Err` values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The server answered with GraphQL errors.
    #[error("GraphQL error: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    /// The request never produced a GraphQL response.
    #[error("Network error: {0}")]
    Network(String),

    /// The request was abandoned before it could be issued.
    #[error("Request was cancelled")]
    Cancelled,

    /// Any other engine failure.
    #[error("{0}")]
    Other(String),
}

impl QueryError {
    /// Create a GraphQL error with a single message.
    pub fn graphql(message: impl Into<String>) -> Self {
        Self::GraphQL(vec![GraphQLError::new(message)])
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Whether the error carries structured GraphQL errors.
    ///
    /// Only these are recovered into the result stream; everything else is
    /// re-raised by the binding.
    pub fn has_graphql_errors(&self) -> bool {
        matches!(self, Self::GraphQL(_))
    }
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by the binding layer itself.
///
/// Configuration and shape errors are programming errors and fail fast.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BindingError {
    /// A required operation variable has no matching prop.
    #[error(
        "The operation '{operation}' wrapping '{component}' is expecting a variable: \
         '{variable}' but it was not found in the props passed to '{display_name}'"
    )]
    MissingVariable {
        operation: String,
        component: String,
        variable: String,
        display_name: String,
    },

    /// Pushed data contains keys owned by the binding's result object.
    #[error(
        "the result of the '{display_name}' operation contains keys that conflict with the \
         return object. {} not allowed.",
        quote_keys(.keys)
    )]
    ResultFieldClash {
        display_name: String,
        keys: Vec<String>,
    },

    /// A pushed error without GraphQL errors; not recoverable by the binding.
    #[error("Unhandled (in {display_name}): {source}")]
    UnhandledQuery {
        display_name: String,
        #[source]
        source: QueryError,
    },

    /// A lifecycle hook was invoked in a state that does not allow it.
    #[error("cannot {action} a binding in state {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: LifecycleState,
    },
}

fn quote_keys(keys: &[String]) -> String {
    keys.iter()
        .map(|k| format!("'{k}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BindingError {
    /// Create a missing-variable error.
    pub fn missing_variable(
        operation: impl Into<String>,
        component: impl Into<String>,
        variable: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self::MissingVariable {
            operation: operation.into(),
            component: component.into(),
            variable: variable.into(),
            display_name: display_name.into(),
        }
    }

    /// The offending variable, for [`BindingError::MissingVariable`].
    pub fn missing_variable_name(&self) -> Option<&str> {
        match self {
            Self::MissingVariable { variable, .. } => Some(variable),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_message() {
        let err = BindingError::missing_variable("GetUser", "UserCard", "id", "GraphQL(UserCard)");
        assert_eq!(
            err.to_string(),
            "The operation 'GetUser' wrapping 'UserCard' is expecting a variable: 'id' \
             but it was not found in the props passed to 'GraphQL(UserCard)'"
        );
        assert_eq!(err.missing_variable_name(), Some("id"));
    }

    #[test]
    fn test_clash_message_lists_keys() {
        let err = BindingError::ResultFieldClash {
            display_name: "GraphQL(List)".into(),
            keys: vec!["refetch".into(), "variables".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'refetch', 'variables' not allowed."));
        assert!(msg.contains("GraphQL(List)"));
    }

    #[test]
    fn test_graphql_marker() {
        assert!(QueryError::graphql("boom").has_graphql_errors());
        assert!(!QueryError::network("down").has_graphql_errors());
        assert!(!QueryError::Cancelled.has_graphql_errors());
    }

    #[test]
    fn test_graphql_display_joins_messages() {
        let err = QueryError::GraphQL(vec![GraphQLError::new("a"), GraphQLError::new("b")]);
        assert_eq!(err.to_string(), "GraphQL error: a; b");
    }
}
