//! Parsed operation descriptors.
//!
//! An [`Operation`] is the already-classified form of a GraphQL document: its
//! kind, optional name, and declared variables. Parsing the document text is
//! left to the caller; this crate only consumes the result.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A GraphQL operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A query operation (read-only).
    #[default]
    Query,
    /// A mutation operation (modifies data).
    Mutation,
    /// A subscription operation (real-time updates).
    Subscription,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        };
        f.write_str(name)
    }
}

/// A variable declared by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableDecl {
    /// Variable name without the leading `$`.
    pub name: String,
    /// Whether the declared type is non-null.
    pub required: bool,
}

/// The document an operation was derived from.
///
/// Cheap to clone; handed to the engine with every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Document(Arc<str>);

impl Document {
    /// Wrap document text.
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self(source.into())
    }

    /// The document text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A stable fingerprint of the document text.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<&str> for Document {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

/// A classified operation ready to be bound to a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Query, mutation, or subscription.
    pub kind: OperationType,
    /// The operation name, if the document declares one.
    pub name: Option<String>,
    /// Declared variables in document order.
    pub variables: Vec<VariableDecl>,
    /// Source document.
    pub document: Document,
}

impl Operation {
    /// Create a query operation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let op = Operation::query("query GetUser($id: ID!) { user(id: $id) { name } }")
    ///     .named("GetUser")
    ///     .required_variable("id");
    /// ```
    pub fn query(document: impl Into<Document>) -> Self {
        Self::new(OperationType::Query, document)
    }

    /// Create a mutation operation.
    pub fn mutation(document: impl Into<Document>) -> Self {
        Self::new(OperationType::Mutation, document)
    }

    /// Create a subscription operation.
    pub fn subscription(document: impl Into<Document>) -> Self {
        Self::new(OperationType::Subscription, document)
    }

    fn new(kind: OperationType, document: impl Into<Document>) -> Self {
        Self {
            kind,
            name: None,
            variables: Vec::new(),
            document: document.into(),
        }
    }

    /// Set the operation name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare an optional variable.
    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(VariableDecl {
            name: name.into(),
            required: false,
        });
        self
    }

    /// Declare a non-null variable.
    pub fn required_variable(mut self, name: impl Into<String>) -> Self {
        self.variables.push(VariableDecl {
            name: name.into(),
            required: true,
        });
        self
    }

    /// The name used in diagnostics; `<unnamed>` when the document has none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let op = Operation::query("query Q($id: ID!, $n: Int) { x }")
            .named("Q")
            .required_variable("id")
            .variable("n");

        assert_eq!(op.kind, OperationType::Query);
        assert_eq!(op.display_name(), "Q");
        assert_eq!(op.variables.len(), 2);
        assert!(op.variables[0].required);
        assert!(!op.variables[1].required);
    }

    #[test]
    fn test_operation_type_wire_names() {
        assert_eq!(
            serde_json::to_value(OperationType::Subscription).unwrap(),
            serde_json::json!("subscription")
        );
        assert_eq!(OperationType::Mutation.to_string(), "mutation");
    }

    #[test]
    fn test_fingerprint_is_content_based() {
        let a = Document::new("query A { a }");
        let b = Document::new("query A { a }");
        let c = Document::new("query B { b }");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(Operation::mutation("m").display_name(), "<unnamed>");
    }
}
