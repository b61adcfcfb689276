//! Result types reported by the execution engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;
use crate::options::DataMap;

/// A GraphQL error returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Attach a field path.
    pub fn at(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at ")?;
            for (i, segment) in path.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                match segment {
                    PathSegment::Field(name) => write!(f, "{}", name)?,
                    PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A location in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// A segment in an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// An array index.
    Index(usize),
}

/// Network state of a handle, using the engine's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NetworkStatus {
    /// First request in flight.
    #[default]
    Loading = 1,
    /// Variables changed and a request is in flight.
    SetVariables = 2,
    /// A `fetch_more` request is in flight.
    FetchMore = 3,
    /// A `refetch` request is in flight.
    Refetch = 4,
    /// A polling request is in flight.
    Poll = 6,
    /// No request in flight, no error.
    Ready = 7,
    /// No request in flight, the last one failed.
    Error = 8,
}

impl NetworkStatus {
    /// Whether a request is currently in flight.
    pub fn is_in_flight(self) -> bool {
        (self as u8) < 7
    }
}

impl From<NetworkStatus> for u8 {
    fn from(status: NetworkStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for NetworkStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, String> {
        match code {
            1 => Ok(Self::Loading),
            2 => Ok(Self::SetVariables),
            3 => Ok(Self::FetchMore),
            4 => Ok(Self::Refetch),
            6 => Ok(Self::Poll),
            7 => Ok(Self::Ready),
            8 => Ok(Self::Error),
            other => Err(format!("unknown network status {other}")),
        }
    }
}

/// A result snapshot of a handle, either pulled or pushed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Result fields, possibly partial while loading.
    pub data: Option<DataMap>,
    /// Whether a request is still outstanding.
    pub loading: bool,
    /// The failure carried by this result, if any.
    pub error: Option<QueryError>,
    /// Network state when the result was produced.
    pub network_status: NetworkStatus,
}

impl QueryResult {
    /// A result for a request that has not answered yet.
    pub fn loading() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
            network_status: NetworkStatus::Loading,
        }
    }

    /// A completed result carrying data.
    pub fn ready(data: DataMap) -> Self {
        Self {
            data: Some(data),
            loading: false,
            error: None,
            network_status: NetworkStatus::Ready,
        }
    }

    /// A completed result carrying only an error.
    pub fn failed(error: QueryError) -> Self {
        Self {
            data: None,
            loading: false,
            error: Some(error),
            network_status: NetworkStatus::Error,
        }
    }

    /// Set partial data on a result.
    pub fn with_data(mut self, data: DataMap) -> Self {
        self.data = Some(data);
        self
    }

    /// Top-level field names of the data, if any.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.data.iter().flat_map(|d| d.keys().map(String::as_str))
    }
}
