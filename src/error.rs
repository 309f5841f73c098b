use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use crate::engine::EngineError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not open or create index '{name}': {reason}")]
    OpenFailed { name: String, reason: String },

    #[error("invalid index name: {0:?}")]
    InvalidName(String),

    #[error("missing document id")]
    MissingId,

    #[error("malformed {payload} payload: {reason}")]
    MalformedPayload { payload: Payload, reason: String },

    #[error("invalid query: {0}")]
    QueryInvalid(String),

    #[error("{op} failed: {source}")]
    EngineOperationFailed {
        op: Operation,
        #[source]
        source: EngineError,
    },

    #[error("index registry is closed")]
    RegistryClosed,

    #[error("invalid JSONP callback: {0:?}")]
    InvalidCallback(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Which request body failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Document,
    Query,
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Document => f.write_str("document"),
            Payload::Query => f.write_str("query"),
        }
    }
}

/// The engine call an [`Error::EngineOperationFailed`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Index,
    Search,
    Delete,
    Document,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Index => "index",
            Operation::Search => "search",
            Operation::Delete => "delete",
            Operation::Document => "document fetch",
        };
        f.write_str(name)
    }
}

impl Error {
    pub(crate) fn engine(op: Operation, source: EngineError) -> Self {
        Error::EngineOperationFailed { op, source }
    }

    /// Short client-facing message placed in the `status` field of a
    /// failure reply.
    pub fn status_message(&self) -> &'static str {
        match self {
            Error::OpenFailed { .. } => "Opening index error",
            Error::InvalidName(_) => "Invalid index name",
            Error::MissingId => "Missing id",
            Error::MalformedPayload { payload, .. } => match payload {
                Payload::Document => "Malformed Payload JSON",
                Payload::Query => "Error parsing query",
            },
            Error::QueryInvalid(_) => "Error validating query",
            Error::EngineOperationFailed { op, .. } => match op {
                Operation::Index => "Error indexing document",
                Operation::Search => "Error executing the query",
                Operation::Delete => "Error deleting document",
                Operation::Document => "Error opening document",
            },
            Error::RegistryClosed => "Server is shutting down",
            Error::InvalidCallback(_) => "Invalid callback",
            Error::Io(_) | Error::Config(_) | Error::Task(_) => "Internal error",
        }
    }

    /// Everything a request can cause is a client error; only failures of
    /// the process itself are reported as 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Io(_) | Error::Config(_) | Error::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        debug!(error = %self, "request failed");
        let body = Json(json!({ "status": self.status_message() }));
        (self.status_code(), body).into_response()
    }
}
