//! The boundary between the HTTP core and the full-text engine.
//!
//! The core only talks to an engine through [`Engine`] and [`EngineIndex`].
//! [`crate::tantivy_index`] provides the production implementation; tests
//! substitute their own.

use std::path::Path;

use serde_json::{Map, Value};

use crate::query::SearchRequest;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document rejected: {0}")]
    InvalidDocument(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("index is closed")]
    Closed,

    #[error("query error: {0}")]
    Query(String),
}

/// Opens and creates indices at a storage location.
pub trait Engine: Send + Sync + 'static {
    type Index: EngineIndex;

    /// Open an index that already exists at `path`.
    fn open(&self, path: &Path) -> EngineResult<Self::Index>;

    /// Create a new index at `path` with the default analyzer bound.
    fn create(&self, path: &Path) -> EngineResult<Self::Index>;
}

/// An open index. All methods may block on I/O.
pub trait EngineIndex: Send + Sync + 'static {
    /// Add or replace the document stored under `id`.
    fn index(&self, id: &str, fields: &Map<String, Value>) -> EngineResult<()>;

    /// Remove the document stored under `id`. Unknown ids are an error.
    fn delete(&self, id: &str) -> EngineResult<()>;

    /// Execute a validated request. Match-all hits come back in ascending
    /// insertion order.
    fn search(&self, request: &SearchRequest) -> EngineResult<Vec<Hit>>;

    /// Fetch the stored representation of one document.
    fn document(&self, id: &str) -> EngineResult<StoredDocument>;

    fn doc_count(&self) -> EngineResult<u64>;

    /// Release the index. Later writes fail with [`EngineError::Closed`].
    fn close(&self) -> EngineResult<()>;
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub score: f32,
}

/// A document as the engine stores it: an ordered list of fields where a
/// name may repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Vec<StoredField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredField {
    pub name: String,
    pub value: StoredValue,
}

/// Engine-native field encodings. Decoding into client values happens in
/// [`crate::projector`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Text(String),
    Number(serde_json::Number),
    /// Timestamp in its stored textual form.
    DateTime(String),
    Boolean(bool),
}

impl StoredField {
    pub fn new(name: impl Into<String>, value: StoredValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
