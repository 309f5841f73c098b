//! The operations behind each HTTP route, independent of the transport.
//!
//! Every call resolves its index through the shared registry and then runs
//! one engine operation. All methods block on engine I/O; async callers are
//! expected to run them on a blocking thread.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    engine::{Engine, EngineIndex},
    error::{Error, Operation, Payload, Result},
    model::ProjectedDocument,
    pagination::{self, ListingWindow},
    projector::project,
    query::SearchRequest,
    registry::IndexRegistry,
};

pub struct Service<E: Engine> {
    registry: Arc<IndexRegistry<E>>,
}

impl<E: Engine> Clone for Service<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: Engine> Service<E> {
    pub fn new(registry: Arc<IndexRegistry<E>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<IndexRegistry<E>> {
        &self.registry
    }

    /// Add or replace `doc_id` in `index` with the JSON object in `body`.
    ///
    /// The id and body are checked before the index is resolved, so a bad
    /// request never creates an index or touches an existing one.
    pub fn index_document(
        &self,
        index: &str,
        doc_id: &str,
        body: &[u8],
    ) -> Result<()> {
        require_id(doc_id)?;
        let fields = parse_document(body)?;

        let handle = self.registry.resolve(index)?;
        handle
            .index(doc_id, &fields)
            .map_err(|e| Error::engine(Operation::Index, e))?;
        debug!(index, doc_id, fields = fields.len(), "indexed document");
        Ok(())
    }

    /// Run the query in `body` and return the matching ids in hit order.
    pub fn search(&self, index: &str, body: &[u8]) -> Result<Vec<String>> {
        let request = SearchRequest::from_slice(body)?;
        request.validate()?;

        let handle = self.registry.resolve(index)?;
        let hits = handle
            .search(&request)
            .map_err(|e| Error::engine(Operation::Search, e))?;
        debug!(index, hits = hits.len(), "search executed");
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    pub fn get_document(
        &self,
        index: &str,
        doc_id: &str,
    ) -> Result<ProjectedDocument> {
        require_id(doc_id)?;
        let handle = self.registry.resolve(index)?;
        let stored = handle
            .document(doc_id)
            .map_err(|e| Error::engine(Operation::Document, e))?;
        Ok(project(&stored))
    }

    /// One page of `index`, newest first.
    pub fn list(
        &self,
        index: &str,
        window: ListingWindow,
    ) -> Result<Vec<ProjectedDocument>> {
        let handle = self.registry.resolve(index)?;
        pagination::page(handle.as_ref(), index, window)
    }

    pub fn delete(&self, index: &str, doc_id: &str) -> Result<()> {
        require_id(doc_id)?;
        let handle = self.registry.resolve(index)?;
        handle
            .delete(doc_id)
            .map_err(|e| Error::engine(Operation::Delete, e))?;
        debug!(index, doc_id, "deleted document");
        Ok(())
    }
}

fn require_id(doc_id: &str) -> Result<()> {
    if doc_id.is_empty() {
        return Err(Error::MissingId);
    }
    Ok(())
}

fn parse_document(body: &[u8]) -> Result<Map<String, Value>> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedPayload {
        payload: Payload::Document,
        reason: e.to_string(),
    })
}
