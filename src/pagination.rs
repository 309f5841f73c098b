//! Newest-first listing on top of a match-all query.
//!
//! The engine returns match-all hits in insertion order, so a page of the
//! newest documents is the window ending `start` documents before the end,
//! reversed.

use tracing::{debug, warn};

use crate::{
    engine::{EngineError, EngineIndex},
    error::{Error, Operation, Result},
    model::ProjectedDocument,
    projector::project,
    query::SearchRequest,
};

pub const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingWindow {
    /// Number of newest documents to skip.
    pub start: usize,
    pub limit: usize,
}

impl Default for ListingWindow {
    fn default() -> Self {
        Self {
            start: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ListingWindow {
    /// Build a window from raw query parameters. Missing, blank or
    /// unparsable values fall back to the defaults.
    pub fn from_params(start: Option<&str>, limit: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            start: parse_or(start, defaults.start),
            limit: parse_or(limit, defaults.limit),
        }
    }

    /// The match-all request covering this window, or `None` when the
    /// window is empty.
    pub fn plan(&self, total: u64) -> Option<SearchRequest> {
        let total = usize::try_from(total).unwrap_or(usize::MAX);
        let remaining = total.checked_sub(self.start)?;
        let size = self.limit.min(remaining);
        if size == 0 {
            return None;
        }
        Some(SearchRequest::match_all(size, remaining - size))
    }
}

fn parse_or(raw: Option<&str>, default: usize) -> usize {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// List one page of `index`, most recently indexed first.
///
/// A failing document count degrades to an empty listing.
pub fn page<I: EngineIndex>(
    index: &I,
    name: &str,
    window: ListingWindow,
) -> Result<Vec<ProjectedDocument>> {
    let total = index.doc_count().unwrap_or_else(|e| {
        warn!(index = name, error = %e, "document count failed, listing nothing");
        0
    });

    let Some(request) = window.plan(total) else {
        return Ok(Vec::new());
    };

    let hits = index
        .search(&request)
        .map_err(|e| Error::engine(Operation::Search, e))?;

    let mut docs = Vec::with_capacity(hits.len());
    for hit in hits.iter().rev() {
        match index.document(&hit.id) {
            Ok(doc) => docs.push(project(&doc)),
            // Deleted between the search and the fetch.
            Err(EngineError::NotFound(_)) => {
                debug!(index = name, id = %hit.id, "listed document vanished");
            }
            Err(e) => return Err(Error::engine(Operation::Document, e)),
        }
    }
    Ok(docs)
}
