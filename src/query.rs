use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_SIZE: usize = 10;

/// A search request as posted to `/api/search/{index}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: SearchQuery,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default)]
    pub from: usize,
}

fn default_size() -> usize {
    DEFAULT_SIZE
}

/// Query tree accepted by the engine.
///
/// Shapes are distinguished by their keys:
/// `{"match_all": {}}`, `{"query": "body.title:rust"}`,
/// `{"match": "hello", "field": "title"}`, `{"term": "x", "field": "tag"}`,
/// `{"conjuncts": [...]}`, `{"disjuncts": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchQuery {
    MatchAll {
        match_all: MatchAllOptions,
    },
    QueryString {
        query: String,
    },
    Match {
        #[serde(rename = "match")]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    Term {
        term: String,
        field: String,
    },
    Conjuncts {
        conjuncts: Vec<SearchQuery>,
    },
    Disjuncts {
        disjuncts: Vec<SearchQuery>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchAllOptions {}

impl SearchRequest {
    /// Parse a request body. Bodies that are not JSON or do not match any
    /// query shape are malformed.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| Error::MalformedPayload {
            payload: crate::error::Payload::Query,
            reason: e.to_string(),
        })
    }

    pub fn match_all(size: usize, from: usize) -> Self {
        Self {
            query: SearchQuery::match_all(),
            size,
            from,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.query.validate()
    }
}

impl SearchQuery {
    pub fn match_all() -> Self {
        SearchQuery::MatchAll {
            match_all: MatchAllOptions::default(),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, SearchQuery::MatchAll { .. })
    }

    /// Reject structurally invalid queries before they reach the engine.
    pub fn validate(&self) -> Result<()> {
        match self {
            SearchQuery::MatchAll { .. } => Ok(()),
            SearchQuery::QueryString { query } => {
                non_empty("query string", query)
            }
            SearchQuery::Match { text, field } => {
                non_empty("match text", text)?;
                match field {
                    Some(field) => non_empty("field", field),
                    None => Ok(()),
                }
            }
            SearchQuery::Term { term, field } => {
                non_empty("term", term)?;
                non_empty("field", field)
            }
            SearchQuery::Conjuncts { conjuncts } => {
                if conjuncts.is_empty() {
                    return Err(invalid("conjunction has no clauses"));
                }
                conjuncts.iter().try_for_each(SearchQuery::validate)
            }
            SearchQuery::Disjuncts { disjuncts } => {
                if disjuncts.is_empty() {
                    return Err(invalid("disjunction has no clauses"));
                }
                disjuncts.iter().try_for_each(SearchQuery::validate)
            }
        }
    }
}

fn non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(invalid(format!("{what} is empty")))
    } else {
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::QueryInvalid(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<SearchRequest> {
        SearchRequest::from_slice(json.as_bytes())
    }

    #[test]
    fn parses_each_shape() {
        let req = parse(r#"{"query": {"match_all": {}}}"#).unwrap();
        assert!(req.query.is_match_all());
        assert_eq!(req.size, 10);
        assert_eq!(req.from, 0);

        let req = parse(r#"{"query": {"query": "body.title:rust"}, "size": 3}"#)
            .unwrap();
        assert_eq!(
            req.query,
            SearchQuery::QueryString {
                query: "body.title:rust".to_string()
            }
        );
        assert_eq!(req.size, 3);

        let req =
            parse(r#"{"query": {"match": "hello", "field": "title"}}"#)
                .unwrap();
        assert_eq!(
            req.query,
            SearchQuery::Match {
                text: "hello".to_string(),
                field: Some("title".to_string()),
            }
        );

        let req = parse(
            r#"{"query": {"disjuncts": [{"term": "a", "field": "tag"},
                {"match": "b"}]}, "from": 5}"#,
        )
        .unwrap();
        assert_eq!(req.from, 5);
        assert!(matches!(
            req.query,
            SearchQuery::Disjuncts { ref disjuncts } if disjuncts.len() == 2
        ));
    }

    #[test]
    fn unknown_shape_is_malformed() {
        let err = parse(r#"{"query": {"fuzzy": "x"}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));

        let err = parse("not json").unwrap_err();
        assert_eq!(err.status_message(), "Error parsing query");
    }

    #[test]
    fn validation_rejects_empty_parts() {
        let cases = [
            r#"{"query": {"query": "  "}}"#,
            r#"{"query": {"match": ""}}"#,
            r#"{"query": {"term": "x", "field": ""}}"#,
            r#"{"query": {"conjuncts": []}}"#,
            r#"{"query": {"disjuncts": []}}"#,
            r#"{"query": {"conjuncts": [{"match_all": {}}, {"query": ""}]}}"#,
        ];
        for case in cases {
            let req = parse(case).unwrap();
            assert!(
                matches!(req.validate(), Err(Error::QueryInvalid(_))),
                "expected {case} to fail validation"
            );
        }
    }

    #[test]
    fn validation_accepts_well_formed_queries() {
        let req = parse(
            r#"{"query": {"conjuncts": [{"match": "hello"},
                {"term": "news", "field": "tag"}]}}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert!(SearchRequest::match_all(20, 0).validate().is_ok());
    }
}
