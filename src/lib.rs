//! docsift - named full-text search indices served over HTTP.
//!
//! Each index lives in its own directory under a base directory and is
//! opened, or created with a CJK-aware analyzer, the first time a request
//! names it. Documents are arbitrary JSON objects; they can be searched,
//! fetched by id, listed newest first, and deleted.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docsift::{BaseDir, IndexRegistry, Service, TantivyEngine};
//! use docsift::pagination::ListingWindow;
//!
//! let base = BaseDir::resolve("index".as_ref()).unwrap();
//! let registry = Arc::new(IndexRegistry::new(TantivyEngine, base));
//! let service = Service::new(registry);
//!
//! service
//!     .index_document("articles", "a1", br#"{"title": "hello"}"#)
//!     .unwrap();
//! for doc in service.list("articles", ListingWindow::default()).unwrap() {
//!     println!("{}", doc.id);
//! }
//! ```

pub mod analysis;
pub mod base_dir;
pub mod cli;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod pagination;
pub mod projector;
pub mod query;
pub mod registry;
pub mod server;
pub mod service;
pub mod tantivy_index;

#[cfg(test)]
mod testing;

pub use base_dir::BaseDir;
pub use engine::{Engine, EngineIndex};
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, ServerConfig, ShutdownTrigger};
pub use model::{FieldValue, ProjectedDocument};
pub use registry::IndexRegistry;
pub use service::Service;
pub use tantivy_index::TantivyEngine;
