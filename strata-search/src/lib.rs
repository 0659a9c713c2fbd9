//! # strata-search — search-index backend for Strata
//!
//! Implements the Strata contracts over the Elasticsearch REST API with
//! `reqwest`. An entity is one document: the primary key is its `_id`,
//! every other column a `_source` field.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SearchResource`] | HTTP client + cluster URL implementing `Resource` |
//! | [`SearchRepository`] | Create/Update/Delete with query DSL filters and JSON patches |
//! | [`SearchQuery`] | Fluent query builder; `exec` sends a raw search body |
//! | [`SearchUnitOfWork`] | Queued [`SearchRequest`]s, sent one by one on commit |
//! | [`HttpErrorExt`] | Extension trait to convert transport and cluster errors → `DataError` |
//!
//! Every operation is first planned as a [`SearchRequest`] (method, path,
//! parameters, body); the [`request`] module builds them without I/O.
//!
//! # Quick start
//!
//! ```ignore
//! use serde_json::json;
//! use strata_core::prelude::*;
//! use strata_search::SearchResource;
//!
//! let config = ResourceConfig::new("search", BackendKind::Elasticsearch, "http://localhost:9200");
//! let search = SearchResource::connect(&config)?;
//! let ctx = Context::background();
//!
//! search.db(&ctx).create(&mut article).await?;
//! let hits = search.db(&ctx).query().filter(json!({ "match": { "title": "rust" } })).count::<Article>().await?;
//! ```

pub mod document;
pub mod error;
pub mod query;
pub mod repository;
pub mod request;
pub mod resource;
pub mod uow;

pub use error::{HttpErrorExt, SearchError, SearchResult};
pub use query::SearchQuery;
pub use repository::SearchRepository;
pub use request::SearchRequest;
pub use resource::SearchResource;
pub use uow::SearchUnitOfWork;

pub use serde_json::json;

/// Re-exports of the most commonly used types from both `strata-core` and this crate.
pub mod prelude {
    pub use crate::json;
    pub use crate::{HttpErrorExt, SearchQuery, SearchRepository, SearchResource, SearchUnitOfWork};
    pub use strata_core::prelude::*;
}
