//! # strata-mongo — MongoDB backend for Strata
//!
//! Implements the Strata contracts over the official `mongodb` driver.
//! Entities map to BSON documents field by field, with the primary key
//! stored as `_id`.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MongoResource`] | Client + database handle implementing `Resource` |
//! | [`MongoRepository`] | Create/Update/Delete with query-document filters and update-document patches |
//! | [`MongoQuery`] | Fluent query builder; `exec` runs an aggregation pipeline |
//! | [`MongoUnitOfWork`] | Queued [`MongoCommand`]s, optionally replayed in a session transaction |
//! | [`MongoErrorExt`] | Extension trait to convert `mongodb::error::Error` → `DataError` |
//!
//! # Identities
//!
//! A text primary key left empty on create gets a fresh object id (24 hex
//! characters), and 24-hex identities are stored as `ObjectId`. Other
//! identities are stored as they are.
//!
//! # Quick start
//!
//! ```ignore
//! use bson::doc;
//! use strata_core::prelude::*;
//! use strata_mongo::MongoResource;
//!
//! let config = ResourceConfig::new("docs", BackendKind::Mongo, "mongodb://localhost:27017/app");
//! let docs = MongoResource::connect(&config).await?;
//! let ctx = Context::background();
//!
//! docs.db(&ctx).create(&mut article).await?;
//! docs.db(&ctx)
//!     .update(&article, UpdateRequest::fields(doc! { "$inc": { "views": 1 } }))
//!     .await?;
//! ```

pub mod command;
pub mod document;
pub mod error;
pub mod query;
pub mod repository;
pub mod resource;
pub mod uow;

pub use command::MongoCommand;
pub use error::{MongoErrorExt, MongoResult};
pub use query::MongoQuery;
pub use repository::MongoRepository;
pub use resource::MongoResource;
pub use uow::MongoUnitOfWork;

pub use bson::{doc, Document};

/// Re-exports of the most commonly used types from both `strata-core` and this crate.
pub mod prelude {
    pub use crate::{doc, Document};
    pub use crate::{MongoErrorExt, MongoQuery, MongoRepository, MongoResource, MongoUnitOfWork};
    pub use strata_core::prelude::*;
}
