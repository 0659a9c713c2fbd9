//! # strata-diesel — Diesel backend for Strata
//!
//! Implements the Strata contracts over an `r2d2` pool of Diesel
//! connections. Statements come from [`strata_core::Grammar`] and run as
//! `sql_query` with positional binds; every blocking call is moved to
//! `tokio::task::spawn_blocking`.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DieselResource<C>`] | Named pool handle implementing `Resource` |
//! | [`DieselRepository<C>`] | Create/Update/Delete with `Predicate` filters and [`FieldSet`] patches |
//! | [`DieselQuery<C>`] | Fluent query builder |
//! | [`DieselUnitOfWork<C>`] | Queued statements replayed in `Connection::transaction` |
//! | [`DieselConnection`] | Connection types Strata can drive |
//! | [`DieselErrorExt`] | Extension trait to convert Diesel errors → `DataError` (`.into_data_error()`) |
//!
//! # Feature flags
//!
//! | Feature | Connection | Alias |
//! |---------|------------|-------|
//! | `sqlite` (default) | `SqliteConnection` (bundled SQLite) | [`SqliteResource`] |
//! | `mysql` | `MysqlConnection` | [`MysqlResource`] |
//!
//! # Quick start
//!
//! ```ignore
//! use strata_core::prelude::*;
//! use strata_diesel::{FieldSet, SqliteResource};
//!
//! let config = ResourceConfig::new("orm", BackendKind::Sqlite, "sqlite://app.db");
//! let orm = SqliteResource::connect(&config).await?;
//! let ctx = Context::background();
//!
//! orm.db(&ctx).create(&mut person).await?;
//! orm.db(&ctx)
//!     .update(&person, UpdateRequest::fields(FieldSet::omit(["created_at"])))
//!     .await?;
//! ```

pub mod connection;
pub mod error;
pub mod patch;
pub mod query;
pub mod repository;
pub mod resource;
mod rows;
pub mod uow;

pub use connection::DieselConnection;
pub use error::{DieselErrorExt, DieselResult};
pub use patch::FieldSet;
pub use query::DieselQuery;
pub use repository::DieselRepository;
pub use resource::{DieselPool, DieselResource};
pub use uow::{DieselCommand, DieselUnitOfWork};

#[cfg(feature = "sqlite")]
pub type SqliteResource = DieselResource<diesel::sqlite::SqliteConnection>;

#[cfg(feature = "mysql")]
pub type MysqlResource = DieselResource<diesel::mysql::MysqlConnection>;

/// Re-exports of the most commonly used types from both `strata-core` and this crate.
pub mod prelude {
    pub use crate::{DieselErrorExt, DieselRepository, DieselResource, DieselUnitOfWork, FieldSet};
    pub use strata_core::prelude::*;
}
