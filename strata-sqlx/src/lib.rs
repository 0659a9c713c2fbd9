//! # strata-sqlx — SQLx backend for Strata
//!
//! Raw SQL implementation of the Strata contracts over an
//! [SQLx](https://github.com/launchbadge/sqlx) `Any` pool. Statements are
//! generated by [`strata_core::Grammar`] for the resource's dialect and
//! bound positionally.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqlxResource`] | Named pool handle implementing `Resource` |
//! | [`SqlxRepository`] | Create/Update/Delete with `Predicate` filters and column-list patches |
//! | [`SqlxQuery`] | Fluent query builder; `exec` runs a raw `Statement` |
//! | [`SqlxUnitOfWork`] | Queued statements replayed in one transaction |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! # Feature flags
//!
//! | Feature    | Driver |
//! |------------|--------|
//! | `sqlite` (default) | SQLite via `sqlx/sqlite` |
//! | `postgres` | PostgreSQL via `sqlx/postgres` |
//! | `mysql`    | MySQL via `sqlx/mysql` |
//!
//! # Quick start
//!
//! ```ignore
//! use strata_core::prelude::*;
//! use strata_sqlx::SqlxResource;
//!
//! let config = ResourceConfig::new("main", BackendKind::Sqlite, "sqlite::memory:");
//! let main = SqlxResource::connect(&config).await?;
//! let ctx = Context::background();
//!
//! let mut person = Person { name: "ann".into(), age: 30, ..Default::default() };
//! main.db(&ctx).create(&mut person).await?;
//!
//! let mut adults = Vec::new();
//! main.db(&ctx)
//!     .query()
//!     .filter(Predicate::new("age >= ?").arg(18))
//!     .asc(["name"])
//!     .find(&mut adults)
//!     .await?;
//! ```
//!
//! # Limitations
//!
//! The `Any` driver has no timestamp or null-of-type encoding: timestamps
//! are bound as RFC 3339 text and nulls as text nulls. Postgres columns of
//! other types may need an explicit cast in the statement.
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead:
//!
//! ```ignore
//! use strata_sqlx::SqlxErrorExt;
//!
//! sqlx::query("DELETE FROM person").execute(main.pool()).await.map_err(|e| e.into_data_error())?;
//! ```

mod codec;
pub mod error;
pub mod query;
pub mod repository;
pub mod resource;
pub mod uow;

pub use error::{SqlxErrorExt, SqlxResult};
pub use query::SqlxQuery;
pub use repository::SqlxRepository;
pub use resource::SqlxResource;
pub use uow::{SqlCommand, SqlxUnitOfWork};

/// Re-exports of the most commonly used types from both `strata-core` and this crate.
pub mod prelude {
    pub use crate::{SqlxErrorExt, SqlxQuery, SqlxRepository, SqlxResource, SqlxUnitOfWork};
    pub use strata_core::prelude::*;
}
