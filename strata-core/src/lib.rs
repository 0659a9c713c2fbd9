//! # strata-core — backend-agnostic data access
//!
//! The contracts and shared machinery of Strata. Backend crates
//! (`strata-sqlx`, `strata-diesel`, `strata-mongo`, `strata-search`)
//! implement [`Resource`], [`Repository`], [`Query`] and
//! [`BackendUnitOfWork`] on top of what lives here.
//!
//! # What's in this crate
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Entity`] / [`Record`] | Capability traits, derived with `#[derive(Entity)]` / `#[derive(Record)]` |
//! | [`MetadataRegistry`] | Flattened column metadata, built once per table and cached |
//! | [`Grammar`] | Pure SQL builders: insert, update, delete, select, count |
//! | [`Query`] | Fluent builder contract: filter, fields, asc/desc, paging, find/first/count/exec |
//! | [`Repository`] | Create/Update/Delete/Query contract with blanket-write protection |
//! | [`Batch`] / [`UnitOfWork`] | Per-backend command queues and the composite commit |
//! | [`Context`] | Cancellation and deadline for every backend call |
//! | [`ResourceFactory`] | Lookup of resources by backend kind or alias |
//! | [`DataConfig`] | Layered YAML/env configuration of resources |
//! | [`DataError`] | Error type of the whole data layer |
//!
//! # Mapping an entity
//!
//! ```ignore
//! use strata_core::{Entity, Record};
//!
//! #[derive(Record, Default)]
//! pub struct Audit {
//!     pub created_by: String,
//! }
//!
//! #[derive(Entity, Default)]
//! #[entity(table = "person")]
//! pub struct Person {
//!     #[entity(pk, auto)]
//!     pub id: i64,
//!     pub name: String,
//!     #[entity(name = "years")]
//!     pub age: i32,
//!     #[entity(flatten)]
//!     pub audit: Audit,
//!     #[entity(skip)]
//!     pub scratch: Option<String>,
//! }
//! ```
//!
//! Field attributes:
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `name = "..."` | Storage name (defaults to the field name) |
//! | `pk` | Primary key; `Entity::id`/`set_id` read and write it |
//! | `auto` | Database-generated; never inserted or updated |
//! | `generated = "uuid"` / `"object_id"` | Filled on create when empty |
//! | `flatten` | Inline the columns of an embedded `Record` |
//! | `skip` | Not persisted |

extern crate self as strata_core;

pub mod config;
pub mod entity;
pub mod error;
pub mod factory;
pub mod grammar;
pub mod logging;
pub mod metadata;
pub mod page;
pub mod query;
pub mod repository;
pub mod resource;
pub mod uow;
pub mod value;

pub use config::{ConfigError, ConfigValue, DataConfig, FromConfigValue, ResourceConfig};
pub use entity::{ColumnDef, Entity, FieldDef, IdStrategy, Record};
pub use error::DataError;
pub use factory::{ResourceFactory, ResourceFactoryBuilder};
pub use grammar::{Dialect, Grammar, Predicate, SelectSpec, Statement};
pub use logging::init_tracing;
pub use metadata::{metadata, ColumnDescriptor, MetadataRegistry, TableMetadata};
pub use page::{Page, Paging};
pub use query::{Query, QueryState};
pub use repository::{assign_identity, Repository, Target, UpdateRequest};
pub use resource::{BackendKind, Context, Resource};
pub use uow::{BackendUnitOfWork, Batch, BoxFuture, CommandKind, Drain, UnitOfWork, UowKey, UowState};
pub use value::{FromValue, ToValue, Value, ValueKind};

pub use strata_macros::{Entity, Record};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        BackendKind, Context, DataError, Entity, Page, Predicate, Query, Record, Repository,
        Resource, ResourceConfig, ResourceFactory, Statement, UnitOfWork, UpdateRequest, Value,
    };
}
