use std::future::Future;

use crate::entity::{Entity, IdStrategy, Record};
use crate::error::DataError;
use crate::metadata::TableMetadata;
use crate::query::Query;
use crate::value::Value;

/// What an update changes and which rows it targets.
///
/// - `fields: None` writes every mutable column from the entity.
/// - `filter: None` targets the entity's primary key.
#[derive(Debug, Clone)]
pub struct UpdateRequest<P, F> {
    pub fields: Option<P>,
    pub filter: Option<F>,
}

impl<P, F> Default for UpdateRequest<P, F> {
    fn default() -> Self {
        Self {
            fields: None,
            filter: None,
        }
    }
}

impl<P, F> UpdateRequest<P, F> {
    /// Replace every mutable field, by primary key.
    pub fn all() -> Self {
        Self::default()
    }

    /// Change only `fields`, by primary key.
    pub fn fields(fields: impl Into<P>) -> Self {
        Self {
            fields: Some(fields.into()),
            filter: None,
        }
    }

    /// Replace every mutable field on the rows matching `filter`.
    pub fn filter(filter: impl Into<F>) -> Self {
        Self {
            fields: None,
            filter: Some(filter.into()),
        }
    }

    pub fn with_fields(mut self, fields: impl Into<P>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<F>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Rows targeted by an update or delete.
#[derive(Debug, Clone, PartialEq)]
pub enum Target<F> {
    Filter(F),
    Identity(Value),
}

impl<F> Target<F> {
    /// The explicit filter if any, else the entity's non-empty identity.
    /// `None` means the request would touch every row.
    pub fn resolve<T: Entity>(entity: &T, filter: Option<F>) -> Option<Self> {
        match filter {
            Some(filter) => Some(Target::Filter(filter)),
            None => {
                let id = entity.id();
                (!id.is_empty()).then_some(Target::Identity(id))
            }
        }
    }
}

/// Fill an empty primary key from its generation strategy (or `fallback`
/// when the column declares none). Returns the generated value.
pub fn assign_identity<T: Record>(
    entity: &mut T,
    meta: &TableMetadata,
    fallback: Option<IdStrategy>,
) -> Result<Option<Value>, DataError> {
    let Some(pk) = meta.primary_key() else {
        return Ok(None);
    };
    if pk.is_auto_increment() {
        return Ok(None);
    }
    let Some(strategy) = pk.generated().or(fallback) else {
        return Ok(None);
    };
    let current = entity.read(pk.name()).unwrap_or(Value::Null);
    if !current.is_empty() {
        return Ok(None);
    }
    let id = strategy.generate();
    entity.write(pk.name(), &id)?;
    Ok(Some(id))
}

/// Write contract of a backend, bound to one context and optionally to a
/// unit of work.
///
/// With a unit of work attached, `create`/`update`/`delete` validate and
/// queue their command and return without I/O; otherwise they execute
/// immediately.
pub trait Repository: Send + Sync {
    type Filter: Send + Sync;
    /// What to change on update: a field list, a patch document...
    type Patch: Send;
    type Query: Query<Filter = Self::Filter>;

    /// Insert `entity`. A generated primary key is assigned before dispatch;
    /// immediate inserts also write back database-generated identities.
    fn create<T: Entity>(&self, entity: &mut T) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Fails with [`DataError::UpdateFullNotAllowed`] when there is neither
    /// a filter nor a non-empty primary key.
    fn update<T: Entity>(
        &self,
        entity: &T,
        request: UpdateRequest<Self::Patch, Self::Filter>,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Fails with [`DataError::DeleteFullNotAllowed`] when there is neither
    /// a filter nor a non-empty primary key.
    fn delete<T: Entity>(
        &self,
        entity: &T,
        filter: Option<Self::Filter>,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// A fresh query builder on the same context and connection pool.
    fn query(&self) -> Self::Query;
}
