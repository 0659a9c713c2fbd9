//! Table metadata derived from entity field mappings.
//!
//! Metadata is built once per table name on first access and shared as an
//! `Arc<TableMetadata>` for the rest of the process.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::entity::{ColumnDef, Entity, FieldDef, IdStrategy};
use crate::error::DataError;
use crate::grammar::is_valid_identifier;
use crate::value::ValueKind;

/// One flattened column of a table.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    field: String,
    name: &'static str,
    primary_key: bool,
    auto_increment: bool,
    generated: Option<IdStrategy>,
    kind: ValueKind,
}

impl ColumnDescriptor {
    /// Rust field path, dotted through flattened records (`audit.created_by`).
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Storage name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn generated(&self) -> Option<IdStrategy> {
        self.generated
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Columns written by an update that does not name its fields.
    pub fn is_mutable(&self) -> bool {
        !self.primary_key && !self.auto_increment
    }
}

#[derive(Debug)]
pub struct TableMetadata {
    name: &'static str,
    columns: Vec<ColumnDescriptor>,
    by_name: HashMap<&'static str, usize>,
    by_lowercase: HashMap<String, usize>,
    primary_key: Option<usize>,
    auto_increment: Option<usize>,
}

impl TableMetadata {
    /// Flatten field mappings into a column list.
    ///
    /// Fails when the mapping yields no column, repeats a storage name, or
    /// uses a name that is not a plain identifier.
    pub fn build(name: &'static str, fields: Vec<FieldDef>) -> Result<Self, DataError> {
        let mut columns = Vec::new();
        flatten("", fields, &mut columns);

        if columns.is_empty() {
            return Err(DataError::Metadata(format!("table `{name}` maps no columns")));
        }

        let mut by_name = HashMap::with_capacity(columns.len());
        let mut by_lowercase = HashMap::with_capacity(columns.len());
        for (idx, col) in columns.iter().enumerate() {
            if !is_valid_identifier(col.name) {
                return Err(DataError::Metadata(format!(
                    "table `{name}`: invalid column name `{}`",
                    col.name
                )));
            }
            if by_name.insert(col.name, idx).is_some() {
                return Err(DataError::Metadata(format!(
                    "table `{name}`: duplicate column `{}`",
                    col.name
                )));
            }
            by_lowercase.entry(col.name.to_lowercase()).or_insert(idx);
        }

        let primary_key = columns.iter().position(|c| c.primary_key);
        let auto_increment = columns.iter().position(|c| c.auto_increment);

        Ok(Self {
            name,
            columns,
            by_name,
            by_lowercase,
            primary_key,
            auto_increment,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.by_name.get(name).map(|&idx| &self.columns[idx])
    }

    /// Case-insensitive lookup, used when binding result columns.
    pub fn column_ci(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.column(name).or_else(|| {
            self.by_lowercase
                .get(&name.to_lowercase())
                .map(|&idx| &self.columns[idx])
        })
    }

    pub fn column_map(&self) -> HashMap<&'static str, &ColumnDescriptor> {
        self.by_name
            .iter()
            .map(|(name, &idx)| (*name, &self.columns[idx]))
            .collect()
    }

    /// First column flagged as primary key.
    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.primary_key.map(|idx| &self.columns[idx])
    }

    /// First column flagged as auto-increment.
    pub fn auto_increment(&self) -> Option<&ColumnDescriptor> {
        self.auto_increment.map(|idx| &self.columns[idx])
    }

    /// Columns an update writes when no field list is given.
    pub fn mutable_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_mutable())
    }
}

fn flatten(prefix: &str, fields: Vec<FieldDef>, out: &mut Vec<ColumnDescriptor>) {
    for def in fields {
        match def {
            FieldDef::Column(ColumnDef {
                field,
                name,
                primary_key,
                auto_increment,
                generated,
                kind,
            }) => out.push(ColumnDescriptor {
                field: join_path(prefix, field),
                name,
                primary_key,
                auto_increment,
                generated,
                kind,
            }),
            FieldDef::Flatten { field, fields } => {
                flatten(&join_path(prefix, field), fields(), out);
            }
        }
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

/// Process-wide cache of table metadata, keyed by table name.
pub struct MetadataRegistry {
    tables: DashMap<&'static str, Arc<TableMetadata>>,
}

static REGISTRY: OnceLock<MetadataRegistry> = OnceLock::new();

impl MetadataRegistry {
    pub fn global() -> &'static MetadataRegistry {
        REGISTRY.get_or_init(|| MetadataRegistry {
            tables: DashMap::new(),
        })
    }

    /// Metadata for `T`, built on first access.
    ///
    /// Concurrent first accesses may each build the metadata; the first one
    /// stored wins and every caller receives that instance.
    pub fn get<T: Entity>(&self) -> Result<Arc<TableMetadata>, DataError> {
        let table = T::table();
        if let Some(found) = self.tables.get(table) {
            return Ok(Arc::clone(found.value()));
        }
        let built = Arc::new(TableMetadata::build(table, T::fields())?);
        tracing::debug!(table, columns = built.columns().len(), "Registered table metadata");
        Ok(Arc::clone(self.tables.entry(table).or_insert(built).value()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Drop every cached entry. Only available to test harnesses.
    #[cfg(any(test, feature = "test-util"))]
    pub fn clear(&self) {
        self.tables.clear();
    }
}

/// Shorthand for `MetadataRegistry::global().get::<T>()`.
pub fn metadata<T: Entity>() -> Result<Arc<TableMetadata>, DataError> {
    MetadataRegistry::global().get::<T>()
}
