use crate::error::DataError;
use crate::metadata::metadata;
use crate::value::{Value, ValueKind};

/// How a primary key is filled in when an entity is created without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdStrategy {
    /// Random UUID v4, stored as text.
    Uuid,
    /// 12-byte object id (4-byte timestamp + 8 random bytes), stored as
    /// 24 hex characters.
    ObjectId,
}

impl IdStrategy {
    pub fn generate(self) -> Value {
        match self {
            IdStrategy::Uuid => Value::Text(uuid::Uuid::new_v4().to_string()),
            IdStrategy::ObjectId => {
                let secs = chrono::Utc::now().timestamp() as u32;
                let mut bytes = [0u8; 12];
                bytes[..4].copy_from_slice(&secs.to_be_bytes());
                bytes[4..].copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);
                Value::Text(hex::encode(bytes))
            }
        }
    }
}

/// Mapping of one persisted field, as emitted by `#[derive(Record)]`.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    /// Rust field name.
    pub field: &'static str,
    /// Storage name (column, document key...).
    pub name: &'static str,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub generated: Option<IdStrategy>,
    pub kind: ValueKind,
}

#[derive(Debug, Clone)]
pub enum FieldDef {
    Column(ColumnDef),
    /// An embedded record whose columns are inlined into the parent.
    Flatten {
        field: &'static str,
        fields: fn() -> Vec<FieldDef>,
    },
}

/// A plain data type whose fields can be read and written by storage name.
///
/// Normally derived:
///
/// ```ignore
/// #[derive(Record, Default)]
/// pub struct Audit {
///     pub created_by: String,
///     #[entity(name = "created")]
///     pub created_at: Option<DateTime<Utc>>,
/// }
/// ```
pub trait Record: Send + Sync + 'static {
    /// Field mappings in declaration order.
    fn fields() -> Vec<FieldDef>;

    /// Read a column by storage name. `None` if this record has no such column.
    fn read(&self, column: &str) -> Option<Value>;

    /// Write a column by storage name. Returns `Ok(false)` if this record has
    /// no such column.
    fn write(&mut self, column: &str, value: &Value) -> Result<bool, DataError>;
}

/// A persisted record with a table name and an identity.
///
/// `id` and `set_id` default to the column flagged `#[entity(pk)]`,
/// including one inlined from a flattened record.
///
/// ```ignore
/// #[derive(Entity, Default)]
/// #[entity(table = "person")]
/// pub struct Person {
///     #[entity(pk, auto)]
///     pub id: i64,
///     pub name: String,
///     pub age: i32,
/// }
/// ```
pub trait Entity: Record + Default {
    fn table() -> &'static str;

    fn id(&self) -> Value {
        metadata::<Self>()
            .ok()
            .and_then(|meta| meta.primary_key().and_then(|pk| self.read(pk.name())))
            .unwrap_or(Value::Null)
    }

    fn set_id(&mut self, id: Value) -> Result<(), DataError> {
        let meta = metadata::<Self>()?;
        let pk = meta.primary_key().ok_or_else(|| {
            DataError::Metadata(format!("table `{}` has no primary key", meta.name()))
        })?;
        self.write(pk.name(), &id)?;
        Ok(())
    }
}
