//! Conversions between entities and BSON documents.
//!
//! The primary-key column is stored as `_id`; every other column under its
//! storage name. Text identities that parse as an object id are stored as
//! one.

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Bson, Document};
use strata_core::{DataError, Record, TableMetadata, Value};

pub const ID_KEY: &str = "_id";

pub fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(i) => Bson::Int64(*i),
        Value::Float(f) => Bson::Double(*f),
        Value::Text(s) => Bson::String(s.clone()),
        Value::Bytes(b) => Bson::Binary(bson::Binary {
            subtype: BinarySubtype::Generic,
            bytes: b.clone(),
        }),
        Value::Timestamp(t) => Bson::DateTime(bson::DateTime::from_chrono(*t)),
    }
}

/// Identity values: 24-hex text becomes an `ObjectId`.
pub fn id_to_bson(value: &Value) -> Bson {
    match value {
        Value::Text(s) => match ObjectId::parse_str(s) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(s.clone()),
        },
        other => value_to_bson(other),
    }
}

pub fn bson_to_value(bson: &Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Int(i64::from(*i)),
        Bson::Int64(i) => Value::Int(*i),
        Bson::Double(f) => Value::Float(*f),
        Bson::String(s) => Value::Text(s.clone()),
        Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
        Bson::DateTime(t) => Value::Timestamp(t.to_chrono()),
        Bson::Binary(b) => Value::Bytes(b.bytes.clone()),
        Bson::Document(_) | Bson::Array(_) => {
            Value::Text(bson.clone().into_relaxed_extjson().to_string())
        }
        other => Value::Text(other.to_string()),
    }
}

/// `{ _id: <id> }` for an entity identity.
pub fn id_filter(id: &Value) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_KEY, id_to_bson(id));
    filter
}

/// The document stored for `record`. An empty identity is left out so the
/// server assigns one.
pub fn to_document<T: Record>(record: &T, meta: &TableMetadata) -> Document {
    let mut doc = Document::new();
    for column in meta.columns() {
        let value = record.read(column.name()).unwrap_or(Value::Null);
        if column.is_primary_key() {
            if !value.is_empty() {
                doc.insert(ID_KEY, id_to_bson(&value));
            }
        } else {
            doc.insert(column.name(), value_to_bson(&value));
        }
    }
    doc
}

/// Copy the fields of `doc` into `out`. `_id` maps to the primary key;
/// other keys are matched case-insensitively and unknown ones ignored.
pub fn from_document<T: Record>(
    doc: &Document,
    meta: &TableMetadata,
    out: &mut T,
) -> Result<(), DataError> {
    for (key, bson) in doc {
        let column = if key == ID_KEY {
            meta.primary_key()
        } else {
            meta.column_ci(key).filter(|c| !c.is_primary_key())
        };
        if let Some(column) = column {
            out.write(column.name(), &bson_to_value(bson))?;
        }
    }
    Ok(())
}

pub fn from_documents<T: Record + Default>(
    docs: &[Document],
    meta: &TableMetadata,
) -> Result<Vec<T>, DataError> {
    docs.iter()
        .map(|doc| {
            let mut item = T::default();
            from_document(doc, meta, &mut item)?;
            Ok(item)
        })
        .collect()
}

/// Copy the first of `docs` into `out`, leaving `out` untouched when there
/// is none. Returns whether a document was found.
pub fn first_into<T: Record>(
    docs: &[Document],
    meta: &TableMetadata,
    out: &mut T,
) -> Result<bool, DataError> {
    match docs.first() {
        Some(doc) => from_document(doc, meta, out).map(|()| true),
        None => Ok(false),
    }
}

/// Storage key of a field name: the primary key is `_id`, other known
/// columns their storage name, anything else is passed through (dotted
/// paths into sub-documents).
pub fn storage_key(meta: &TableMetadata, name: &str) -> String {
    match meta.column_ci(name) {
        Some(column) if column.is_primary_key() => ID_KEY.to_string(),
        Some(column) => column.name().to_string(),
        None => name.to_string(),
    }
}

/// An update document from a caller patch: a patch without any `$`
/// operator is treated as the fields to `$set`.
pub fn update_document(patch: Document) -> Result<Document, DataError> {
    if patch.is_empty() {
        return Err(DataError::Grammar("empty update document".into()));
    }
    if patch.keys().any(|k| k.starts_with('$')) {
        return Ok(patch);
    }
    let mut update = Document::new();
    update.insert("$set", patch);
    Ok(update)
}

/// `{ $set: <every column but _id> }` for a full replacement of the
/// mutable fields.
pub fn set_all<T: Record>(record: &T, meta: &TableMetadata) -> Result<Document, DataError> {
    let mut fields = to_document(record, meta);
    fields.remove(ID_KEY);
    update_document(fields)
}
