//! Entities as index documents: the primary key is the document `_id`,
//! every other column a `_source` field.

use serde_json::Value as Json;
use strata_core::value::from_hex;
use strata_core::{DataError, Record, TableMetadata, Value, ValueKind};

pub const ID_KEY: &str = "_id";

fn column_value(kind: ValueKind, json: &Json) -> Value {
    match (kind, Value::from_json(json)) {
        (ValueKind::Bytes, Value::Text(hex)) => match from_hex(&hex) {
            Some(bytes) => Value::Bytes(bytes),
            None => Value::Text(hex),
        },
        (_, value) => value,
    }
}

/// Copy one hit (`{"_id": .., "_source": {..}}`) into `out`. Source keys
/// are matched case-insensitively; unknown ones are ignored.
pub fn from_hit<T: Record>(hit: &Json, meta: &TableMetadata, out: &mut T) -> Result<(), DataError> {
    if let (Some(pk), Some(id)) = (meta.primary_key(), hit.get(ID_KEY)) {
        out.write(pk.name(), &column_value(pk.kind(), id))?;
    }
    let Some(source) = hit.get("_source").and_then(Json::as_object) else {
        return Ok(());
    };
    for (key, cell) in source {
        let Some(column) = meta.column_ci(key).filter(|c| !c.is_primary_key()) else {
            continue;
        };
        out.write(column.name(), &column_value(column.kind(), cell))?;
    }
    Ok(())
}

/// Decode `hits.hits` of a search response.
pub fn from_hits<T: Record + Default>(
    response: &Json,
    meta: &TableMetadata,
) -> Result<Vec<T>, DataError> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Json::as_array)
        .ok_or_else(|| DataError::Other("search response carries no hits".into()))?;
    hits.iter()
        .map(|hit| {
            let mut item = T::default();
            from_hit(hit, meta, &mut item)?;
            Ok(item)
        })
        .collect()
}

/// `count` of a `_count` response.
pub fn count_of(response: &Json) -> Result<u64, DataError> {
    response
        .get("count")
        .and_then(Json::as_u64)
        .ok_or_else(|| DataError::Other("count response carries no count".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_value_hex_bytes() {
        assert_eq!(
            column_value(ValueKind::Bytes, &json!("0aff")),
            Value::Bytes(vec![0x0a, 0xff])
        );
        assert_eq!(
            column_value(ValueKind::Bytes, &json!("zz")),
            Value::Text("zz".into())
        );
        assert_eq!(column_value(ValueKind::Int, &json!(3)), Value::Int(3));
    }

    #[test]
    fn test_count_of() {
        assert_eq!(count_of(&json!({ "count": 4, "_shards": {} })).unwrap(), 4);
        assert!(count_of(&json!({})).is_err());
    }
}
