use strata_core::value::from_hex;
use strata_core::{DataError, Record, TableMetadata, Value, ValueKind};

/// Write the columns of one `json_object` row into `out`. Keys are matched
/// case-insensitively; unknown keys are ignored.
pub(crate) fn decode_json_row<T: Record>(
    json: &str,
    meta: &TableMetadata,
    out: &mut T,
) -> Result<(), DataError> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| DataError::Other(format!("malformed row from database: {e}")))?;
    for (key, cell) in &object {
        let Some(desc) = meta.column_ci(key) else {
            continue;
        };
        let value = match (desc.kind(), Value::from_json(cell)) {
            (ValueKind::Bytes, Value::Text(hex)) => match from_hex(&hex) {
                Some(bytes) => Value::Bytes(bytes),
                None => Value::Text(hex),
            },
            (_, value) => value,
        };
        out.write(desc.name(), &value)?;
    }
    Ok(())
}

pub(crate) fn decode_json_rows<T: Record + Default>(
    rows: &[String],
    meta: &TableMetadata,
) -> Result<Vec<T>, DataError> {
    rows.iter()
        .map(|row| {
            let mut item = T::default();
            decode_json_row(row, meta, &mut item)?;
            Ok(item)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ColumnDef, FieldDef};

    #[derive(Default)]
    struct Blob {
        name: String,
        data: Vec<u8>,
    }

    impl Record for Blob {
        fn fields() -> Vec<FieldDef> {
            let column = |name, kind| {
                FieldDef::Column(ColumnDef {
                    field: name,
                    name,
                    primary_key: false,
                    auto_increment: false,
                    generated: None,
                    kind,
                })
            };
            vec![column("name", ValueKind::Text), column("data", ValueKind::Bytes)]
        }

        fn read(&self, column: &str) -> Option<Value> {
            match column {
                "name" => Some(Value::Text(self.name.clone())),
                "data" => Some(Value::Bytes(self.data.clone())),
                _ => None,
            }
        }

        fn write(&mut self, column: &str, value: &Value) -> Result<bool, DataError> {
            match (column, value) {
                ("name", Value::Text(s)) => self.name = s.clone(),
                ("data", Value::Bytes(b)) => self.data = b.clone(),
                (column, _) => return Err(DataError::decode(column, ValueKind::Text)),
            }
            Ok(true)
        }
    }

    #[test]
    fn test_decode_hex_and_case() {
        let meta = TableMetadata::build("blob", Blob::fields()).unwrap();
        let rows = vec![r#"{"NAME": "a", "data": "CAFE", "extra": 1}"#.to_string()];
        let decoded: Vec<Blob> = decode_json_rows(&rows, &meta).unwrap();
        assert_eq!(decoded[0].name, "a");
        assert_eq!(decoded[0].data, vec![0xca, 0xfe]);
    }

    #[test]
    fn test_malformed_row() {
        let meta = TableMetadata::build("blob", Blob::fields()).unwrap();
        let mut blob = Blob::default();
        assert!(decode_json_row("not json", &meta, &mut blob).is_err());
    }
}
