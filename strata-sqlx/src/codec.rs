//! Argument binding, row decoding and statement execution over the `Any`
//! driver.

use sqlx::any::{AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Row, ValueRef};
use strata_core::{Context, DataError, Record, Statement, TableMetadata, Value, ValueKind};

use crate::error::SqlxErrorExt;

pub(crate) type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Bind `args` positionally onto `sql`.
///
/// The `Any` driver carries no timestamp type: timestamps are bound as
/// RFC 3339 text and nulls as a null text value.
pub(crate) fn build_query<'q>(sql: &'q str, args: &[Value]) -> AnyQuery<'q> {
    args.iter().fold(sqlx::query(sql), |query, value| match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Timestamp(t) => query.bind(t.to_rfc3339()),
    })
}

/// Copy every result column that maps to a known column of `meta` into
/// `out`. Result names are matched case-insensitively; extra columns are
/// ignored.
pub(crate) fn decode_row<T: Record>(
    row: &AnyRow,
    meta: &TableMetadata,
    out: &mut T,
) -> Result<(), DataError> {
    for (idx, column) in row.columns().iter().enumerate() {
        let Some(desc) = meta.column_ci(column.name()) else {
            continue;
        };
        let value = read_value(row, idx, desc.name(), desc.kind())?;
        out.write(desc.name(), &value)?;
    }
    Ok(())
}

/// Decode every row into a fresh `T`.
pub(crate) fn decode_rows<T: Record + Default>(
    rows: &[AnyRow],
    meta: &TableMetadata,
) -> Result<Vec<T>, DataError> {
    rows.iter()
        .map(|row| {
            let mut item = T::default();
            decode_row(row, meta, &mut item)?;
            Ok(item)
        })
        .collect()
}

fn read_value(row: &AnyRow, idx: usize, column: &str, kind: ValueKind) -> Result<Value, DataError> {
    let raw = row.try_get_raw(idx).map_err(SqlxErrorExt::into_data_error)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    // Engines disagree on storage classes (SQLite booleans are integers,
    // MySQL decimals may surface as doubles), so each kind has fallbacks.
    let decoded = match kind {
        ValueKind::Bool => row
            .try_get::<bool, _>(idx)
            .map(Value::Bool)
            .or_else(|_| row.try_get::<i64, _>(idx).map(|i| Value::Bool(i != 0))),
        ValueKind::Int => row
            .try_get::<i64, _>(idx)
            .map(Value::Int)
            .or_else(|_| row.try_get::<f64, _>(idx).map(Value::Float))
            .or_else(|_| row.try_get::<String, _>(idx).map(Value::Text)),
        ValueKind::Float => row
            .try_get::<f64, _>(idx)
            .map(Value::Float)
            .or_else(|_| row.try_get::<f32, _>(idx).map(|f| Value::Float(f.into())))
            .or_else(|_| row.try_get::<i64, _>(idx).map(|i| Value::Float(i as f64))),
        ValueKind::Text => row
            .try_get::<String, _>(idx)
            .map(Value::Text)
            .or_else(|_| row.try_get::<i64, _>(idx).map(Value::Int)),
        ValueKind::Bytes => row
            .try_get::<Vec<u8>, _>(idx)
            .map(Value::Bytes)
            .or_else(|_| row.try_get::<String, _>(idx).map(|s| Value::Bytes(s.into_bytes()))),
        ValueKind::Timestamp => row
            .try_get::<String, _>(idx)
            .map(Value::Text)
            .or_else(|_| row.try_get::<i64, _>(idx).map(Value::Int)),
    };
    decoded.map_err(|_| DataError::decode(column, kind))
}

pub(crate) async fn execute(
    pool: &AnyPool,
    ctx: &Context,
    statement: &Statement,
    operation: &str,
) -> Result<AnyQueryResult, DataError> {
    tracing::debug!(operation, args = statement.args.len(), "Executing SQL statement");
    ctx.run(async {
        build_query(&statement.sql, &statement.args)
            .execute(pool)
            .await
            .map_err(|e| e.context_error(operation))
    })
    .await
}

pub(crate) async fn fetch_all(
    pool: &AnyPool,
    ctx: &Context,
    statement: &Statement,
    operation: &str,
) -> Result<Vec<AnyRow>, DataError> {
    tracing::debug!(operation, args = statement.args.len(), "Executing SQL query");
    ctx.run(async {
        build_query(&statement.sql, &statement.args)
            .fetch_all(pool)
            .await
            .map_err(|e| e.context_error(operation))
    })
    .await
}

pub(crate) async fn fetch_optional(
    pool: &AnyPool,
    ctx: &Context,
    statement: &Statement,
    operation: &str,
) -> Result<Option<AnyRow>, DataError> {
    tracing::debug!(operation, args = statement.args.len(), "Executing SQL query");
    ctx.run(async {
        build_query(&statement.sql, &statement.args)
            .fetch_optional(pool)
            .await
            .map_err(|e| e.context_error(operation))
    })
    .await
}
