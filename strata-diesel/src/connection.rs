//! Per-backend plumbing: argument binding and the statements Diesel runs
//! on behalf of the generic repository.
//!
//! Rows are read back as one JSON object per row (`json_object(...)`), so a
//! single `QueryableByName` shape serves every entity type.

use chrono::{DateTime, Utc};
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::r2d2::R2D2Connection;
use diesel::sql_types::{BigInt, Text};
use diesel::{QueryResult, QueryableByName};
use strata_core::{BackendKind, ColumnDescriptor, Dialect, Statement, ValueKind};

#[derive(QueryableByName)]
pub(crate) struct JsonRow {
    #[diesel(sql_type = Text)]
    pub strata_row: String,
}

#[derive(QueryableByName)]
pub(crate) struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub strata_count: i64,
}

#[derive(QueryableByName)]
pub(crate) struct IdRow {
    #[diesel(sql_type = BigInt)]
    pub strata_id: i64,
}

/// A Diesel connection type Strata can drive.
///
/// Implemented for `SqliteConnection` (feature `sqlite`) and
/// `MysqlConnection` (feature `mysql`).
pub trait DieselConnection: R2D2Connection + Send + 'static {
    const KIND: BackendKind;
    const DIALECT: Dialect;

    /// Turn a resource URL into what the connection manager expects.
    fn database_url(url: &str) -> String {
        url.to_string()
    }

    /// Execute a statement, returning the number of affected rows.
    fn run(&mut self, statement: &Statement) -> QueryResult<usize>;

    /// Run a statement projecting a single `strata_row` JSON column.
    fn load_rows(&mut self, statement: &Statement) -> QueryResult<Vec<String>>;

    /// Run a statement projecting a single `strata_count` column.
    fn load_count(&mut self, statement: &Statement) -> QueryResult<i64>;

    /// Identity generated by the last insert on this connection.
    fn last_insert_id(&mut self) -> QueryResult<i64>;

    /// SQL function building a JSON object from key/value pairs.
    fn json_object() -> &'static str;

    /// `json_object('col', "col", ...) AS strata_row`, with binary columns
    /// hex-encoded.
    fn row_projection(columns: &[&ColumnDescriptor]) -> String {
        let pairs = columns
            .iter()
            .map(|c| {
                let ident = Self::DIALECT.quote_identifier(c.name());
                let expr = match c.kind() {
                    ValueKind::Bytes => {
                        format!("CASE WHEN {ident} IS NULL THEN NULL ELSE hex({ident}) END")
                    }
                    _ => ident,
                };
                format!("'{}', {expr}", c.name())
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({pairs}) AS strata_row", Self::json_object())
    }
}

/// Bind `$args` positionally onto a boxed `sql_query` for `$backend`.
macro_rules! bind_args {
    ($backend:ty, $statement:expr, $timestamp:expr) => {{
        let statement: &Statement = $statement;
        statement.args.iter().fold(
            diesel::sql_query(statement.sql.clone()).into_boxed::<$backend>(),
            |query: BoxedSqlQuery<'static, $backend, SqlQuery>, value| {
                use diesel::sql_types::{Binary, Bool, Double, Nullable};
                use strata_core::Value;
                match value {
                    Value::Null => query.bind::<Nullable<Text>, _>(None::<String>),
                    Value::Bool(b) => query.bind::<Bool, _>(*b),
                    Value::Int(i) => query.bind::<BigInt, _>(*i),
                    Value::Float(f) => query.bind::<Double, _>(*f),
                    Value::Text(s) => query.bind::<Text, _>(s.clone()),
                    Value::Bytes(b) => query.bind::<Binary, _>(b.clone()),
                    Value::Timestamp(t) => query.bind::<Text, _>($timestamp(t)),
                }
            },
        )
    }};
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use diesel::sqlite::{Sqlite, SqliteConnection};
    use diesel::RunQueryDsl;

    use super::*;

    fn timestamp(t: &DateTime<Utc>) -> String {
        t.to_rfc3339()
    }

    impl DieselConnection for SqliteConnection {
        const KIND: BackendKind = BackendKind::Sqlite;
        const DIALECT: Dialect = Dialect::Sqlite;

        /// `sqlite::memory:` and `sqlite://path` are accepted alongside the
        /// plain paths Diesel expects.
        fn database_url(url: &str) -> String {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("sqlite:"))
                .unwrap_or(url);
            path.to_string()
        }

        fn run(&mut self, statement: &Statement) -> QueryResult<usize> {
            bind_args!(Sqlite, statement, timestamp).execute(self)
        }

        fn load_rows(&mut self, statement: &Statement) -> QueryResult<Vec<String>> {
            let rows: Vec<JsonRow> = bind_args!(Sqlite, statement, timestamp).load(self)?;
            Ok(rows.into_iter().map(|r| r.strata_row).collect())
        }

        fn load_count(&mut self, statement: &Statement) -> QueryResult<i64> {
            let row: CountRow = bind_args!(Sqlite, statement, timestamp).get_result(self)?;
            Ok(row.strata_count)
        }

        fn last_insert_id(&mut self) -> QueryResult<i64> {
            let row: IdRow =
                diesel::sql_query("SELECT last_insert_rowid() AS strata_id").get_result(self)?;
            Ok(row.strata_id)
        }

        fn json_object() -> &'static str {
            "json_object"
        }
    }
}

#[cfg(feature = "mysql")]
mod mysql {
    use diesel::mysql::{Mysql, MysqlConnection};
    use diesel::RunQueryDsl;

    use super::*;

    /// MySQL `DATETIME` literals carry no offset.
    fn timestamp(t: &DateTime<Utc>) -> String {
        t.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }

    impl DieselConnection for MysqlConnection {
        const KIND: BackendKind = BackendKind::MySql;
        const DIALECT: Dialect = Dialect::MySql;

        fn run(&mut self, statement: &Statement) -> QueryResult<usize> {
            bind_args!(Mysql, statement, timestamp).execute(self)
        }

        fn load_rows(&mut self, statement: &Statement) -> QueryResult<Vec<String>> {
            let rows: Vec<JsonRow> = bind_args!(Mysql, statement, timestamp).load(self)?;
            Ok(rows.into_iter().map(|r| r.strata_row).collect())
        }

        fn load_count(&mut self, statement: &Statement) -> QueryResult<i64> {
            let row: CountRow = bind_args!(Mysql, statement, timestamp).get_result(self)?;
            Ok(row.strata_count)
        }

        fn last_insert_id(&mut self) -> QueryResult<i64> {
            let row: IdRow =
                diesel::sql_query("SELECT CAST(LAST_INSERT_ID() AS SIGNED) AS strata_id")
                    .get_result(self)?;
            Ok(row.strata_id)
        }

        fn json_object() -> &'static str {
            "JSON_OBJECT"
        }
    }
}
