//! SQL statement generation from table metadata.
//!
//! Every builder is a pure function of the [`TableMetadata`], the record
//! being written and the caller's fragments. Filter clauses are raw SQL
//! supplied by the caller and are appended verbatim.
//!
//! ```ignore
//! let meta = metadata::<Person>()?;
//! let grammar = Grammar::new(Dialect::Postgres, &meta);
//! let stmt = grammar.update(&person, &["age".into()], &Predicate::new("name = $1").arg("ann"))?;
//! assert_eq!(stmt.sql, r#"UPDATE "person" SET "age" = $1 WHERE name = $2"#);
//! ```

use crate::entity::Record;
use crate::error::DataError;
use crate::metadata::{ColumnDescriptor, TableMetadata};
use crate::page::Paging;
use crate::query::QueryState;
use crate::value::{ToValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders.
    Generic,
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    /// Pick the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Dialect> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "sqlite" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    /// Placeholder for the 1-based argument `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    pub fn quote_identifier(self, ident: &str) -> String {
        let quote = self.quote_char();
        ident
            .split('.')
            .map(|part| format!("{quote}{part}{quote}"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A parameterized statement and its positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl ToValue) -> Self {
        self.args.push(value.to_value());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

/// A caller-supplied filter: raw SQL condition text plus positional
/// arguments, numbered from 1 for `$n` dialects.
///
/// The clause is not parsed or validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clause: String,
    args: Vec<Value>,
}

impl Predicate {
    pub fn new(clause: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl ToValue) -> Self {
        self.args.push(value.to_value());
        self
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.clause.trim().is_empty()
    }
}

impl From<&str> for Predicate {
    fn from(clause: &str) -> Self {
        Predicate::new(clause)
    }
}

impl From<String> for Predicate {
    fn from(clause: String) -> Self {
        Predicate::new(clause)
    }
}

/// Inputs of a SELECT.
#[derive(Debug, Clone, Default)]
pub struct SelectSpec<'a> {
    /// Projection; unknown names are dropped, empty means every column.
    pub fields: &'a [String],
    pub filter: Option<&'a Predicate>,
    pub asc: &'a [String],
    pub desc: &'a [String],
    pub paging: Option<Paging>,
}

impl QueryState<Predicate> {
    /// Borrow the accumulated state as a [`SelectSpec`].
    pub fn select_spec(&self, default_page_size: u64) -> SelectSpec<'_> {
        SelectSpec {
            fields: &self.fields,
            filter: self.filter.as_ref(),
            asc: &self.asc,
            desc: &self.desc,
            paging: self.paging(default_page_size),
        }
    }
}

/// Statement builders for one table in one dialect.
#[derive(Debug, Clone, Copy)]
pub struct Grammar<'a> {
    dialect: Dialect,
    meta: &'a TableMetadata,
    table: &'a str,
}

impl<'a> Grammar<'a> {
    pub fn new(dialect: Dialect, meta: &'a TableMetadata) -> Self {
        Self {
            dialect,
            meta,
            table: meta.name(),
        }
    }

    /// Target another table with the same columns (e.g. a suffixed
    /// partition). `None` keeps the entity's table.
    pub fn with_table(mut self, table: Option<&'a str>) -> Self {
        if let Some(table) = table {
            self.table = table;
        }
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &str {
        self.table
    }

    fn table_ident(&self) -> Result<String, DataError> {
        if !is_valid_identifier(self.table) {
            return Err(DataError::Grammar(format!(
                "invalid table identifier: {}",
                self.table
            )));
        }
        Ok(self.dialect.quote_identifier(self.table))
    }

    fn quote(&self, column: &ColumnDescriptor) -> String {
        self.dialect.quote_identifier(column.name())
    }

    /// `INSERT INTO t (..) VALUES (..)` over every non-auto-increment
    /// column. Postgres statements return the auto-increment column.
    pub fn insert(&self, record: &impl Record) -> Result<Statement, DataError> {
        let table = self.table_ident()?;
        let columns: Vec<&ColumnDescriptor> = self
            .meta
            .columns()
            .iter()
            .filter(|c| !c.is_auto_increment())
            .collect();
        if columns.is_empty() {
            return Err(DataError::Grammar(format!(
                "table `{}` has no insertable column",
                self.table
            )));
        }

        let names: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len())
            .map(|i| self.dialect.placeholder(i))
            .collect();
        let args = columns
            .iter()
            .map(|c| record.read(c.name()).unwrap_or(Value::Null))
            .collect();

        let mut sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );
        if self.dialect == Dialect::Postgres {
            if let Some(auto) = self.meta.auto_increment() {
                sql.push_str(&format!(" RETURNING {}", self.quote(auto)));
            }
        }
        Ok(Statement { sql, args })
    }

    /// `UPDATE t SET .. WHERE <filter>`.
    ///
    /// An empty `fields` list writes every mutable column; otherwise only the
    /// named ones. Primary-key and auto-increment columns are never written.
    /// Filter placeholders are renumbered to follow the SET arguments.
    pub fn update(
        &self,
        record: &impl Record,
        fields: &[String],
        filter: &Predicate,
    ) -> Result<Statement, DataError> {
        let table = self.table_ident()?;
        let targets: Vec<&ColumnDescriptor> = self
            .meta
            .mutable_columns()
            .filter(|c| {
                fields.is_empty() || fields.iter().any(|f| f.eq_ignore_ascii_case(c.name()))
            })
            .collect();
        if targets.is_empty() {
            return Err(DataError::Grammar(format!(
                "update of `{}` sets no column",
                self.table
            )));
        }
        if filter.is_empty() {
            return Err(DataError::Grammar("update requires a filter".into()));
        }

        let assignments: Vec<String> = targets
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote(c), self.dialect.placeholder(i + 1)))
            .collect();
        let mut args: Vec<Value> = targets
            .iter()
            .map(|c| record.read(c.name()).unwrap_or(Value::Null))
            .collect();

        let clause = self.renumber(filter.clause(), targets.len());
        args.extend(filter.args().iter().cloned());

        Ok(Statement {
            sql: format!("UPDATE {table} SET {} WHERE {clause}", assignments.join(", ")),
            args,
        })
    }

    /// `DELETE FROM t WHERE <filter>`. There is no unfiltered form.
    pub fn delete(&self, filter: &Predicate) -> Result<Statement, DataError> {
        let table = self.table_ident()?;
        if filter.is_empty() {
            return Err(DataError::Grammar("delete requires a filter".into()));
        }
        Ok(Statement {
            sql: format!("DELETE FROM {table} WHERE {}", filter.clause()),
            args: filter.args().to_vec(),
        })
    }

    /// SELECT over the projected columns.
    pub fn select(&self, spec: &SelectSpec<'_>) -> Result<Statement, DataError> {
        let dialect = self.dialect;
        self.select_with(spec, |columns| {
            columns
                .iter()
                .map(|c| dialect.quote_identifier(c.name()))
                .collect::<Vec<_>>()
                .join(", ")
        })
    }

    /// SELECT with a custom rendering of the projected columns, for drivers
    /// that need to wrap them (e.g. into a JSON object).
    pub fn select_with<F>(&self, spec: &SelectSpec<'_>, projection: F) -> Result<Statement, DataError>
    where
        F: FnOnce(&[&ColumnDescriptor]) -> String,
    {
        let table = self.table_ident()?;
        let columns = self.projection(spec.fields);
        let mut sql = format!("SELECT {} FROM {table}", projection(&columns));
        let mut args = Vec::new();

        if let Some(filter) = spec.filter.filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(filter.clause());
            args.extend(filter.args().iter().cloned());
        }

        let mut order = Vec::with_capacity(spec.asc.len() + spec.desc.len());
        for name in spec.asc {
            order.push(format!("{} ASC", self.order_ident(name)?));
        }
        for name in spec.desc {
            order.push(format!("{} DESC", self.order_ident(name)?));
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(paging) = spec.paging {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", paging.limit(), paging.offset()));
        }
        Ok(Statement { sql, args })
    }

    /// `SELECT count(1) FROM t [WHERE <filter>]`.
    pub fn count(&self, filter: Option<&Predicate>) -> Result<Statement, DataError> {
        let table = self.table_ident()?;
        let mut sql = format!("SELECT count(1) FROM {table}");
        let mut args = Vec::new();
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(filter.clause());
            args.extend(filter.args().iter().cloned());
        }
        Ok(Statement { sql, args })
    }

    /// `<pk> = $1` for the given identity.
    pub fn identity(&self, id: Value) -> Result<Predicate, DataError> {
        let pk = self.meta.primary_key().ok_or_else(|| {
            DataError::Metadata(format!("table `{}` has no primary key", self.meta.name()))
        })?;
        Ok(Predicate {
            clause: format!("{} = {}", self.quote(pk), self.dialect.placeholder(1)),
            args: vec![id],
        })
    }

    /// Columns selected for `fields`, in declaration order.
    pub fn projection(&self, fields: &[String]) -> Vec<&'a ColumnDescriptor> {
        let picked: Vec<&ColumnDescriptor> = self
            .meta
            .columns()
            .iter()
            .filter(|c| fields.iter().any(|f| f.eq_ignore_ascii_case(c.name())))
            .collect();
        if picked.is_empty() {
            self.meta.columns().iter().collect()
        } else {
            picked
        }
    }

    fn order_ident(&self, name: &str) -> Result<String, DataError> {
        let name = self.meta.column_ci(name).map(|c| c.name()).unwrap_or(name);
        if !is_valid_identifier(name) {
            return Err(DataError::Grammar(format!("invalid order identifier: {name}")));
        }
        Ok(self.dialect.quote_identifier(name))
    }

    fn renumber(&self, clause: &str, offset: usize) -> String {
        if self.dialect == Dialect::Postgres {
            shift_placeholders(clause, offset)
        } else {
            clause.to_string()
        }
    }
}

/// Add `offset` to every `$n` placeholder outside quoted literals.
pub fn shift_placeholders(clause: &str, offset: usize) -> String {
    if offset == 0 {
        return clause.to_string();
    }
    let mut out = String::with_capacity(clause.len() + 4);
    let mut chars = clause.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            continue;
        }
        if c == '$' && !in_literal && chars.peek().is_some_and(|d| d.is_ascii_digit()) {
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            match digits.parse::<usize>() {
                Ok(n) => out.push_str(&format!("${}", n + offset)),
                Err(_) => {
                    out.push('$');
                    out.push_str(&digits);
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Number of positional arguments `sql` expects: the `?` markers, or the
/// highest `$n` for Postgres. Markers inside quoted literals are skipped.
pub fn count_placeholders(sql: &str, dialect: Dialect) -> usize {
    let mut markers = 0;
    let mut highest = 0;
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => markers += 1,
            '$' if !in_literal => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                if let Ok(n) = digits.parse::<usize>() {
                    highest = highest.max(n);
                }
            }
            _ => {}
        }
    }
    match dialect {
        Dialect::Postgres => highest,
        Dialect::Generic | Dialect::Sqlite | Dialect::MySql => markers,
    }
}

/// Replace `@column` markers with the record's values rendered as SQL
/// literals. Unknown names and markers inside quoted literals are left
/// untouched.
pub fn substitute(sql: &str, meta: &TableMetadata, record: &impl Record) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
        }
        let starts_name = chars
            .peek()
            .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_');
        if c != '@' || in_literal || !starts_name {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(n) = chars
            .peek()
            .copied()
            .filter(|n| n.is_ascii_alphanumeric() || *n == '_')
        {
            name.push(n);
            chars.next();
        }
        match meta.column_ci(&name).and_then(|col| record.read(col.name())) {
            Some(value) => out.push_str(&value.sql_literal()),
            None => {
                out.push('@');
                out.push_str(&name);
            }
        }
    }
    out
}

/// Dot-separated identifier segments of `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_placeholders() {
        assert_eq!(
            shift_placeholders("a = $1 AND b IN ($2, $3)", 2),
            "a = $3 AND b IN ($4, $5)"
        );
        assert_eq!(shift_placeholders("note = '$1' AND id = $1", 1), "note = '$1' AND id = $2");
        assert_eq!(shift_placeholders("price > $ 5", 3), "price > $ 5");
    }

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("a = ? AND b = '?' AND c = ?", Dialect::Sqlite), 2);
        assert_eq!(count_placeholders("a = $2 OR a = $1 OR b = '$9'", Dialect::Postgres), 2);
        assert_eq!(count_placeholders("SELECT 1", Dialect::MySql), 0);
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("users"));
        assert!(is_valid_identifier("public.users"));
        assert!(is_valid_identifier("_tmp1"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("users;drop"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a..b"));
    }

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(Dialect::from_url("postgres://u@h/db"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("mysql://h/db"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_url("redis://h"), None);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::MySql.quote_identifier("a.b"), "`a`.`b`");
        assert_eq!(Dialect::Postgres.quote_identifier("name"), "\"name\"");
    }
}
