use sqlx::Row;
use strata_core::grammar::count_placeholders;
use strata_core::{
    metadata, Context, DataError, Entity, Grammar, Paging, Predicate, Query, QueryState,
    SelectSpec, Statement, TableMetadata, ValueKind,
};

use crate::codec::{decode_row, decode_rows, fetch_all, fetch_optional};
use crate::error::SqlxErrorExt;
use crate::resource::SqlxResource;

/// Fluent SQL query builder.
///
/// `exec` accepts a raw [`Statement`]; its placeholders must match its
/// arguments in number.
pub struct SqlxQuery {
    resource: SqlxResource,
    ctx: Context,
    base_table: Option<String>,
    state: QueryState<Predicate>,
}

impl SqlxQuery {
    pub(crate) fn new(resource: SqlxResource, ctx: Context, base_table: Option<String>) -> Self {
        Self {
            resource,
            ctx,
            base_table,
            state: QueryState::default(),
        }
    }

    fn grammar<'a>(&'a self, meta: &'a TableMetadata, table: Option<&'a str>) -> Grammar<'a> {
        Grammar::new(self.resource.dialect(), meta)
            .with_table(table.or(self.base_table.as_deref()))
    }
}

impl Query for SqlxQuery {
    type Filter = Predicate;
    type Statement = Statement;

    fn state_mut(&mut self) -> &mut QueryState<Predicate> {
        &mut self.state
    }

    fn default_page_size(&self) -> u64 {
        self.resource.page_size()
    }

    async fn find<T: Entity>(&mut self, out: &mut Vec<T>) -> Result<(), DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let grammar = self.grammar(&meta, state.table.as_deref());
        let statement = grammar.select(&state.select_spec(self.default_page_size()))?;
        let operation = format!("select from {}", grammar.table());

        let rows = fetch_all(self.resource.pool(), &self.ctx, &statement, &operation).await?;
        *out = decode_rows(&rows, &meta)?;
        Ok(())
    }

    async fn first<T: Entity>(&mut self, out: &mut T) -> Result<(), DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let grammar = self.grammar(&meta, state.table.as_deref());

        let filter = match state.filter.filter(|f| !f.is_empty()) {
            Some(filter) => Some(filter),
            None => {
                let id = out.id();
                if id.is_empty() {
                    None
                } else {
                    Some(grammar.identity(id)?)
                }
            }
        };
        let spec = SelectSpec {
            fields: &state.fields,
            filter: filter.as_ref(),
            asc: &state.asc,
            desc: &state.desc,
            paging: Some(Paging::new(1, 1, 1)),
        };
        let statement = grammar.select(&spec)?;
        let operation = format!("select first from {}", grammar.table());

        let row = fetch_optional(self.resource.pool(), &self.ctx, &statement, &operation).await?;
        if let Some(row) = row {
            decode_row(&row, &meta, out)?;
        }
        Ok(())
    }

    async fn count<T: Entity>(&mut self) -> Result<u64, DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let grammar = self.grammar(&meta, state.table.as_deref());
        let statement = grammar.count(state.filter.as_ref())?;
        let operation = format!("count {}", grammar.table());

        let row = fetch_optional(self.resource.pool(), &self.ctx, &statement, &operation).await?;
        let Some(row) = row else {
            return Ok(0);
        };
        let total: i64 = row
            .try_get(0)
            .map_err(|e| e.context_error(operation.as_str()))?;
        u64::try_from(total).map_err(|_| DataError::decode("count", ValueKind::Int))
    }

    async fn exec<T: Entity>(
        &mut self,
        out: &mut Vec<T>,
        statement: Statement,
    ) -> Result<(), DataError> {
        self.state.take();
        if statement.is_empty() {
            return Err(DataError::EmptyStatement);
        }
        let expected = count_placeholders(&statement.sql, self.resource.dialect());
        if expected != statement.args.len() {
            return Err(DataError::QueryArgs(format!(
                "statement expects {expected} argument(s), got {}",
                statement.args.len()
            )));
        }
        let meta = metadata::<T>()?;

        let rows = fetch_all(self.resource.pool(), &self.ctx, &statement, "exec").await?;
        *out = decode_rows(&rows, &meta)?;
        Ok(())
    }
}
