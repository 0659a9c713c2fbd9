use strata_core::grammar::count_placeholders;
use strata_core::{
    metadata, Context, DataError, Entity, Grammar, Paging, Predicate, Query, QueryState,
    SelectSpec, Statement, TableMetadata, ValueKind,
};

use crate::connection::DieselConnection;
use crate::error::DieselErrorExt;
use crate::resource::DieselResource;
use crate::rows::{decode_json_row, decode_json_rows};

/// Fluent query builder over a Diesel pool.
///
/// Rows come back as JSON objects, so `exec` wraps the raw statement as a
/// subquery: it must select every mapped column, or the ones named with
/// [`fields`](Query::fields) beforehand.
pub struct DieselQuery<C: DieselConnection> {
    resource: DieselResource<C>,
    ctx: Context,
    base_table: Option<String>,
    state: QueryState<Predicate>,
}

impl<C: DieselConnection> DieselQuery<C> {
    pub(crate) fn new(resource: DieselResource<C>, ctx: Context, base_table: Option<String>) -> Self {
        Self {
            resource,
            ctx,
            base_table,
            state: QueryState::default(),
        }
    }

    fn grammar<'a>(&'a self, meta: &'a TableMetadata, table: Option<&'a str>) -> Grammar<'a> {
        Grammar::new(C::DIALECT, meta).with_table(table.or(self.base_table.as_deref()))
    }

    async fn load(&self, statement: Statement, operation: String) -> Result<Vec<String>, DataError> {
        tracing::debug!(%operation, args = statement.args.len(), "Executing Diesel query");
        self.resource
            .with_connection(&self.ctx, move |conn| {
                conn.load_rows(&statement)
                    .map_err(|e| e.context_error(operation))
            })
            .await
    }
}

impl<C: DieselConnection> Query for DieselQuery<C> {
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
        let statement = grammar.select_with(
            &state.select_spec(self.default_page_size()),
            C::row_projection,
        )?;
        let operation = format!("select from {}", grammar.table());

        let rows = self.load(statement, operation).await?;
        *out = decode_json_rows(&rows, &meta)?;
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
        let statement = grammar.select_with(&spec, C::row_projection)?;
        let operation = format!("select first from {}", grammar.table());

        let rows = self.load(statement, operation).await?;
        if let Some(row) = rows.first() {
            decode_json_row(row, &meta, out)?;
        }
        Ok(())
    }

    async fn count<T: Entity>(&mut self) -> Result<u64, DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let grammar = self.grammar(&meta, state.table.as_deref());
        let inner = grammar.count(state.filter.as_ref())?;
        let statement = Statement {
            sql: format!("SELECT ({}) AS strata_count", inner.sql),
            args: inner.args,
        };
        let operation = format!("count {}", grammar.table());

        tracing::debug!(%operation, args = statement.args.len(), "Executing Diesel query");
        let total = self
            .resource
            .with_connection(&self.ctx, move |conn| {
                conn.load_count(&statement)
                    .map_err(|e| e.context_error(operation))
            })
            .await?;
        u64::try_from(total).map_err(|_| DataError::decode("count", ValueKind::Int))
    }

    async fn exec<T: Entity>(
        &mut self,
        out: &mut Vec<T>,
        statement: Statement,
    ) -> Result<(), DataError> {
        let state = self.state.take();
        if statement.is_empty() {
            return Err(DataError::EmptyStatement);
        }
        let expected = count_placeholders(&statement.sql, C::DIALECT);
        if expected != statement.args.len() {
            return Err(DataError::QueryArgs(format!(
                "statement expects {expected} argument(s), got {}",
                statement.args.len()
            )));
        }
        let meta = metadata::<T>()?;
        let grammar = Grammar::new(C::DIALECT, &meta);
        let columns = grammar.projection(&state.fields);
        let wrapped = Statement {
            sql: format!(
                "SELECT {} FROM ({}) AS strata_exec",
                C::row_projection(&columns),
                statement.sql.trim().trim_end_matches(';')
            ),
            args: statement.args,
        };

        let rows = self.load(wrapped, "exec".to_string()).await?;
        *out = decode_json_rows(&rows, &meta)?;
        Ok(())
    }
}
