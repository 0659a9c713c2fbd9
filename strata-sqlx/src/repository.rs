use strata_core::{
    assign_identity, metadata, CommandKind, Context, DataError, Dialect, Entity, Grammar,
    Predicate, Repository, Target, TableMetadata, UpdateRequest, Value,
};

use crate::codec::{decode_row, execute, fetch_optional};
use crate::query::SqlxQuery;
use crate::resource::SqlxResource;
use crate::uow::{SqlCommand, SqlxUnitOfWork};

/// Raw SQL repository over an `sqlx` pool.
///
/// - filter: [`Predicate`] (SQL condition text with positional arguments)
/// - patch: the list of column names to write
///
/// ```ignore
/// let repo = resource.db(&ctx);
/// repo.create(&mut person).await?;                        // person.id is set
/// repo.update(&person, UpdateRequest::fields(vec!["age".into()])).await?;
/// repo.delete(&person, Some(Predicate::new("age < ?").arg(18))).await?;
/// ```
pub struct SqlxRepository {
    resource: SqlxResource,
    ctx: Context,
    uow: Option<SqlxUnitOfWork>,
    table: Option<String>,
}

impl SqlxRepository {
    pub(crate) fn new(resource: SqlxResource, ctx: Context, uow: Option<SqlxUnitOfWork>) -> Self {
        Self {
            resource,
            ctx,
            uow,
            table: None,
        }
    }

    /// Route writes and queries to another table with the same columns
    /// (e.g. a dated partition).
    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn resource(&self) -> &SqlxResource {
        &self.resource
    }

    fn grammar<'a>(&'a self, meta: &'a TableMetadata) -> Grammar<'a> {
        Grammar::new(self.resource.dialect(), meta).with_table(self.table.as_deref())
    }

    /// Resolve the rows an update or delete targets. A blank filter counts
    /// as no filter.
    fn target<T: Entity>(
        &self,
        grammar: &Grammar<'_>,
        entity: &T,
        filter: Option<Predicate>,
        refused: DataError,
    ) -> Result<Predicate, DataError> {
        match Target::resolve(entity, filter.filter(|f| !f.is_empty())) {
            Some(Target::Filter(filter)) => Ok(filter),
            Some(Target::Identity(id)) => grammar.identity(id),
            None => Err(refused),
        }
    }

    async fn dispatch(&self, kind: CommandKind, command: SqlCommand) -> Result<(), DataError> {
        match &self.uow {
            Some(uow) => uow.enqueue(kind, command),
            None => {
                let operation = command.operation(kind);
                let result =
                    execute(self.resource.pool(), &self.ctx, &command.statement, &operation)
                        .await?;
                tracing::debug!(%operation, rows = result.rows_affected(), "SQL statement applied");
                Ok(())
            }
        }
    }
}

impl Repository for SqlxRepository {
    type Filter = Predicate;
    type Patch = Vec<String>;
    type Query = SqlxQuery;

    async fn create<T: Entity>(&self, entity: &mut T) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        assign_identity(entity, &meta, None)?;
        let grammar = self.grammar(&meta);
        let command = SqlCommand::new(grammar.table(), grammar.insert(entity)?);

        if let Some(uow) = &self.uow {
            return uow.enqueue(CommandKind::Create, command);
        }

        let operation = command.operation(CommandKind::Create);
        let pool = self.resource.pool();
        match meta.auto_increment() {
            Some(_) if self.resource.dialect() == Dialect::Postgres => {
                // RETURNING "<auto column>"
                let row = fetch_optional(pool, &self.ctx, &command.statement, &operation).await?;
                if let Some(row) = row {
                    decode_row(&row, &meta, entity)?;
                }
            }
            Some(auto) => {
                let result = execute(pool, &self.ctx, &command.statement, &operation).await?;
                if let Some(id) = result.last_insert_id() {
                    entity.write(auto.name(), &Value::Int(id))?;
                }
            }
            None => {
                execute(pool, &self.ctx, &command.statement, &operation).await?;
            }
        }
        Ok(())
    }

    async fn update<T: Entity>(
        &self,
        entity: &T,
        request: UpdateRequest<Vec<String>, Predicate>,
    ) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        let grammar = self.grammar(&meta);
        let filter = self.target(
            &grammar,
            entity,
            request.filter,
            DataError::UpdateFullNotAllowed,
        )?;
        let fields = request.fields.unwrap_or_default();
        let statement = grammar.update(entity, &fields, &filter)?;
        self.dispatch(CommandKind::Update, SqlCommand::new(grammar.table(), statement))
            .await
    }

    async fn delete<T: Entity>(
        &self,
        entity: &T,
        filter: Option<Predicate>,
    ) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        let grammar = self.grammar(&meta);
        let filter = self.target(&grammar, entity, filter, DataError::DeleteFullNotAllowed)?;
        let statement = grammar.delete(&filter)?;
        self.dispatch(CommandKind::Delete, SqlCommand::new(grammar.table(), statement))
            .await
    }

    fn query(&self) -> SqlxQuery {
        SqlxQuery::new(self.resource.clone(), self.ctx.clone(), self.table.clone())
    }
}
