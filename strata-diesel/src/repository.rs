use strata_core::{
    assign_identity, metadata, CommandKind, Context, DataError, Entity, Grammar, Predicate,
    Repository, Target, TableMetadata, UpdateRequest, Value,
};

use crate::connection::DieselConnection;
use crate::error::DieselErrorExt;
use crate::patch::FieldSet;
use crate::query::DieselQuery;
use crate::resource::DieselResource;
use crate::uow::{DieselCommand, DieselUnitOfWork};

/// Repository over a pool of Diesel connections.
///
/// - filter: [`Predicate`]
/// - patch: [`FieldSet`] (columns to write, columns to leave alone)
///
/// ```ignore
/// let repo = orm.db(&ctx);
/// repo.create(&mut person).await?;
/// repo.update(&person, UpdateRequest::fields(FieldSet::omit(["created_at"]))).await?;
/// ```
pub struct DieselRepository<C: DieselConnection> {
    resource: DieselResource<C>,
    ctx: Context,
    uow: Option<DieselUnitOfWork<C>>,
    table: Option<String>,
}

impl<C: DieselConnection> DieselRepository<C> {
    pub(crate) fn new(
        resource: DieselResource<C>,
        ctx: Context,
        uow: Option<DieselUnitOfWork<C>>,
    ) -> Self {
        Self {
            resource,
            ctx,
            uow,
            table: None,
        }
    }

    /// Route writes and queries to another table with the same columns.
    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn resource(&self) -> &DieselResource<C> {
        &self.resource
    }

    fn grammar<'a>(&'a self, meta: &'a TableMetadata) -> Grammar<'a> {
        Grammar::new(C::DIALECT, meta).with_table(self.table.as_deref())
    }

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

    async fn dispatch(&self, kind: CommandKind, command: DieselCommand) -> Result<(), DataError> {
        if let Some(uow) = &self.uow {
            return uow.enqueue(kind, command);
        }
        let operation = command.operation(kind);
        tracing::debug!(%operation, args = command.statement.args.len(), "Executing Diesel statement");
        let rows = self
            .resource
            .with_transaction(&self.ctx, move |conn| {
                conn.run(&command.statement)
                    .map_err(|e| e.context_error(operation))
            })
            .await?;
        tracing::debug!(rows, "Diesel statement applied");
        Ok(())
    }
}

impl<C: DieselConnection> Repository for DieselRepository<C> {
    type Filter = Predicate;
    type Patch = FieldSet;
    type Query = DieselQuery<C>;

    async fn create<T: Entity>(&self, entity: &mut T) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        assign_identity(entity, &meta, None)?;
        let grammar = self.grammar(&meta);
        let command = DieselCommand::new(grammar.table(), grammar.insert(entity)?);

        if let Some(uow) = &self.uow {
            return uow.enqueue(CommandKind::Create, command);
        }
        let Some(auto) = meta.auto_increment() else {
            return self.dispatch(CommandKind::Create, command).await;
        };

        let operation = command.operation(CommandKind::Create);
        tracing::debug!(%operation, args = command.statement.args.len(), "Executing Diesel statement");
        let id = self
            .resource
            .with_transaction(&self.ctx, move |conn| {
                conn.run(&command.statement)
                    .and_then(|_| conn.last_insert_id())
                    .map_err(|e| e.context_error(operation))
            })
            .await?;
        entity.write(auto.name(), &Value::Int(id))?;
        Ok(())
    }

    async fn update<T: Entity>(
        &self,
        entity: &T,
        request: UpdateRequest<FieldSet, Predicate>,
    ) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        let grammar = self.grammar(&meta);
        let filter = self.target(
            &grammar,
            entity,
            request.filter,
            DataError::UpdateFullNotAllowed,
        )?;
        let fields = match request.fields {
            Some(set) => set.resolve(&meta)?,
            None => Vec::new(),
        };
        let statement = grammar.update(entity, &fields, &filter)?;
        self.dispatch(CommandKind::Update, DieselCommand::new(grammar.table(), statement))
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
        self.dispatch(CommandKind::Delete, DieselCommand::new(grammar.table(), statement))
            .await
    }

    fn query(&self) -> DieselQuery<C> {
        DieselQuery::new(self.resource.clone(), self.ctx.clone(), self.table.clone())
    }
}
