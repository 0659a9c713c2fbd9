use std::any::Any;

use strata_core::{
    BackendKind, BackendUnitOfWork, Batch, BoxFuture, CommandKind, Context, DataError, Resource,
    Statement, UowState,
};

use crate::codec::build_query;
use crate::error::SqlxErrorExt;
use crate::resource::SqlxResource;

/// A statement queued by a repository, bound with the entity's values at
/// the time it was queued.
#[derive(Debug, Clone)]
pub struct SqlCommand {
    pub table: String,
    pub statement: Statement,
}

impl SqlCommand {
    pub fn new(table: impl Into<String>, statement: Statement) -> Self {
        Self {
            table: table.into(),
            statement,
        }
    }

    pub(crate) fn operation(&self, kind: CommandKind) -> String {
        match kind {
            CommandKind::Create => format!("insert into {}", self.table),
            CommandKind::Delete => format!("delete from {}", self.table),
            CommandKind::Update => format!("update {}", self.table),
        }
    }
}

/// Unit of work replaying its statements in one database transaction.
///
/// Any failure rolls back the whole batch.
#[derive(Clone)]
pub struct SqlxUnitOfWork {
    resource: SqlxResource,
    batch: Batch<SqlCommand>,
}

impl SqlxUnitOfWork {
    pub fn new(resource: SqlxResource) -> Self {
        Self {
            resource,
            batch: Batch::new(),
        }
    }

    pub(crate) fn enqueue(&self, kind: CommandKind, command: SqlCommand) -> Result<(), DataError> {
        tracing::debug!(
            resource = %self.resource.name(),
            operation = %command.operation(kind),
            "Queued SQL command"
        );
        self.batch.push(kind, command)
    }

    async fn replay(&self, ctx: &Context) -> Result<(), DataError> {
        let drain = self.batch.begin_commit()?;
        if drain.is_empty() {
            return Ok(());
        }
        let pool = self.resource.pool();

        let result = ctx
            .run(async {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| e.context_error("begin transaction"))?;
                for (kind, command) in drain.iter() {
                    build_query(&command.statement.sql, &command.statement.args)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| e.context_error(command.operation(*kind)))?;
                }
                tx.commit()
                    .await
                    .map_err(|e| e.context_error("commit transaction"))
            })
            .await;

        match &result {
            Ok(()) => tracing::info!(
                resource = %self.resource.name(),
                commands = drain.len(),
                "SQL batch committed"
            ),
            Err(err) => tracing::warn!(
                resource = %self.resource.name(),
                error = %err,
                "SQL batch rolled back"
            ),
        }
        result
    }
}

impl BackendUnitOfWork for SqlxUnitOfWork {
    fn kind(&self) -> BackendKind {
        self.resource.kind()
    }

    fn state(&self) -> UowState {
        self.batch.state()
    }

    fn pending(&self) -> usize {
        self.batch.len()
    }

    fn commit<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), DataError>> {
        Box::pin(self.replay(ctx))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
