use std::any::Any;

use strata_core::{
    BackendKind, BackendUnitOfWork, Batch, BoxFuture, CommandKind, Context, DataError, Resource,
    Statement, UowState,
};

use crate::connection::DieselConnection;
use crate::error::DieselErrorExt;
use crate::resource::DieselResource;

/// A statement queued by a Diesel repository.
#[derive(Debug, Clone)]
pub struct DieselCommand {
    pub table: String,
    pub statement: Statement,
}

impl DieselCommand {
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

/// Unit of work replaying its statements inside `Connection::transaction`.
pub struct DieselUnitOfWork<C: DieselConnection> {
    resource: DieselResource<C>,
    batch: Batch<DieselCommand>,
}

impl<C: DieselConnection> Clone for DieselUnitOfWork<C> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            batch: self.batch.clone(),
        }
    }
}

impl<C: DieselConnection> DieselUnitOfWork<C> {
    pub fn new(resource: DieselResource<C>) -> Self {
        Self {
            resource,
            batch: Batch::new(),
        }
    }

    pub(crate) fn enqueue(&self, kind: CommandKind, command: DieselCommand) -> Result<(), DataError> {
        tracing::debug!(
            resource = %self.resource.name(),
            operation = %command.operation(kind),
            "Queued Diesel command"
        );
        self.batch.push(kind, command)
    }

    async fn replay(&self, ctx: &Context) -> Result<(), DataError> {
        let drain = self.batch.begin_commit()?;
        if drain.is_empty() {
            return Ok(());
        }
        let commands: Vec<(CommandKind, DieselCommand)> = drain.iter().cloned().collect();
        let count = commands.len();

        let result = self
            .resource
            .with_transaction(ctx, move |conn| {
                for (kind, command) in &commands {
                    conn.run(&command.statement)
                        .map_err(|e| e.context_error(command.operation(*kind)))?;
                }
                Ok(())
            })
            .await;
        drop(drain);

        match &result {
            Ok(()) => tracing::info!(
                resource = %self.resource.name(),
                commands = count,
                "Diesel batch committed"
            ),
            Err(err) => tracing::warn!(
                resource = %self.resource.name(),
                error = %err,
                "Diesel batch rolled back"
            ),
        }
        result
    }
}

impl<C: DieselConnection> BackendUnitOfWork for DieselUnitOfWork<C> {
    fn kind(&self) -> BackendKind {
        C::KIND
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
