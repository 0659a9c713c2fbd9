use std::any::Any;

use strata_core::{
    BackendKind, BackendUnitOfWork, Batch, BoxFuture, CommandKind, Context, DataError, Drain,
    Resource, UowState,
};

use crate::command::MongoCommand;
use crate::error::MongoErrorExt;
use crate::resource::MongoResource;

/// Unit of work over one Mongo database.
///
/// Transactional resources replay the batch in a session transaction and
/// abort it on the first failure. Otherwise commands apply one by one and
/// the replay stops at the first failure, leaving earlier writes in place.
#[derive(Clone)]
pub struct MongoUnitOfWork {
    resource: MongoResource,
    batch: Batch<MongoCommand>,
}

impl MongoUnitOfWork {
    pub fn new(resource: MongoResource) -> Self {
        Self {
            resource,
            batch: Batch::new(),
        }
    }

    /// The queued commands, in insertion order.
    pub fn commands(&self) -> Vec<(CommandKind, MongoCommand)> {
        self.batch.snapshot()
    }

    pub(crate) fn enqueue(&self, kind: CommandKind, command: MongoCommand) -> Result<(), DataError> {
        tracing::debug!(
            resource = %self.resource.name(),
            operation = %command.operation(),
            "Queued Mongo command"
        );
        self.batch.push(kind, command)
    }

    async fn apply_each(&self, drain: &Drain<MongoCommand>) -> Result<(), DataError> {
        let db = self.resource.database();
        for (_, command) in drain.iter() {
            command.apply(db, None).await?;
        }
        Ok(())
    }

    async fn apply_in_transaction(&self, drain: &Drain<MongoCommand>) -> Result<(), DataError> {
        let db = self.resource.database();
        let mut session = self
            .resource
            .client()
            .start_session(None)
            .await
            .map_err(|e| e.context_error("start session"))?;
        session
            .start_transaction(None)
            .await
            .map_err(|e| e.context_error("start transaction"))?;

        for (_, command) in drain.iter() {
            if let Err(err) = command.apply(db, Some(&mut session)).await {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::warn!(error = %abort, "Failed to abort Mongo transaction");
                }
                return Err(err);
            }
        }
        session
            .commit_transaction()
            .await
            .map_err(|e| e.context_error("commit transaction"))
    }

    async fn replay(&self, ctx: &Context) -> Result<(), DataError> {
        let drain = self.batch.begin_commit()?;
        if drain.is_empty() {
            return Ok(());
        }
        let transactional = self.resource.is_transactional();
        let result = ctx
            .run(async {
                if transactional {
                    self.apply_in_transaction(&drain).await
                } else {
                    self.apply_each(&drain).await
                }
            })
            .await;

        match &result {
            Ok(()) => tracing::info!(
                resource = %self.resource.name(),
                commands = drain.len(),
                transactional,
                "Mongo batch committed"
            ),
            Err(err) => tracing::warn!(
                resource = %self.resource.name(),
                error = %err,
                transactional,
                "Mongo batch aborted"
            ),
        }
        result
    }
}

impl BackendUnitOfWork for MongoUnitOfWork {
    fn kind(&self) -> BackendKind {
        BackendKind::Mongo
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
