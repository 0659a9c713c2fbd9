use std::any::Any;

use strata_core::{
    BackendKind, BackendUnitOfWork, Batch, BoxFuture, CommandKind, Context, DataError, Resource,
    UowState,
};

use crate::request::SearchRequest;
use crate::resource::SearchResource;

/// Unit of work over one search cluster.
///
/// The cluster has no transactions: queued requests are sent one by one
/// and the replay stops at the first failure, leaving earlier writes in
/// place.
#[derive(Clone)]
pub struct SearchUnitOfWork {
    resource: SearchResource,
    batch: Batch<SearchRequest>,
}

impl SearchUnitOfWork {
    pub fn new(resource: SearchResource) -> Self {
        Self {
            resource,
            batch: Batch::new(),
        }
    }

    /// The queued requests, in insertion order.
    pub fn requests(&self) -> Vec<(CommandKind, SearchRequest)> {
        self.batch.snapshot()
    }

    pub(crate) fn enqueue(&self, kind: CommandKind, request: SearchRequest) -> Result<(), DataError> {
        tracing::debug!(
            resource = %self.resource.name(),
            operation = %request.operation(),
            "Queued search request"
        );
        self.batch.push(kind, request)
    }

    async fn replay(&self, ctx: &Context) -> Result<(), DataError> {
        let drain = self.batch.begin_commit()?;
        if drain.is_empty() {
            return Ok(());
        }
        let result = ctx
            .run(async {
                for (_, request) in drain.iter() {
                    self.resource.send(request).await?;
                }
                Ok(())
            })
            .await;

        match &result {
            Ok(()) => tracing::info!(
                resource = %self.resource.name(),
                requests = drain.len(),
                "Search batch committed"
            ),
            Err(err) => tracing::warn!(
                resource = %self.resource.name(),
                error = %err,
                "Search batch stopped"
            ),
        }
        result
    }
}

impl BackendUnitOfWork for SearchUnitOfWork {
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
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
