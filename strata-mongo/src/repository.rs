use bson::Document;
use strata_core::{
    assign_identity, metadata, CommandKind, Context, DataError, Entity, IdStrategy, Repository,
    Target, TableMetadata, UpdateRequest, ValueKind,
};

use crate::command::MongoCommand;
use crate::document::{bson_to_value, id_filter, set_all, to_document, update_document};
use crate::query::MongoQuery;
use crate::resource::MongoResource;
use crate::uow::MongoUnitOfWork;

/// Document repository.
///
/// - filter: a BSON query document
/// - patch: an update document (`{ "$inc": {...} }`), or plain fields to `$set`
///
/// Updates and deletes by identity touch one document; by filter, every
/// matching document.
///
/// ```ignore
/// let repo = docs.db(&ctx);
/// repo.create(&mut article).await?;                       // article.id is an ObjectId hex
/// repo.update(&article, UpdateRequest::fields(doc! { "$inc": { "views": 1 } })).await?;
/// repo.delete(&Article::default(), Some(doc! { "draft": true })).await?;
/// ```
pub struct MongoRepository {
    resource: MongoResource,
    ctx: Context,
    uow: Option<MongoUnitOfWork>,
    collection: Option<String>,
}

impl MongoRepository {
    pub(crate) fn new(resource: MongoResource, ctx: Context, uow: Option<MongoUnitOfWork>) -> Self {
        Self {
            resource,
            ctx,
            uow,
            collection: None,
        }
    }

    /// Route writes and queries to another collection.
    pub fn in_table(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn resource(&self) -> &MongoResource {
        &self.resource
    }

    fn collection_name(&self, meta: &TableMetadata) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| meta.name().to_string())
    }

    async fn dispatch(&self, kind: CommandKind, command: MongoCommand) -> Result<(), DataError> {
        match &self.uow {
            Some(uow) => uow.enqueue(kind, command),
            None => {
                let db = self.resource.database();
                self.ctx.run(command.apply(db, None)).await?;
                Ok(())
            }
        }
    }
}

/// Text identities without a declared strategy get an object id.
fn id_fallback(meta: &TableMetadata) -> Option<IdStrategy> {
    meta.primary_key()
        .filter(|pk| pk.kind() == ValueKind::Text && !pk.is_auto_increment())
        .map(|_| IdStrategy::ObjectId)
}

fn resolve_target<T: Entity>(
    entity: &T,
    filter: Option<Document>,
    refused: DataError,
) -> Result<(Document, bool), DataError> {
    match Target::resolve(entity, filter.filter(|f| !f.is_empty())) {
        Some(Target::Filter(filter)) => Ok((filter, true)),
        Some(Target::Identity(id)) => Ok((id_filter(&id), false)),
        None => Err(refused),
    }
}

impl Repository for MongoRepository {
    type Filter = Document;
    type Patch = Document;
    type Query = MongoQuery;

    async fn create<T: Entity>(&self, entity: &mut T) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        assign_identity(entity, &meta, id_fallback(&meta))?;
        let command = MongoCommand::Insert {
            collection: self.collection_name(&meta),
            document: to_document(entity, &meta),
        };

        if let Some(uow) = &self.uow {
            return uow.enqueue(CommandKind::Create, command);
        }
        let db = self.resource.database();
        let inserted = self.ctx.run(command.apply(db, None)).await?;

        // Server-assigned identity, when the entity can hold it.
        if let (Some(pk), Some(id)) = (meta.primary_key(), inserted) {
            let id = bson_to_value(&id);
            let empty = entity.read(pk.name()).map_or(true, |v| v.is_empty());
            if empty && id.kind() == Some(pk.kind()) {
                entity.write(pk.name(), &id)?;
            }
        }
        Ok(())
    }

    async fn update<T: Entity>(
        &self,
        entity: &T,
        request: UpdateRequest<Document, Document>,
    ) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        let (filter, many) =
            resolve_target(entity, request.filter, DataError::UpdateFullNotAllowed)?;
        let update = match request.fields {
            Some(patch) => update_document(patch)?,
            None => set_all(entity, &meta)?,
        };
        let command = MongoCommand::Update {
            collection: self.collection_name(&meta),
            filter,
            update,
            many,
        };
        self.dispatch(CommandKind::Update, command).await
    }

    async fn delete<T: Entity>(
        &self,
        entity: &T,
        filter: Option<Document>,
    ) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        let (filter, many) = resolve_target(entity, filter, DataError::DeleteFullNotAllowed)?;
        let command = MongoCommand::Delete {
            collection: self.collection_name(&meta),
            filter,
            many,
        };
        self.dispatch(CommandKind::Delete, command).await
    }

    fn query(&self) -> MongoQuery {
        MongoQuery::new(self.resource.clone(), self.ctx.clone(), self.collection.clone())
    }
}
