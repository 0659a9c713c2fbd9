use serde_json::Value as Json;
use strata_core::{
    assign_identity, metadata, CommandKind, Context, DataError, Entity, Repository, TableMetadata,
    Target, UpdateRequest, Value, ValueKind,
};

use crate::document::ID_KEY;
use crate::query::SearchQuery;
use crate::request::{self, id_string, patch_fields, present_filter, SearchRequest};
use crate::resource::SearchResource;
use crate::uow::SearchUnitOfWork;

/// Index repository.
///
/// - filter: a query DSL clause (`{"term": {"author": "ann"}}`)
/// - patch: a JSON object of fields to overwrite
///
/// By identity, writes go to `_doc`/`_update`; by filter, to
/// `_update_by_query` (a painless script assigning the patch) and
/// `_delete_by_query`.
///
/// ```ignore
/// let repo = search.db(&ctx);
/// repo.create(&mut article).await?;
/// repo.update(&article, UpdateRequest::fields(json!({ "views": 4 }))).await?;
/// repo.delete(&Article::default(), Some(json!({ "term": { "draft": true } }))).await?;
/// ```
pub struct SearchRepository {
    resource: SearchResource,
    ctx: Context,
    uow: Option<SearchUnitOfWork>,
    index: Option<String>,
}

impl SearchRepository {
    pub(crate) fn new(resource: SearchResource, ctx: Context, uow: Option<SearchUnitOfWork>) -> Self {
        Self {
            resource,
            ctx,
            uow,
            index: None,
        }
    }

    /// Route writes and queries to another index.
    pub fn in_table(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn resource(&self) -> &SearchResource {
        &self.resource
    }

    fn index_name(&self, meta: &TableMetadata) -> String {
        self.index
            .clone()
            .unwrap_or_else(|| meta.name().to_string())
    }

    /// `refresh` for by-query endpoints, which only take a boolean.
    fn refresh_flag(&self) -> Option<&'static str> {
        match self.resource.refresh() {
            None | Some("false") => None,
            Some(_) => Some("true"),
        }
    }

    async fn dispatch(&self, kind: CommandKind, plan: SearchRequest) -> Result<(), DataError> {
        match &self.uow {
            Some(uow) => uow.enqueue(kind, plan),
            None => {
                self.ctx.run(self.resource.send(&plan)).await?;
                Ok(())
            }
        }
    }
}

impl Repository for SearchRepository {
    type Filter = Json;
    type Patch = Json;
    type Query = SearchQuery;

    async fn create<T: Entity>(&self, entity: &mut T) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        assign_identity(entity, &meta, None)?;
        let id = entity.id();
        let id = (!id.is_empty()).then(|| id_string(&id));
        let plan = request::index_document(
            &self.index_name(&meta),
            id.as_deref(),
            request::source(entity, &meta),
        )
        .refresh(self.resource.refresh());

        if let Some(uow) = &self.uow {
            return uow.enqueue(CommandKind::Create, plan);
        }
        let response = self.ctx.run(self.resource.send(&plan)).await?;

        // Cluster-assigned `_id`, when the entity holds a text identity.
        let assigned = response
            .as_ref()
            .and_then(|body| body.get(ID_KEY))
            .and_then(Json::as_str);
        if let (None, Some(pk), Some(assigned)) = (id, meta.primary_key(), assigned) {
            if pk.kind() == ValueKind::Text {
                entity.write(pk.name(), &Value::Text(assigned.to_string()))?;
            }
        }
        Ok(())
    }

    async fn update<T: Entity>(
        &self,
        entity: &T,
        update: UpdateRequest<Json, Json>,
    ) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        let target = Target::resolve(entity, present_filter(update.filter))
            .ok_or(DataError::UpdateFullNotAllowed)?;
        let fields = match update.fields {
            Some(patch) => patch_fields(patch)?,
            None => request::source(entity, &meta),
        };
        let index = self.index_name(&meta);
        let plan = match target {
            Target::Identity(id) => request::update_document(&index, &id_string(&id), fields)
                .refresh(self.resource.refresh()),
            Target::Filter(filter) => {
                request::update_by_query(&index, filter, fields).refresh(self.refresh_flag())
            }
        };
        self.dispatch(CommandKind::Update, plan).await
    }

    async fn delete<T: Entity>(&self, entity: &T, filter: Option<Json>) -> Result<(), DataError> {
        let meta = metadata::<T>()?;
        let index = self.index_name(&meta);
        let plan = match Target::resolve(entity, present_filter(filter)) {
            Some(Target::Identity(id)) => request::delete_document(&index, &id_string(&id))
                .refresh(self.resource.refresh()),
            Some(Target::Filter(filter)) => {
                request::delete_by_query(&index, filter).refresh(self.refresh_flag())
            }
            None => return Err(DataError::DeleteFullNotAllowed),
        };
        self.dispatch(CommandKind::Delete, plan).await
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(self.resource.clone(), self.ctx.clone(), self.index.clone())
    }
}
