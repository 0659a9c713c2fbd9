use bson::Document;
use futures_util::TryStreamExt;
use mongodb::options::FindOptions;
use strata_core::{
    metadata, Context, DataError, Dialect, Entity, Grammar, Paging, Query, QueryState,
    TableMetadata,
};

use crate::document::{first_into, from_documents, id_filter, storage_key};
use crate::error::MongoErrorExt;
use crate::resource::MongoResource;

/// Fluent query builder over a collection.
///
/// `filter` takes a query document; `exec` runs an aggregation pipeline
/// and binds its output documents to `T`.
///
/// ```ignore
/// let mut popular = Vec::new();
/// docs.db(&ctx)
///     .query()
///     .filter(doc! { "views": { "$gte": 100 } })
///     .desc(["views"])
///     .page_size(5)
///     .find(&mut popular)
///     .await?;
/// ```
pub struct MongoQuery {
    resource: MongoResource,
    ctx: Context,
    base_collection: Option<String>,
    state: QueryState<Document>,
}

/// Sort, projection and paging of a find.
pub fn find_options(
    meta: &TableMetadata,
    fields: &[String],
    asc: &[String],
    desc: &[String],
    paging: Option<Paging>,
) -> FindOptions {
    let mut options = FindOptions::default();

    let mut sort = Document::new();
    for name in asc {
        sort.insert(storage_key(meta, name), 1);
    }
    for name in desc {
        sort.insert(storage_key(meta, name), -1);
    }
    if !sort.is_empty() {
        options.sort = Some(sort);
    }

    let projected = Grammar::new(Dialect::Generic, meta).projection(fields);
    if !fields.is_empty() && projected.len() < meta.columns().len() {
        let mut projection = Document::new();
        for column in projected {
            projection.insert(storage_key(meta, column.name()), 1);
        }
        options.projection = Some(projection);
    }

    if let Some(paging) = paging {
        options.skip = Some(paging.offset());
        options.limit = i64::try_from(paging.limit()).ok();
    }
    options
}

impl MongoQuery {
    pub(crate) fn new(
        resource: MongoResource,
        ctx: Context,
        base_collection: Option<String>,
    ) -> Self {
        Self {
            resource,
            ctx,
            base_collection,
            state: QueryState::default(),
        }
    }

    fn collection_name(&self, meta: &TableMetadata, table: Option<String>) -> String {
        table
            .or_else(|| self.base_collection.clone())
            .unwrap_or_else(|| meta.name().to_string())
    }

    async fn find_documents(
        &self,
        collection: &str,
        filter: Option<Document>,
        options: FindOptions,
    ) -> Result<Vec<Document>, DataError> {
        let operation = format!("find in {collection}");
        tracing::debug!(%operation, "Executing Mongo query");
        let coll = self.resource.database().collection::<Document>(collection);
        self.ctx
            .run(async {
                let cursor = coll
                    .find(filter, options)
                    .await
                    .map_err(|e| e.context_error(operation.as_str()))?;
                cursor
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(|e| e.context_error(operation.as_str()))
            })
            .await
    }
}

/// Every stage of a pipeline is a single-operator document.
fn check_pipeline(pipeline: &[Document]) -> Result<(), DataError> {
    if pipeline.is_empty() {
        return Err(DataError::EmptyStatement);
    }
    for (index, stage) in pipeline.iter().enumerate() {
        let mut keys = stage.keys();
        let valid = matches!(
            (keys.next(), keys.next()),
            (Some(key), None) if key.starts_with('$')
        );
        if !valid {
            return Err(DataError::QueryArgs(format!(
                "pipeline stage {index} must be a single `$` operator document"
            )));
        }
    }
    Ok(())
}

impl Query for MongoQuery {
    type Filter = Document;
    type Statement = Vec<Document>;

    fn state_mut(&mut self) -> &mut QueryState<Document> {
        &mut self.state
    }

    fn default_page_size(&self) -> u64 {
        self.resource.page_size()
    }

    async fn find<T: Entity>(&mut self, out: &mut Vec<T>) -> Result<(), DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let options = find_options(
            &meta,
            &state.fields,
            &state.asc,
            &state.desc,
            state.paging(self.default_page_size()),
        );
        let collection = self.collection_name(&meta, state.table);

        let docs = self
            .find_documents(&collection, state.filter, options)
            .await?;
        *out = from_documents(&docs, &meta)?;
        Ok(())
    }

    async fn first<T: Entity>(&mut self, out: &mut T) -> Result<(), DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let filter = match state.filter.filter(|f| !f.is_empty()) {
            Some(filter) => Some(filter),
            None => {
                let id = out.id();
                (!id.is_empty()).then(|| id_filter(&id))
            }
        };
        let options = find_options(
            &meta,
            &state.fields,
            &state.asc,
            &state.desc,
            Some(Paging::new(1, 1, 1)),
        );
        let collection = self.collection_name(&meta, state.table);

        let docs = self.find_documents(&collection, filter, options).await?;
        first_into(&docs, &meta, out)?;
        Ok(())
    }

    async fn count<T: Entity>(&mut self) -> Result<u64, DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let collection = self.collection_name(&meta, state.table);
        let operation = format!("count {collection}");
        tracing::debug!(%operation, "Executing Mongo query");

        let coll = self.resource.database().collection::<Document>(&collection);
        self.ctx
            .run(async {
                coll.count_documents(state.filter, None)
                    .await
                    .map_err(|e| e.context_error(operation.as_str()))
            })
            .await
    }

    async fn exec<T: Entity>(
        &mut self,
        out: &mut Vec<T>,
        pipeline: Vec<Document>,
    ) -> Result<(), DataError> {
        let state = self.state.take();
        check_pipeline(&pipeline)?;
        let meta = metadata::<T>()?;
        let collection = self.collection_name(&meta, state.table);
        let operation = format!("aggregate {collection}");
        tracing::debug!(%operation, stages = pipeline.len(), "Executing Mongo pipeline");

        let coll = self.resource.database().collection::<Document>(&collection);
        let docs = self
            .ctx
            .run(async {
                let cursor = coll
                    .aggregate(pipeline, None)
                    .await
                    .map_err(|e| e.context_error(operation.as_str()))?;
                cursor
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(|e| e.context_error(operation.as_str()))
            })
            .await?;
        *out = from_documents(&docs, &meta)?;
        Ok(())
    }
}
