use serde_json::Value as Json;
use strata_core::{metadata, Context, DataError, Entity, Paging, Query, QueryState, TableMetadata};

use crate::document::{count_of, from_hit, from_hits};
use crate::request::{self, id_string, present_filter, SearchRequest, SearchSpec};
use crate::resource::SearchResource;

/// Fluent query builder over an index.
///
/// `filter` takes a query DSL clause; `exec` sends a complete search body
/// and binds its hits to `T`.
///
/// ```ignore
/// let mut recent = Vec::new();
/// search.db(&ctx)
///     .query()
///     .filter(json!({ "match": { "title": "rust" } }))
///     .desc(["published_at"])
///     .page(2)
///     .find(&mut recent)
///     .await?;
/// ```
pub struct SearchQuery {
    resource: SearchResource,
    ctx: Context,
    base_index: Option<String>,
    state: QueryState<Json>,
}

impl SearchQuery {
    pub(crate) fn new(resource: SearchResource, ctx: Context, base_index: Option<String>) -> Self {
        Self {
            resource,
            ctx,
            base_index,
            state: QueryState::default(),
        }
    }

    fn index_name(&self, meta: &TableMetadata, table: Option<String>) -> String {
        table
            .or_else(|| self.base_index.clone())
            .unwrap_or_else(|| meta.name().to_string())
    }

    async fn send(&self, request: SearchRequest) -> Result<Option<Json>, DataError> {
        self.ctx.run(self.resource.send(&request)).await
    }

    async fn hits<T: Entity>(
        &self,
        request: SearchRequest,
        meta: &TableMetadata,
    ) -> Result<Vec<T>, DataError> {
        match self.send(request).await? {
            Some(body) => from_hits(&body, meta),
            None => Ok(Vec::new()),
        }
    }
}

/// A search body must be a non-empty object.
fn check_body(body: &Json) -> Result<(), DataError> {
    match body {
        Json::Null => Err(DataError::EmptyStatement),
        Json::Object(map) if map.is_empty() => Err(DataError::EmptyStatement),
        Json::Object(_) => Ok(()),
        other => Err(DataError::QueryArgs(format!(
            "search body must be a JSON object, got {other}"
        ))),
    }
}

impl Query for SearchQuery {
    type Filter = Json;
    type Statement = Json;

    fn state_mut(&mut self) -> &mut QueryState<Json> {
        &mut self.state
    }

    fn default_page_size(&self) -> u64 {
        self.resource.page_size()
    }

    async fn find<T: Entity>(&mut self, out: &mut Vec<T>) -> Result<(), DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let paging = state.paging(self.default_page_size());
        let index = self.index_name(&meta, state.table);
        let request = request::search(
            &index,
            &meta,
            SearchSpec {
                filter: present_filter(state.filter),
                fields: &state.fields,
                asc: &state.asc,
                desc: &state.desc,
                paging,
            },
        );
        *out = self.hits(request, &meta).await?;
        Ok(())
    }

    async fn first<T: Entity>(&mut self, out: &mut T) -> Result<(), DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let index = self.index_name(&meta, state.table);
        let filter = present_filter(state.filter);

        // Identity lookups read the document directly.
        let id = out.id();
        if filter.is_none() && !id.is_empty() {
            let request = request::get_document(&index, &id_string(&id));
            if let Some(doc) = self.send(request).await? {
                if doc.get("found").and_then(Json::as_bool) != Some(false) {
                    from_hit(&doc, &meta, out)?;
                }
            }
            return Ok(());
        }

        let request = request::search(
            &index,
            &meta,
            SearchSpec {
                filter,
                fields: &state.fields,
                asc: &state.asc,
                desc: &state.desc,
                paging: Some(Paging::new(1, 1, 1)),
            },
        );
        let body = self.send(request).await?;
        let hit = body
            .as_ref()
            .and_then(|b| b.pointer("/hits/hits/0"));
        if let Some(hit) = hit {
            from_hit(hit, &meta, out)?;
        }
        Ok(())
    }

    async fn count<T: Entity>(&mut self) -> Result<u64, DataError> {
        let state = self.state.take();
        let meta = metadata::<T>()?;
        let index = self.index_name(&meta, state.table);
        match self.send(request::count(&index, present_filter(state.filter))).await? {
            Some(body) => count_of(&body),
            None => Ok(0),
        }
    }

    async fn exec<T: Entity>(&mut self, out: &mut Vec<T>, body: Json) -> Result<(), DataError> {
        let state = self.state.take();
        check_body(&body)?;
        let meta = metadata::<T>()?;
        let index = self.index_name(&meta, state.table);
        *out = self.hits(request::raw_search(&index, body), &meta).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_body() {
        assert!(matches!(check_body(&Json::Null), Err(DataError::EmptyStatement)));
        assert!(matches!(check_body(&json!({})), Err(DataError::EmptyStatement)));
        assert!(matches!(check_body(&json!("match")), Err(DataError::QueryArgs(_))));
        assert!(check_body(&json!({ "query": { "match_all": {} } })).is_ok());
    }
}
