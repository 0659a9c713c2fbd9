//! Request plans: the HTTP calls each operation makes, built without I/O.

use reqwest::{Method, Url};
use serde_json::{json, Map, Value as Json};
use strata_core::{DataError, Paging, Record, TableMetadata, Value};

/// Largest page the cluster returns by default (`index.max_result_window`).
pub const MAX_RESULT_WINDOW: u64 = 10_000;

/// One HTTP call against the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub method: Method,
    /// Unencoded path segments below the cluster URL, e.g. `["people", "_doc", "42"]`.
    pub segments: Vec<String>,
    pub params: Vec<(String, String)>,
    pub body: Option<Json>,
    /// Treat `404 Not Found` as success (deleting a missing document).
    pub allow_missing: bool,
}

impl SearchRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            params: Vec::new(),
            body: None,
            allow_missing: false,
        }
    }

    pub fn body(mut self, body: Json) -> Self {
        self.body = Some(body);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add `refresh=<policy>` when a policy is configured.
    pub fn refresh(self, policy: Option<&str>) -> Self {
        match policy {
            Some(policy) => self.param("refresh", policy),
            None => self,
        }
    }

    pub fn allow_missing(mut self) -> Self {
        self.allow_missing = true;
        self
    }

    /// Segments joined with `/`, unencoded.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// `base` with the segments appended, each percent-encoded.
    pub fn url(&self, base: &Url) -> Result<Url, DataError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| DataError::NotConfigured(format!("cannot append a path to {base}")))?
            .pop_if_empty()
            .extend(&self.segments);
        Ok(url)
    }

    /// Short description for logs and error context: `"POST people/_search"`.
    pub fn operation(&self) -> String {
        format!("{} {}", self.method, self.path())
    }
}

/// Identity as it appears in `_id` and in document paths.
pub fn id_string(id: &Value) -> String {
    match id {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The `_source` stored for `record`: every column except the primary key.
pub fn source<T: Record>(record: &T, meta: &TableMetadata) -> Map<String, Json> {
    meta.columns()
        .iter()
        .filter(|c| !c.is_primary_key())
        .map(|c| {
            let value = record.read(c.name()).unwrap_or(Value::Null);
            (c.name().to_string(), value.to_json())
        })
        .collect()
}

/// A patch must be a non-empty object of fields.
pub fn patch_fields(patch: Json) -> Result<Map<String, Json>, DataError> {
    match patch {
        Json::Object(fields) if !fields.is_empty() => Ok(fields),
        Json::Object(_) => Err(DataError::Grammar("empty update document".into())),
        other => Err(DataError::Grammar(format!(
            "update document must be an object, got {other}"
        ))),
    }
}

/// A filter that constrains something: `null` and `{}` count as none.
/// Reads and writes share this, so `{}` never reaches a by-query endpoint.
pub fn present_filter(filter: Option<Json>) -> Option<Json> {
    filter.filter(|f| match f {
        Json::Null => false,
        Json::Object(map) => !map.is_empty(),
        _ => true,
    })
}

/// `{ "query": <filter> }`, or `match_all` without one.
pub fn query_clause(filter: Option<Json>) -> Json {
    filter.unwrap_or_else(|| json!({ "match_all": {} }))
}

/// Index a document: `PUT <index>/_doc/<id>`, or `POST <index>/_doc` to
/// let the cluster pick the id.
pub fn index_document(index: &str, id: Option<&str>, source: Map<String, Json>) -> SearchRequest {
    match id {
        Some(id) => SearchRequest::new(Method::PUT, [index, "_doc", id]),
        None => SearchRequest::new(Method::POST, [index, "_doc"]),
    }
    .body(Json::Object(source))
}

/// Partial update of one document.
pub fn update_document(index: &str, id: &str, fields: Map<String, Json>) -> SearchRequest {
    SearchRequest::new(Method::POST, [index, "_update", id]).body(json!({ "doc": fields }))
}

/// Update every document matching `filter`, assigning `fields` from a
/// painless script.
pub fn update_by_query(index: &str, filter: Json, fields: Map<String, Json>) -> SearchRequest {
    let script = fields
        .keys()
        .map(|k| {
            let key = k.replace('\\', "\\\\").replace('\'', "\\'");
            format!("ctx._source['{key}'] = params['{key}'];")
        })
        .collect::<Vec<_>>()
        .join(" ");
    SearchRequest::new(Method::POST, [index, "_update_by_query"])
        .param("conflicts", "proceed")
        .body(json!({
            "query": filter,
            "script": { "source": script, "lang": "painless", "params": fields },
        }))
}

pub fn delete_document(index: &str, id: &str) -> SearchRequest {
    SearchRequest::new(Method::DELETE, [index, "_doc", id]).allow_missing()
}

pub fn delete_by_query(index: &str, filter: Json) -> SearchRequest {
    SearchRequest::new(Method::POST, [index, "_delete_by_query"])
        .param("conflicts", "proceed")
        .body(json!({ "query": filter }))
}

pub fn get_document(index: &str, id: &str) -> SearchRequest {
    SearchRequest::new(Method::GET, [index, "_doc", id]).allow_missing()
}

/// Inputs of a `_search`.
#[derive(Debug, Clone, Default)]
pub struct SearchSpec<'a> {
    pub filter: Option<Json>,
    pub fields: &'a [String],
    pub asc: &'a [String],
    pub desc: &'a [String],
    pub paging: Option<Paging>,
}

/// `POST <index>/_search`. Without paging, the first
/// [`MAX_RESULT_WINDOW`] hits are returned.
pub fn search(index: &str, meta: &TableMetadata, spec: SearchSpec<'_>) -> SearchRequest {
    let mut body = Map::new();
    body.insert("query".into(), query_clause(spec.filter));

    let (from, size) = match spec.paging {
        Some(paging) => (paging.offset(), paging.limit()),
        None => (0, MAX_RESULT_WINDOW),
    };
    body.insert("from".into(), json!(from));
    body.insert("size".into(), json!(size));

    let sort: Vec<Json> = spec
        .asc
        .iter()
        .map(|name| json!({ sort_key(meta, name): "asc" }))
        .chain(
            spec.desc
                .iter()
                .map(|name| json!({ sort_key(meta, name): "desc" })),
        )
        .collect();
    if !sort.is_empty() {
        body.insert("sort".into(), Json::Array(sort));
    }

    let source: Vec<Json> = meta
        .columns()
        .iter()
        .filter(|c| !c.is_primary_key())
        .filter(|c| spec.fields.iter().any(|f| f.eq_ignore_ascii_case(c.name())))
        .map(|c| Json::String(c.name().to_string()))
        .collect();
    if !source.is_empty() {
        body.insert("_source".into(), Json::Array(source));
    }

    SearchRequest::new(Method::POST, [index, "_search"]).body(Json::Object(body))
}

/// `POST <index>/_search` with a caller-built body.
pub fn raw_search(index: &str, body: Json) -> SearchRequest {
    SearchRequest::new(Method::POST, [index, "_search"]).body(body)
}

pub fn count(index: &str, filter: Option<Json>) -> SearchRequest {
    SearchRequest::new(Method::POST, [index, "_count"])
        .body(json!({ "query": query_clause(filter) }))
}

fn sort_key(meta: &TableMetadata, name: &str) -> String {
    match meta.column_ci(name) {
        Some(column) if column.is_primary_key() => "_id".to_string(),
        Some(column) => column.name().to_string(),
        None => name.to_string(),
    }
}
