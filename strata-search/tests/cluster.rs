//! End-to-end runs against an in-process stand-in for the cluster's REST
//! API (documents kept in memory, `term`/`range`/`match_all` queries).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use strata_core::prelude::*;
use strata_core::{BackendUnitOfWork, UowState};
use strata_search::SearchResource;

#[derive(Entity, Default, Debug, Clone, PartialEq)]
#[entity(table = "articles")]
struct Article {
    #[entity(pk)]
    id: String,
    title: String,
    views: i64,
    draft: bool,
}

type Index = BTreeMap<String, Map<String, Value>>;

#[derive(Clone, Default)]
struct Cluster {
    indices: Arc<Mutex<BTreeMap<String, Index>>>,
    log: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicU64>,
}

impl Cluster {
    fn record(&self, method: &str, path: String, query: Option<String>) {
        let line = match query {
            Some(q) => format!("{method} {path}?{q}"),
            None => format!("{method} {path}"),
        };
        self.log.lock().unwrap().push(line);
    }

    fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn ids(&self, index: &str) -> Vec<String> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn source(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.indices.lock().unwrap().get(index)?.get(id).cloned()
    }

    /// Matching documents, in id order.
    fn matching(&self, index: &str, query: &Value) -> Vec<(String, Map<String, Value>)> {
        let indices = self.indices.lock().unwrap();
        let Some(docs) = indices.get(index) else {
            return Vec::new();
        };
        docs.iter()
            .filter(|(id, source)| matches_query(id, source, query))
            .map(|(id, source)| (id.clone(), source.clone()))
            .collect()
    }
}

fn field(id: &str, source: &Map<String, Value>, key: &str) -> Value {
    if key == "_id" {
        Value::String(id.to_string())
    } else {
        source.get(key).cloned().unwrap_or(Value::Null)
    }
}

fn matches_query(id: &str, source: &Map<String, Value>, query: &Value) -> bool {
    if let Some(term) = query.get("term").and_then(Value::as_object) {
        return term.iter().all(|(k, v)| field(id, source, k) == *v);
    }
    if let Some(range) = query.get("range").and_then(Value::as_object) {
        return range.iter().all(|(k, bounds)| {
            let value = field(id, source, k).as_f64().unwrap_or(f64::NAN);
            bounds.get("gte").and_then(Value::as_f64).map_or(true, |b| value >= b)
                && bounds.get("lt").and_then(Value::as_f64).map_or(true, |b| value < b)
        });
    }
    true
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.as_str().unwrap_or("").cmp(b.as_str().unwrap_or("")),
    }
}

fn missing(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "_id": id, "found": false, "result": "not_found" })),
    )
        .into_response()
}

async fn index_with_id(
    State(cluster): State<Cluster>,
    Path((index, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    Json(source): Json<Map<String, Value>>,
) -> Json<Value> {
    cluster.record("PUT", format!("{index}/_doc/{id}"), query);
    cluster
        .indices
        .lock()
        .unwrap()
        .entry(index.clone())
        .or_default()
        .insert(id.clone(), source);
    Json(json!({ "_index": index, "_id": id, "result": "created" }))
}

async fn index_auto_id(
    State(cluster): State<Cluster>,
    Path(index): Path<String>,
    RawQuery(query): RawQuery,
    Json(source): Json<Map<String, Value>>,
) -> Json<Value> {
    cluster.record("POST", format!("{index}/_doc"), query);
    let id = format!("gen-{}", cluster.next_id.fetch_add(1, AtomicOrdering::SeqCst));
    cluster
        .indices
        .lock()
        .unwrap()
        .entry(index.clone())
        .or_default()
        .insert(id.clone(), source);
    Json(json!({ "_index": index, "_id": id, "result": "created" }))
}

async fn get_document(
    State(cluster): State<Cluster>,
    Path((index, id)): Path<(String, String)>,
) -> Response {
    cluster.record("GET", format!("{index}/_doc/{id}"), None);
    match cluster.source(&index, &id) {
        Some(source) => Json(json!({ "_id": id, "found": true, "_source": source })).into_response(),
        None => missing(&id),
    }
}

async fn delete_document(
    State(cluster): State<Cluster>,
    Path((index, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    cluster.record("DELETE", format!("{index}/_doc/{id}"), query);
    let removed = cluster
        .indices
        .lock()
        .unwrap()
        .get_mut(&index)
        .and_then(|docs| docs.remove(&id));
    match removed {
        Some(_) => Json(json!({ "_id": id, "result": "deleted" })).into_response(),
        None => missing(&id),
    }
}

async fn update_document(
    State(cluster): State<Cluster>,
    Path((index, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Response {
    cluster.record("POST", format!("{index}/_update/{id}"), query);
    let mut indices = cluster.indices.lock().unwrap();
    let Some(source) = indices.get_mut(&index).and_then(|docs| docs.get_mut(&id)) else {
        return missing(&id);
    };
    if let Some(doc) = body.get("doc").and_then(Value::as_object) {
        for (k, v) in doc {
            source.insert(k.clone(), v.clone());
        }
    }
    Json(json!({ "_id": id, "result": "updated" })).into_response()
}

/// Applies the script parameters directly, which is what the generated
/// painless script does.
async fn update_by_query(
    State(cluster): State<Cluster>,
    Path(index): Path<String>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Json<Value> {
    cluster.record("POST", format!("{index}/_update_by_query"), query);
    let targets = cluster.matching(&index, &body["query"]);
    let params = body["script"]["params"].as_object().cloned().unwrap_or_default();
    let mut indices = cluster.indices.lock().unwrap();
    if let Some(docs) = indices.get_mut(&index) {
        for (id, _) in &targets {
            if let Some(source) = docs.get_mut(id) {
                for (k, v) in &params {
                    source.insert(k.clone(), v.clone());
                }
            }
        }
    }
    Json(json!({ "updated": targets.len() }))
}

async fn delete_by_query(
    State(cluster): State<Cluster>,
    Path(index): Path<String>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Json<Value> {
    cluster.record("POST", format!("{index}/_delete_by_query"), query);
    let targets = cluster.matching(&index, &body["query"]);
    let mut indices = cluster.indices.lock().unwrap();
    if let Some(docs) = indices.get_mut(&index) {
        for (id, _) in &targets {
            docs.remove(id);
        }
    }
    Json(json!({ "deleted": targets.len() }))
}

async fn search(
    State(cluster): State<Cluster>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    cluster.record("POST", format!("{index}/_search"), None);
    let mut docs = cluster.matching(&index, &body["query"]);
    let total = docs.len();

    let sort: Vec<(String, bool)> = body["sort"]
        .as_array()
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_object)
                .flat_map(|o| o.iter().map(|(k, v)| (k.clone(), v == "desc")))
                .collect()
        })
        .unwrap_or_default();
    docs.sort_by(|(a_id, a), (b_id, b)| {
        for (key, desc) in &sort {
            let order = compare(&field(a_id, a, key), &field(b_id, b, key));
            let order = if *desc { order.reverse() } else { order };
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    });

    let from = body["from"].as_u64().unwrap_or(0) as usize;
    let size = body["size"].as_u64().unwrap_or(10) as usize;
    let includes: Option<Vec<String>> = body["_source"].as_array().map(|names| {
        names
            .iter()
            .filter_map(|n| n.as_str().map(str::to_string))
            .collect()
    });
    let hits: Vec<Value> = docs
        .into_iter()
        .skip(from)
        .take(size)
        .map(|(id, mut source)| {
            if let Some(includes) = &includes {
                source.retain(|k, _| includes.contains(k));
            }
            json!({ "_index": index, "_id": id, "_source": source })
        })
        .collect();
    Json(json!({ "hits": { "total": { "value": total }, "hits": hits } }))
}

async fn count(
    State(cluster): State<Cluster>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    cluster.record("POST", format!("{index}/_count"), None);
    Json(json!({ "count": cluster.matching(&index, &body["query"]).len() }))
}

async fn start() -> (SearchResource, Cluster) {
    let cluster = Cluster::default();
    let app = Router::new()
        .route("/{index}/_doc", post(index_auto_id))
        .route(
            "/{index}/_doc/{id}",
            axum::routing::put(index_with_id)
                .get(get_document)
                .delete(delete_document),
        )
        .route("/{index}/_update/{id}", post(update_document))
        .route("/{index}/_update_by_query", post(update_by_query))
        .route("/{index}/_delete_by_query", post(delete_by_query))
        .route("/{index}/_search", post(search))
        .route("/{index}/_count", post(count))
        .with_state(cluster.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = ResourceConfig::new(
        "search",
        BackendKind::Elasticsearch,
        format!("http://{addr}/"),
    );
    config.refresh = Some("wait_for".into());
    (SearchResource::connect(&config).unwrap(), cluster)
}

fn article(id: &str, title: &str, views: i64, draft: bool) -> Article {
    Article {
        id: id.into(),
        title: title.into(),
        views,
        draft,
    }
}

async fn seed(search: &SearchResource, ctx: &Context) {
    let repo = search.db(ctx);
    for (id, title, views, draft) in [
        ("a1", "alpha", 40, false),
        ("a2", "beta", 10, true),
        ("a3", "gamma", 25, false),
        ("a4", "delta", 25, false),
        ("a5", "epsilon", 5, false),
    ] {
        repo.create(&mut article(id, title, views, draft)).await.unwrap();
    }
}

#[tokio::test]
async fn test_create_writes_back_assigned_id() {
    let (search, cluster) = start().await;
    let ctx = Context::background();

    let mut fresh = article("", "fresh", 1, false);
    search.db(&ctx).create(&mut fresh).await.unwrap();
    assert_eq!(fresh.id, "gen-0");

    let stored = cluster.source("articles", "gen-0").unwrap();
    assert_eq!(stored.get("title"), Some(&json!("fresh")));
    assert!(!stored.contains_key("id"));
    assert_eq!(cluster.requests(), vec!["POST articles/_doc?refresh=wait_for"]);
}

#[tokio::test]
async fn test_find_filter_sort_paging() {
    let (search, _cluster) = start().await;
    let ctx = Context::background();
    seed(&search, &ctx).await;

    let mut q = search.db(&ctx).query();
    let mut found: Vec<Article> = Vec::new();
    q.filter(json!({ "term": { "draft": false } }))
        .desc(["views"])
        .asc(["title"])
        .page_size(2)
        .page(2)
        .find(&mut found)
        .await
        .unwrap();
    // Ascending keys sort first, so titles decide: alpha, delta | epsilon, gamma.
    let titles: Vec<&str> = found.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["epsilon", "gamma"]);
    assert_eq!(found[1].id, "a3");
    assert_eq!(found[1].views, 25);

    // The builder is empty again: unpaged, unfiltered, id order.
    q.find(&mut found).await.unwrap();
    assert_eq!(found.len(), 5);
    assert_eq!(found[0].id, "a1");

    q.fields(["title"]).to_array(&mut found).await.unwrap();
    assert_eq!(found[1].title, "beta");
    assert_eq!(found[1].views, 0);
    assert_eq!(found[1].id, "a2");
}

#[tokio::test]
async fn test_first_by_identity_and_filter() {
    let (search, cluster) = start().await;
    let ctx = Context::background();
    seed(&search, &ctx).await;
    let mut q = search.db(&ctx).query();

    let mut by_id = Article {
        id: "a3".into(),
        ..Default::default()
    };
    q.first(&mut by_id).await.unwrap();
    assert_eq!(by_id, article("a3", "gamma", 25, false));
    assert!(cluster.requests().contains(&"GET articles/_doc/a3".to_string()));

    let mut ghost = article("zz", "untouched", 7, true);
    q.first(&mut ghost).await.unwrap();
    assert_eq!(ghost, article("zz", "untouched", 7, true));

    let mut top = Article::default();
    q.filter(json!({ "range": { "views": { "gte": 20 } } }))
        .asc(["views"])
        .first(&mut top)
        .await
        .unwrap();
    assert_eq!(top.id, "a3");

    let mut none = article("", "keep", 0, false);
    q.filter(json!({ "term": { "title": "omega" } }))
        .first(&mut none)
        .await
        .unwrap();
    assert_eq!(none.title, "keep");
}

#[tokio::test]
async fn test_count_and_find_page() {
    let (search, _cluster) = start().await;
    let ctx = Context::background();
    seed(&search, &ctx).await;
    let mut q = search.db(&ctx).query();

    assert_eq!(q.count::<Article>().await.unwrap(), 5);
    let drafts = q
        .filter(json!({ "term": { "draft": true } }))
        .count::<Article>()
        .await
        .unwrap();
    assert_eq!(drafts, 1);

    let page = q
        .filter(json!({ "term": { "draft": false } }))
        .asc(["views"])
        .page_size(3)
        .find_page::<Article>()
        .await
        .unwrap();
    assert_eq!(page.content.len(), 3);
    assert_eq!(page.content[0].title, "epsilon");
    assert_eq!(page.total_elements, 4);
    assert_eq!(page.total_pages, 2);
}

#[tokio::test]
async fn test_update_and_delete() {
    let (search, cluster) = start().await;
    let ctx = Context::background();
    seed(&search, &ctx).await;
    let repo = search.db(&ctx);

    let mut alpha = article("a1", "alpha", 40, false);
    repo.update(&alpha, UpdateRequest::fields(json!({ "views": 41 })))
        .await
        .unwrap();
    alpha.title = "ALPHA".into();
    repo.update(&alpha, UpdateRequest::all()).await.unwrap();
    let stored = cluster.source("articles", "a1").unwrap();
    assert_eq!(stored.get("views"), Some(&json!(40)));
    assert_eq!(stored.get("title"), Some(&json!("ALPHA")));

    repo.update(
        &Article::default(),
        UpdateRequest::fields(json!({ "draft": true })).with_filter(json!({ "term": { "views": 25 } })),
    )
    .await
    .unwrap();
    assert_eq!(cluster.source("articles", "a4").unwrap().get("draft"), Some(&json!(true)));

    repo.delete(&Article::default(), Some(json!({ "term": { "draft": true } })))
        .await
        .unwrap();
    assert_eq!(cluster.ids("articles"), vec!["a1", "a5"]);

    repo.delete(&article("a5", "", 0, false), None).await.unwrap();
    // Already gone: deleting again is not an error.
    repo.delete(&article("a5", "", 0, false), None).await.unwrap();
    assert_eq!(cluster.ids("articles"), vec!["a1"]);

    let err = repo
        .update(&article("nope", "", 0, false), UpdateRequest::fields(json!({ "views": 1 })))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));

    let log = cluster.requests();
    assert!(log.contains(&"POST articles/_update_by_query?conflicts=proceed&refresh=true".to_string()));
    assert!(log.contains(&"DELETE articles/_doc/a5?refresh=wait_for".to_string()));
}

#[tokio::test]
async fn test_exec_raw_body() {
    let (search, _cluster) = start().await;
    let ctx = Context::background();
    seed(&search, &ctx).await;
    let mut q = search.db(&ctx).query();

    let mut out: Vec<Article> = Vec::new();
    q.exec(
        &mut out,
        json!({ "query": { "range": { "views": { "lt": 20 } } }, "sort": [{ "views": "desc" }] }),
    )
    .await
    .unwrap();
    let ids: Vec<&str> = out.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a2", "a5"]);

    let err = q.exec(&mut out, json!({})).await.unwrap_err();
    assert!(matches!(err, DataError::EmptyStatement));
    let err = q.exec(&mut out, json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, DataError::QueryArgs(_)));
    assert_eq!(out.len(), 2);
}

#[tokio::test]
async fn test_unit_of_work_stops_at_first_failure() {
    let (search, cluster) = start().await;
    let ctx = Context::background();
    let uow = search.uow();
    let repo = search.db_in(&ctx, &uow);

    repo.update(&article("nope", "", 0, false), UpdateRequest::fields(json!({ "views": 1 })))
        .await
        .unwrap();
    repo.create(&mut article("k1", "kept", 1, false)).await.unwrap();
    repo.create(&mut article("k2", "also", 2, false)).await.unwrap();
    assert!(cluster.ids("articles").is_empty());

    // Creates replay before the failing update and stay applied.
    let err = uow.commit(&ctx).await.unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));
    assert_eq!(uow.state(), UowState::Closed);
    assert_eq!(cluster.ids("articles"), vec!["k1", "k2"]);
}

#[tokio::test]
async fn test_composite_commit() {
    let (search, cluster) = start().await;
    let ctx = Context::background();
    let uow = UnitOfWork::new();

    search
        .db_with(&ctx, &uow)
        .unwrap()
        .create(&mut article("c1", "composite", 1, false))
        .await
        .unwrap();
    search
        .db_with(&ctx, &uow)
        .unwrap()
        .delete(&article("c0", "", 0, false), None)
        .await
        .unwrap();
    uow.commit(&ctx).await.unwrap();
    assert_eq!(cluster.ids("articles"), vec!["c1"]);
}

#[tokio::test]
async fn test_cancelled_context() {
    let (search, cluster) = start().await;
    let ctx = Context::background();
    ctx.cancel();
    let err = search
        .db(&ctx)
        .create(&mut article("x", "never", 0, false))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Cancelled));
    assert!(cluster.requests().is_empty());
}

#[tokio::test]
async fn test_count_and_descending_ties() {
    let (search, _cluster) = start().await;
    let ctx = Context::background();
    let repo = search.db(&ctx);
    for (id, title, views) in [("p1", "old", 21), ("p2", "young", 11), ("p3", "twin", 11)] {
        repo.create(&mut article(id, title, views, false)).await.unwrap();
    }

    let mut q = repo.query();
    let young = q
        .filter(json!({ "term": { "views": 11 } }))
        .count::<Article>()
        .await
        .unwrap();
    assert_eq!(young, 2);

    let mut found: Vec<Article> = Vec::new();
    q.desc(["views"]).find(&mut found).await.unwrap();
    let views: Vec<i64> = found.iter().map(|a| a.views).collect();
    assert_eq!(views, vec![21, 11, 11]);
    let ids: Vec<&str> = found.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn test_empty_filter_means_no_filter() {
    let (search, cluster) = start().await;
    let ctx = Context::background();
    seed(&search, &ctx).await;
    let repo = search.db(&ctx);

    let mut q = repo.query();
    assert_eq!(q.filter(json!({})).count::<Article>().await.unwrap(), 5);

    let mut by_id = Article {
        id: "a2".into(),
        ..Default::default()
    };
    q.filter(json!({})).first(&mut by_id).await.unwrap();
    assert_eq!(by_id.title, "beta");
    assert!(cluster.requests().contains(&"GET articles/_doc/a2".to_string()));

    let err = repo
        .delete(&Article::default(), Some(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::DeleteFullNotAllowed));
    assert_eq!(cluster.ids("articles").len(), 5);
}

#[tokio::test]
async fn test_ids_are_path_encoded() {
    let (search, cluster) = start().await;
    let ctx = Context::background();
    let repo = search.db(&ctx);
    repo.create(&mut article("a b/c", "odd", 1, false)).await.unwrap();
    assert_eq!(cluster.ids("articles"), vec!["a b/c"]);

    let mut stored = Article {
        id: "a b/c".into(),
        ..Default::default()
    };
    repo.query().first(&mut stored).await.unwrap();
    assert_eq!(stored.title, "odd");
}
