use std::sync::Arc;

use reqwest::{Client, StatusCode, Url};
use serde_json::Value as Json;
use strata_core::page::DOCUMENT_PAGE_SIZE;
use strata_core::{BackendKind, Context, DataError, Resource, ResourceConfig};

use crate::error::{HttpErrorExt, SearchError};
use crate::repository::SearchRepository;
use crate::request::SearchRequest;
use crate::uow::SearchUnitOfWork;

/// A search cluster reached over its REST API.
///
/// `refresh` from the configuration (`true`, `wait_for`) is sent with
/// every write so the change is visible to the next search.
///
/// ```ignore
/// let config = ResourceConfig::new("search", BackendKind::Elasticsearch, "http://localhost:9200");
/// let search = SearchResource::connect(&config)?;
/// search.db(&ctx).create(&mut article).await?;
/// ```
#[derive(Clone)]
pub struct SearchResource {
    name: Arc<str>,
    client: Client,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
    refresh: Option<String>,
    page_size: u64,
}

impl std::fmt::Debug for SearchResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchResource")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("refresh", &self.refresh)
            .finish()
    }
}

impl SearchResource {
    /// Build an HTTP client for `config`. No request is made until the
    /// first operation.
    pub fn connect(config: &ResourceConfig) -> Result<Self, DataError> {
        if config.kind != BackendKind::Elasticsearch {
            return Err(DataError::NotConfigured(format!(
                "resource `{}` has kind {}, not elasticsearch",
                config.name, config.kind
            )));
        }
        let base_url = Url::parse(&config.url).map_err(|e| {
            DataError::NotConfigured(format!("resource `{}` has invalid url: {e}", config.name))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DataError::NotConfigured(format!(
                "resource `{}` url {} cannot hold a path",
                config.name, config.url
            )));
        }
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_size.max(1) as usize)
            .build()
            .map_err(|e| e.context_error(format!("connect to resource {}", config.name)))?;

        tracing::info!(name = %config.name, url = %config.url, "Connected search resource");
        let mut resource = Self::from_client(config.name.clone(), client, base_url);
        if let Some(username) = &config.username {
            resource = resource.with_credentials(username.clone(), config.password.clone());
        }
        if let Some(refresh) = &config.refresh {
            resource = resource.with_refresh(refresh.clone());
        }
        Ok(match config.page_size {
            Some(size) => resource.with_page_size(size),
            None => resource,
        })
    }

    pub fn from_client(name: impl Into<String>, client: Client, base_url: Url) -> Self {
        Self {
            name: Arc::from(name.into()),
            client,
            base_url,
            credentials: None,
            refresh: None,
            page_size: DOCUMENT_PAGE_SIZE,
        }
    }

    /// Basic authentication on every request.
    pub fn with_credentials(mut self, username: String, password: Option<String>) -> Self {
        self.credentials = Some((username, password));
        self
    }

    pub fn with_refresh(mut self, policy: impl Into<String>) -> Self {
        self.refresh = Some(policy.into());
        self
    }

    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn refresh(&self) -> Option<&str> {
        self.refresh.as_deref()
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Send one request. Returns the JSON body, or `None` for a `404` the
    /// request allows.
    pub async fn send(&self, request: &SearchRequest) -> Result<Option<Json>, DataError> {
        let operation = request.operation();
        tracing::debug!(%operation, "Sending search request");

        let url = request.url(&self.base_url)?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .query(&request.params);
        if let Some((username, password)) = &self.credentials {
            builder = builder.basic_auth(username, password.as_ref());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| e.context_error(operation.as_str()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND && request.allow_missing {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError {
                status: status.as_u16(),
                body,
            }
            .context_error(operation));
        }
        let body = response
            .json::<Json>()
            .await
            .map_err(|e| e.context_error(operation.as_str()))?;
        Ok(Some(body))
    }
}

impl Resource for SearchResource {
    type Repository = SearchRepository;
    type UnitOfWork = SearchUnitOfWork;

    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn uow(&self) -> SearchUnitOfWork {
        SearchUnitOfWork::new(self.clone())
    }

    fn db(&self, ctx: &Context) -> SearchRepository {
        SearchRepository::new(self.clone(), ctx.clone(), None)
    }

    fn db_in(&self, ctx: &Context, uow: &SearchUnitOfWork) -> SearchRepository {
        SearchRepository::new(self.clone(), ctx.clone(), Some(uow.clone()))
    }
}
