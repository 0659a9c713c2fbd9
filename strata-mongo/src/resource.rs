use std::sync::Arc;

use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Database};
use strata_core::page::DOCUMENT_PAGE_SIZE;
use strata_core::{BackendKind, Context, DataError, Resource, ResourceConfig};

use crate::error::MongoErrorExt;
use crate::repository::MongoRepository;
use crate::uow::MongoUnitOfWork;

/// A MongoDB database.
///
/// With `transactional: true` in its configuration, units of work commit
/// inside a session transaction (replica set or sharded cluster required).
///
/// ```ignore
/// let config = ResourceConfig::new("docs", BackendKind::Mongo, "mongodb://localhost:27017/app");
/// let docs = MongoResource::connect(&config).await?;
/// docs.db(&ctx).create(&mut article).await?;
/// ```
#[derive(Clone)]
pub struct MongoResource {
    name: Arc<str>,
    client: Client,
    database: Database,
    page_size: u64,
    transactional: bool,
}

impl std::fmt::Debug for MongoResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoResource")
            .field("name", &self.name)
            .field("database", &self.database.name())
            .field("transactional", &self.transactional)
            .finish()
    }
}

impl MongoResource {
    /// Build a client for `config`. The database is `config.database`, or
    /// the one named in the URL.
    ///
    /// The driver connects lazily: an unreachable server surfaces on the
    /// first operation.
    pub async fn connect(config: &ResourceConfig) -> Result<Self, DataError> {
        if config.kind != BackendKind::Mongo {
            return Err(DataError::NotConfigured(format!(
                "resource `{}` has kind {}, not mongo",
                config.name, config.kind
            )));
        }
        let context = format!("connect to resource {}", config.name);
        let mut options = ClientOptions::parse(&config.url)
            .await
            .map_err(|e| e.context_error(context.as_str()))?;
        options.max_pool_size = Some(config.pool_size.max(1));
        if let Some(username) = &config.username {
            let mut credential = Credential::default();
            credential.username = Some(username.clone());
            credential.password = config.password.clone();
            options.credential = Some(credential);
        }
        let database = config
            .database
            .clone()
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| {
                DataError::NotConfigured(format!(
                    "resource `{}` names no database (set `database` or put it in the url)",
                    config.name
                ))
            })?;
        let client = Client::with_options(options).map_err(|e| e.context_error(context))?;

        tracing::info!(
            name = %config.name,
            database = %database,
            transactional = config.transactional,
            "Connected Mongo resource"
        );
        let resource = Self::from_client(config.name.clone(), client, &database)
            .with_transactions(config.transactional);
        Ok(match config.page_size {
            Some(size) => resource.with_page_size(size),
            None => resource,
        })
    }

    pub fn from_client(name: impl Into<String>, client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self {
            name: Arc::from(name.into()),
            client,
            database: db,
            page_size: DOCUMENT_PAGE_SIZE,
            transactional: false,
        }
    }

    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Commit units of work inside a session transaction.
    pub fn with_transactions(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }
}

impl Resource for MongoResource {
    type Repository = MongoRepository;
    type UnitOfWork = MongoUnitOfWork;

    fn kind(&self) -> BackendKind {
        BackendKind::Mongo
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn uow(&self) -> MongoUnitOfWork {
        MongoUnitOfWork::new(self.clone())
    }

    fn db(&self, ctx: &Context) -> MongoRepository {
        MongoRepository::new(self.clone(), ctx.clone(), None)
    }

    fn db_in(&self, ctx: &Context, uow: &MongoUnitOfWork) -> MongoRepository {
        MongoRepository::new(self.clone(), ctx.clone(), Some(uow.clone()))
    }
}
