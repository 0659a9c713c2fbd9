use std::sync::Arc;
use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use strata_core::page::SQL_PAGE_SIZE;
use strata_core::{BackendKind, Context, DataError, Dialect, Resource, ResourceConfig};

use crate::error::SqlxErrorExt;
use crate::repository::SqlxRepository;
use crate::uow::SqlxUnitOfWork;

/// A SQL database reached through an `sqlx` pool.
///
/// Cheap to clone; clones share the pool.
///
/// ```ignore
/// let config = ResourceConfig::new("main", BackendKind::Sqlite, "sqlite::memory:");
/// let main = SqlxResource::connect(&config).await?;
/// let repo = main.db(&Context::background());
/// ```
#[derive(Clone)]
pub struct SqlxResource {
    name: Arc<str>,
    kind: BackendKind,
    dialect: Dialect,
    pool: AnyPool,
    page_size: u64,
}

impl std::fmt::Debug for SqlxResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxResource")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl SqlxResource {
    /// Open a pool for a `postgres`, `mysql` or `sqlite` resource.
    ///
    /// In-memory SQLite URLs get a single connection that is never recycled,
    /// so every caller sees the same database.
    pub async fn connect(config: &ResourceConfig) -> Result<Self, DataError> {
        if !config.kind.is_sql() {
            return Err(DataError::NotConfigured(format!(
                "resource `{}` has kind {}, not a SQL database",
                config.name, config.kind
            )));
        }
        sqlx::any::install_default_drivers();

        let pool = pool_options(&config.url, config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| e.context_error(format!("connect to resource {}", config.name)))?;
        tracing::info!(
            name = %config.name,
            kind = %config.kind,
            pool = config.pool_size,
            "Connected SQL resource"
        );

        let resource = Self::from_pool(config.name.clone(), config.kind, pool);
        Ok(match config.page_size {
            Some(size) => resource.with_page_size(size),
            None => resource,
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(name: impl Into<String>, kind: BackendKind, pool: AnyPool) -> Self {
        let dialect = match kind {
            BackendKind::Postgres => Dialect::Postgres,
            BackendKind::MySql => Dialect::MySql,
            BackendKind::Sqlite => Dialect::Sqlite,
            BackendKind::Mongo | BackendKind::Elasticsearch => Dialect::Generic,
        };
        Self {
            name: Arc::from(name.into()),
            kind,
            dialect,
            pool,
            page_size: SQL_PAGE_SIZE,
        }
    }

    /// Page size used when a query pages without an explicit size.
    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }
}

fn pool_options(url: &str, pool_size: u32) -> AnyPoolOptions {
    let options = AnyPoolOptions::new().max_connections(pool_size.max(1));
    if is_sqlite_memory(url) {
        options
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        options
    }
}

fn is_sqlite_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && (url.contains(":memory:") || url.contains("mode=memory"))
}

impl Resource for SqlxResource {
    type Repository = SqlxRepository;
    type UnitOfWork = SqlxUnitOfWork;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn uow(&self) -> SqlxUnitOfWork {
        SqlxUnitOfWork::new(self.clone())
    }

    fn db(&self, ctx: &Context) -> SqlxRepository {
        SqlxRepository::new(self.clone(), ctx.clone(), None)
    }

    fn db_in(&self, ctx: &Context, uow: &SqlxUnitOfWork) -> SqlxRepository {
        SqlxRepository::new(self.clone(), ctx.clone(), Some(uow.clone()))
    }
}
