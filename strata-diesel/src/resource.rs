use std::sync::Arc;

use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use strata_core::page::SQL_PAGE_SIZE;
use strata_core::{BackendKind, Context, DataError, Resource, ResourceConfig};

use crate::connection::DieselConnection;
use crate::error::{DieselErrorExt, TransactionError};
use crate::repository::DieselRepository;
use crate::uow::DieselUnitOfWork;

pub type DieselPool<C> = Pool<ConnectionManager<C>>;

/// A SQL database reached through an `r2d2` pool of Diesel connections.
///
/// Diesel is synchronous: every database call is moved to the blocking
/// thread pool with `tokio::task::spawn_blocking`.
///
/// ```ignore
/// use diesel::sqlite::SqliteConnection;
///
/// let config = ResourceConfig::new("orm", BackendKind::Sqlite, "sqlite::memory:");
/// let orm = DieselResource::<SqliteConnection>::connect(&config).await?;
/// orm.db(&ctx).create(&mut person).await?;
/// ```
pub struct DieselResource<C: DieselConnection> {
    name: Arc<str>,
    pool: DieselPool<C>,
    page_size: u64,
}

impl<C: DieselConnection> Clone for DieselResource<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            pool: self.pool.clone(),
            page_size: self.page_size,
        }
    }
}

impl<C: DieselConnection> std::fmt::Debug for DieselResource<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DieselResource")
            .field("name", &self.name)
            .field("kind", &C::KIND)
            .finish()
    }
}

impl<C: DieselConnection> DieselResource<C> {
    /// Build the pool on the blocking thread pool (r2d2 opens its first
    /// connections eagerly).
    ///
    /// In-memory SQLite gets a single connection that is never recycled.
    pub async fn connect(config: &ResourceConfig) -> Result<Self, DataError> {
        if config.kind != C::KIND {
            return Err(DataError::NotConfigured(format!(
                "resource `{}` has kind {}, this pool drives {}",
                config.name,
                config.kind,
                C::KIND
            )));
        }
        let url = C::database_url(&config.url);
        let memory = url.contains(":memory:") || url.contains("mode=memory");
        let size = if memory { 1 } else { config.pool_size.max(1) };

        let pool = tokio::task::spawn_blocking(move || {
            let builder = Pool::builder().max_size(size);
            let builder = if memory {
                builder.idle_timeout(None).max_lifetime(None)
            } else {
                builder
            };
            builder.build(ConnectionManager::<C>::new(url))
        })
        .await
        .map_err(DieselErrorExt::into_data_error)?
        .map_err(|e| e.context_error(format!("connect to resource {}", config.name)))?;

        tracing::info!(
            name = %config.name,
            kind = %config.kind,
            pool = size,
            "Connected Diesel resource"
        );
        let resource = Self::from_pool(config.name.clone(), pool);
        Ok(match config.page_size {
            Some(size) => resource.with_page_size(size),
            None => resource,
        })
    }

    pub fn from_pool(name: impl Into<String>, pool: DieselPool<C>) -> Self {
        Self {
            name: Arc::from(name.into()),
            pool,
            page_size: SQL_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn pool(&self) -> &DieselPool<C> {
        &self.pool
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    ///
    /// The checkout waits at most until the deadline of `ctx`. Once `f`
    /// starts, its own outcome is returned.
    pub async fn with_connection<T, F>(&self, ctx: &Context, f: F) -> Result<T, DataError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConnection<ConnectionManager<C>>) -> Result<T, DataError>
            + Send
            + 'static,
    {
        ctx.check()?;
        let pool = self.pool.clone();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = checkout(&pool, &ctx)?;
            ctx.check()?;
            f(&mut conn)
        })
        .await
        .map_err(DieselErrorExt::into_data_error)?
    }

    /// Run `f` inside `Connection::transaction`.
    ///
    /// `ctx` is checked again after `f` succeeds: a context that ended
    /// meanwhile rolls the transaction back and yields `Cancelled` or
    /// `Timeout`, so a reported failure never leaves rows behind.
    pub async fn with_transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T, DataError>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> Result<T, DataError> + Send + 'static,
    {
        let scope = ctx.clone();
        self.with_connection(ctx, move |conn| {
            C::transaction::<T, TransactionError, _>(&mut **conn, |conn| {
                let value = f(conn)?;
                scope.check()?;
                Ok(value)
            })
            .map_err(TransactionError::into_data_error)
        })
        .await
    }
}

fn checkout<C: DieselConnection>(
    pool: &DieselPool<C>,
    ctx: &Context,
) -> Result<PooledConnection<ConnectionManager<C>>, DataError> {
    let conn = match ctx.remaining() {
        Some(timeout) => pool.get_timeout(timeout),
        None => pool.get(),
    };
    conn.map_err(|e| match ctx.check() {
        Err(ended) => ended,
        Ok(()) => e.context_error("checkout connection"),
    })
}

impl<C: DieselConnection> Resource for DieselResource<C> {
    type Repository = DieselRepository<C>;
    type UnitOfWork = DieselUnitOfWork<C>;

    fn kind(&self) -> BackendKind {
        C::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn uow(&self) -> DieselUnitOfWork<C> {
        DieselUnitOfWork::new(self.clone())
    }

    fn db(&self, ctx: &Context) -> DieselRepository<C> {
        DieselRepository::new(self.clone(), ctx.clone(), None)
    }

    fn db_in(&self, ctx: &Context, uow: &DieselUnitOfWork<C>) -> DieselRepository<C> {
        DieselRepository::new(self.clone(), ctx.clone(), Some(uow.clone()))
    }
}
