//! Strata — one data-access contract over several storage engines.
//!
//! Application code talks to a [`Repository`], a [`Query`] builder and a
//! [`UnitOfWork`]; the backend behind an entity is a deployment detail.
//! This facade re-exports `strata-core` and the enabled backends through a
//! single dependency:
//!
//! ```ignore
//! use strata::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature        | Default | Crate                     |
//! |----------------|---------|---------------------------|
//! | `sqlx`         | **yes** | `strata-sqlx`             |
//! | `sqlite`       | no      | `strata-sqlx/sqlite`      |
//! | `postgres`     | no      | `strata-sqlx/postgres`    |
//! | `mysql`        | no      | `strata-sqlx/mysql`       |
//! | `diesel`       | no      | `strata-diesel` (SQLite)  |
//! | `diesel-mysql` | no      | `strata-diesel/mysql`     |
//! | `mongo`        | no      | `strata-mongo`            |
//! | `search`       | no      | `strata-search`           |
//! | `full`         | no      | All backends              |
//!
//! # Wiring from configuration
//!
//! ```ignore
//! let config = DataConfig::load("dev")?;
//! let factory = strata::connect(&config).await?;
//! let main: SqlxResource = factory.build_by_name("main")?;
//! ```

// Generated code refers to `::strata` when the facade is the dependency.
extern crate self as strata;

pub extern crate strata_core;
pub extern crate strata_macros;

pub use strata_core::*;

#[cfg(feature = "sqlx")]
pub use strata_sqlx;

#[cfg(feature = "diesel")]
pub use strata_diesel;

#[cfg(feature = "mongo")]
pub use strata_mongo;

#[cfg(feature = "search")]
pub use strata_search;

/// Connect every resource declared under `strata.resources` and register
/// it in a [`ResourceFactory`] under both its backend kind and its alias.
///
/// SQL resources use the `sqlx` adapter unless `adapter: diesel` is set.
/// A resource whose backend feature is disabled fails with
/// [`DataError::NotConfigured`].
pub async fn connect(config: &DataConfig) -> Result<ResourceFactory, DataError> {
    let mut builder = ResourceFactory::builder();
    for resource in config.resources()? {
        connect_resource(&resource, &mut builder).await?;
    }
    let factory = builder.build();
    tracing::info!(resources = factory.len(), "Connected data resources");
    Ok(factory)
}

/// Connect one resource and add it to `factory`.
pub async fn connect_resource(
    config: &ResourceConfig,
    factory: &mut ResourceFactoryBuilder,
) -> Result<(), DataError> {
    match config.kind {
        BackendKind::Mongo => backends::mongo(config, factory).await,
        BackendKind::Elasticsearch => backends::search(config, factory),
        _ => match config.adapter.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("sqlx") => backends::sqlx(config, factory).await,
            Some("diesel") => backends::diesel(config, factory).await,
            Some(other) => Err(DataError::NotConfigured(format!(
                "resource `{}` names unknown adapter `{other}` (expected sqlx or diesel)",
                config.name
            ))),
        },
    }
}

#[allow(dead_code)]
fn missing_feature(config: &ResourceConfig, feature: &str) -> DataError {
    DataError::NotConfigured(format!(
        "resource `{}` needs the `{feature}` feature of strata",
        config.name
    ))
}

mod backends {
    use super::*;

    #[cfg(feature = "sqlx")]
    pub(super) async fn sqlx(
        config: &ResourceConfig,
        factory: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        factory.add(strata_sqlx::SqlxResource::connect(config).await?);
        Ok(())
    }

    #[cfg(not(feature = "sqlx"))]
    pub(super) async fn sqlx(
        config: &ResourceConfig,
        _: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        Err(missing_feature(config, "sqlx"))
    }

    #[cfg(feature = "diesel")]
    pub(super) async fn diesel(
        config: &ResourceConfig,
        factory: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        match config.kind {
            BackendKind::Sqlite => factory.add(strata_diesel::SqliteResource::connect(config).await?),
            #[cfg(feature = "diesel-mysql")]
            BackendKind::MySql => factory.add(strata_diesel::MysqlResource::connect(config).await?),
            #[cfg(not(feature = "diesel-mysql"))]
            BackendKind::MySql => return Err(missing_feature(config, "diesel-mysql")),
            other => {
                return Err(DataError::NotConfigured(format!(
                    "resource `{}`: the diesel adapter has no {other} support",
                    config.name
                )))
            }
        }
        Ok(())
    }

    #[cfg(not(feature = "diesel"))]
    pub(super) async fn diesel(
        config: &ResourceConfig,
        _: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        Err(missing_feature(config, "diesel"))
    }

    #[cfg(feature = "mongo")]
    pub(super) async fn mongo(
        config: &ResourceConfig,
        factory: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        factory.add(strata_mongo::MongoResource::connect(config).await?);
        Ok(())
    }

    #[cfg(not(feature = "mongo"))]
    pub(super) async fn mongo(
        config: &ResourceConfig,
        _: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        Err(missing_feature(config, "mongo"))
    }

    #[cfg(feature = "search")]
    pub(super) fn search(
        config: &ResourceConfig,
        factory: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        factory.add(strata_search::SearchResource::connect(config)?);
        Ok(())
    }

    #[cfg(not(feature = "search"))]
    pub(super) fn search(
        config: &ResourceConfig,
        _: &mut ResourceFactoryBuilder,
    ) -> Result<(), DataError> {
        Err(missing_feature(config, "search"))
    }
}

/// Unified prelude — import everything with `use strata::prelude::*`.
///
/// Includes the core prelude plus types from all enabled backends.
pub mod prelude {
    pub use strata_core::prelude::*;
    pub use strata_core::DataConfig;

    #[cfg(feature = "sqlx")]
    pub use strata_sqlx::prelude::*;

    #[cfg(feature = "diesel")]
    pub use strata_diesel::prelude::*;

    #[cfg(feature = "mongo")]
    pub use strata_mongo::prelude::*;

    #[cfg(feature = "search")]
    pub use strata_search::prelude::*;
}
