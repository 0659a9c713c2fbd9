use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DataError;
use crate::resource::{BackendKind, Resource};

type Shared = Arc<dyn Any + Send + Sync>;

/// Resolves resources by backend kind or by alias.
///
/// ```ignore
/// let factory = ResourceFactory::builder()
///     .register(sqlx_resource)
///     .register(mongo_resource)
///     .build();
/// let docs: MongoResource = factory.build_by_type(BackendKind::Mongo)?;
/// let main: SqlxResource = factory.build_by_name("main")?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct ResourceFactory {
    by_kind: Vec<(BackendKind, Shared)>,
    by_name: HashMap<String, Shared>,
}

impl ResourceFactory {
    pub fn builder() -> ResourceFactoryBuilder {
        ResourceFactoryBuilder::default()
    }

    /// The first registered resource of type `R` with backend `kind`.
    pub fn build_by_type<R: Resource>(&self, kind: BackendKind) -> Result<R, DataError> {
        self.by_kind
            .iter()
            .filter(|(k, _)| *k == kind)
            .find_map(|(_, shared)| shared.downcast_ref::<R>().cloned())
            .ok_or_else(|| DataError::NotConfigured(format!("no {kind} resource")))
    }

    /// The resource registered under `name`, if it has type `R`.
    pub fn build_by_name<R: Resource>(&self, name: &str) -> Result<R, DataError> {
        self.by_name
            .get(name)
            .and_then(|shared| shared.downcast_ref::<R>().cloned())
            .ok_or_else(|| DataError::NotConfigured(format!("no resource named `{name}`")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        let mut kinds = Vec::new();
        for (kind, _) in &self.by_kind {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[derive(Default)]
pub struct ResourceFactoryBuilder {
    factory: ResourceFactory,
}

impl ResourceFactoryBuilder {
    /// Register `resource` under its kind and its name. A later resource
    /// with the same name replaces the earlier one for name lookups.
    pub fn register<R: Resource>(mut self, resource: R) -> Self {
        self.add(resource);
        self
    }

    pub fn add<R: Resource>(&mut self, resource: R) {
        let kind = resource.kind();
        let name = resource.name().to_string();
        tracing::debug!(%kind, name = %name, "Registered resource");
        let shared: Shared = Arc::new(resource);
        self.factory.by_kind.push((kind, Arc::clone(&shared)));
        self.factory.by_name.insert(name, shared);
    }

    pub fn build(self) -> ResourceFactory {
        self.factory
    }
}
