mod loader;
pub mod value;

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::resource::BackendKind;

pub use value::{ConfigValue, FromConfigValue};

/// Prefix of every Strata key, and (upper-cased) of the environment
/// variables overlaid on top of the YAML files.
pub const ROOT_KEY: &str = "strata";

const RESOURCES_KEY: &str = "strata.resources";

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Data-layer configuration loaded from YAML files, `.env` files and
/// environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `strata.yaml` (base)
/// 2. `strata-{profile}.yaml` (profile override)
/// 3. `.env` and `.env.{profile}` (loaded into the process environment,
///    never overwriting variables already set)
/// 4. `STRATA_*` environment variables (`STRATA_RESOURCES_MAIN_URL`
///    overrides `strata.resources.main.url`)
///
/// Profile is determined by: `STRATA_PROFILE` env var > argument.
///
/// ```yaml
/// strata:
///   resources:
///     main:
///       kind: postgres
///       url: postgres://app@localhost/app
///       pool: 10
///     docs:
///       kind: mongo
///       url: mongodb://localhost:27017
///       database: app
///       transactional: true
/// ```
#[derive(Debug, Clone)]
pub struct DataConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl DataConfig {
    /// Load from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile)
    }

    /// Load `strata.yaml` and `strata-{profile}.yaml` from `dir`, then the
    /// `.env` files of `dir`, then overlay `STRATA_*` environment variables.
    pub fn load_from(dir: &Path, profile: &str) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("STRATA_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();
        loader::load_yaml_file(&dir.join("strata.yaml"), &mut values)?;
        loader::load_yaml_file(&dir.join(format!("strata-{active_profile}.yaml")), &mut values)?;

        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{active_profile}")));

        loader::overlay_env(ROOT_KEY, std::env::vars(), &mut values);

        tracing::debug!(profile = %active_profile, keys = values.len(), "Loaded data configuration");
        Ok(Self {
            values,
            profile: active_profile,
        })
    }

    /// Create a config from a YAML string (no files, no environment).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(Self {
            values,
            profile: "test".to_string(),
        })
    }

    pub fn empty() -> Self {
        Self {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    fn get_opt<V: FromConfigValue>(&self, key: &str) -> Result<Option<V>, ConfigError> {
        match self.values.get(key) {
            Some(value) => Option::<V>::from_config_value(value, key),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Aliases declared under `strata.resources`, sorted.
    pub fn resource_names(&self) -> Vec<String> {
        let prefix = format!("{RESOURCES_KEY}.");
        let names: BTreeSet<String> = self
            .values
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('.').next())
            .map(str::to_string)
            .collect();
        names.into_iter().collect()
    }

    /// Every declared resource, sorted by alias.
    pub fn resources(&self) -> Result<Vec<ResourceConfig>, ConfigError> {
        self.resource_names()
            .into_iter()
            .map(|name| self.resource(&name))
            .collect()
    }

    /// The resource declared under `strata.resources.<name>`.
    pub fn resource(&self, name: &str) -> Result<ResourceConfig, ConfigError> {
        let key = |field: &str| format!("{RESOURCES_KEY}.{name}.{field}");
        let page_size = match self.get_opt::<u64>(&key("pagesize"))? {
            Some(size) => Some(size),
            None => self.get_opt::<u64>(&key("page_size"))?,
        };
        Ok(ResourceConfig {
            name: name.to_string(),
            kind: self.get(&key("kind"))?,
            url: self.get(&key("url"))?,
            adapter: self.get_opt(&key("adapter"))?,
            database: self.get_opt(&key("database"))?,
            pool_size: self.get_opt(&key("pool"))?.unwrap_or(DEFAULT_POOL_SIZE),
            page_size,
            transactional: self.get_opt(&key("transactional"))?.unwrap_or(false),
            refresh: self.get_opt(&key("refresh"))?,
            username: self.get_opt(&key("username"))?,
            password: self.get_opt(&key("password"))?,
        })
    }
}

pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Connection settings of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    /// Alias used by `ResourceFactory::build_by_name`.
    pub name: String,
    pub kind: BackendKind,
    pub url: String,
    /// `sqlx` (default) or `diesel` for SQL kinds.
    pub adapter: Option<String>,
    /// Database name for the document store.
    pub database: Option<String>,
    pub pool_size: u32,
    /// Overrides the backend's default page size.
    pub page_size: Option<u64>,
    /// Run document-store commits in a session transaction.
    pub transactional: bool,
    /// `refresh` parameter for search-index writes (`true`, `wait_for`).
    pub refresh: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ResourceConfig {
    pub fn new(name: impl Into<String>, kind: BackendKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
            adapter: None,
            database: None,
            pool_size: DEFAULT_POOL_SIZE,
            page_size: None,
            transactional: false,
            refresh: None,
            username: None,
            password: None,
        }
    }
}
