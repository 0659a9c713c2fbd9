use std::fs;

use serial_test::serial;
use strata_core::config::{ConfigError, ConfigValue, DataConfig, DEFAULT_POOL_SIZE};
use strata_core::{BackendKind, DataError, ResourceConfig};

const YAML: &str = r#"
strata:
  resources:
    main:
      kind: postgres
      url: "postgres://app@localhost/app"
      pool: 12
      pagesize: 50
    docs:
      kind: mongodb
      url: "mongodb://localhost:27017"
      database: app
      transactional: true
    search:
      kind: elastic
      url: "http://localhost:9200"
      refresh: wait_for
      username: elastic
      password: secret
"#;

#[test]
fn test_empty_config() {
    let config = DataConfig::empty();
    assert!(config.resource_names().is_empty());
    assert!(matches!(
        config.get::<String>("strata.resources.main.url"),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn test_set_and_get() {
    let mut config = DataConfig::empty();
    config.set("strata.resources.x.pool", ConfigValue::String("7".into()));
    assert_eq!(config.get::<u32>("strata.resources.x.pool").unwrap(), 7);
    assert_eq!(config.get_or("strata.missing", 3i64), 3);
}

#[test]
fn test_resources_from_yaml() {
    let config = DataConfig::from_yaml_str(YAML).unwrap();
    assert_eq!(config.resource_names(), vec!["docs", "main", "search"]);

    let main = config.resource("main").unwrap();
    assert_eq!(main.kind, BackendKind::Postgres);
    assert_eq!(main.url, "postgres://app@localhost/app");
    assert_eq!(main.pool_size, 12);
    assert_eq!(main.page_size, Some(50));
    assert!(!main.transactional);
    assert_eq!(main.adapter, None);

    let docs = config.resource("docs").unwrap();
    assert_eq!(docs.kind, BackendKind::Mongo);
    assert_eq!(docs.database.as_deref(), Some("app"));
    assert!(docs.transactional);
    assert_eq!(docs.pool_size, DEFAULT_POOL_SIZE);

    let search = config.resource("search").unwrap();
    assert_eq!(search.kind, BackendKind::Elasticsearch);
    assert_eq!(search.refresh.as_deref(), Some("wait_for"));
    assert_eq!(search.username.as_deref(), Some("elastic"));
    assert_eq!(search.password.as_deref(), Some("secret"));

    assert_eq!(config.resources().unwrap().len(), 3);
}

#[test]
fn test_missing_url_and_bad_kind() {
    let config = DataConfig::from_yaml_str(
        "strata:\n  resources:\n    a:\n      kind: sqlite\n    b:\n      kind: oracle\n      url: x\n",
    )
    .unwrap();
    assert!(matches!(config.resource("a"), Err(ConfigError::NotFound(_))));
    assert!(matches!(
        config.resource("b"),
        Err(ConfigError::TypeMismatch { .. })
    ));

    let err: DataError = config.resource("a").unwrap_err().into();
    assert!(err.to_string().contains("strata.resources.a.url"));
}

#[test]
fn test_resource_config_defaults() {
    let config = ResourceConfig::new("cache", BackendKind::Sqlite, "sqlite::memory:");
    assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
    assert_eq!(config.page_size, None);
    assert!(!config.transactional);
}

#[test]
#[serial]
fn test_profile_files_and_env_overlay() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("strata.yaml"), YAML).unwrap();
    fs::write(
        dir.path().join("strata-staging.yaml"),
        "strata:\n  resources:\n    main:\n      pool: 3\n",
    )
    .unwrap();
    fs::write(
        dir.path().join(".env"),
        "STRATA_RESOURCES_DOCS_DATABASE=from_dotenv\n",
    )
    .unwrap();

    std::env::remove_var("STRATA_PROFILE");
    std::env::set_var("STRATA_RESOURCES_MAIN_URL", "postgres://env@db/app");

    let config = DataConfig::load_from(dir.path(), "staging").unwrap();
    assert_eq!(config.profile(), "staging");

    let main = config.resource("main").unwrap();
    assert_eq!(main.pool_size, 3);
    assert_eq!(main.url, "postgres://env@db/app");
    assert_eq!(
        config.resource("docs").unwrap().database.as_deref(),
        Some("from_dotenv")
    );

    std::env::remove_var("STRATA_RESOURCES_MAIN_URL");
    std::env::remove_var("STRATA_RESOURCES_DOCS_DATABASE");
}

#[test]
#[serial]
fn test_profile_env_override() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("strata-prod.yaml"),
        "strata:\n  resources:\n    main:\n      kind: sqlite\n      url: \"sqlite:prod.db\"\n",
    )
    .unwrap();

    std::env::set_var("STRATA_PROFILE", "prod");
    let config = DataConfig::load_from(dir.path(), "dev").unwrap();
    std::env::remove_var("STRATA_PROFILE");

    assert_eq!(config.profile(), "prod");
    assert_eq!(config.resource("main").unwrap().url, "sqlite:prod.db");
}

#[test]
fn test_invalid_yaml() {
    assert!(matches!(
        DataConfig::from_yaml_str("strata: [unclosed"),
        Err(ConfigError::Load(_))
    ));
}
