//! Generic SQL manager tests.
//!
//! SQLite hosts run everywhere; PostgreSQL tests need DATABASE_URL.

use datasource::config::DatasourceConfig;
use datasource::db::{
    ConnectParams, ConnectionRegistry, DatasourceManager, FingerprintPolicy, GenericSqlManager,
    Value,
};
use std::sync::Arc;
use tempfile::tempdir;
use url::Url;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

fn sqlite_params(dir: &tempfile::TempDir) -> ConnectParams {
    let path = dir.path().join("generic.db");
    ConnectParams::new("sqlite:", "", "", &path.display().to_string())
}

#[tokio::test]
async fn test_sqlite_host_executes_statements() {
    let dir = tempdir().unwrap();
    let mut manager =
        GenericSqlManager::new(&DatasourceConfig::default(), ConnectionRegistry::shared());

    manager.connect(&sqlite_params(&dir)).await.unwrap();
    assert!(!manager.folds_case());

    manager
        .exec("CREATE TABLE links (id INTEGER PRIMARY KEY, href TEXT)", &[])
        .await
        .unwrap();
    manager
        .exec("INSERT INTO links (href) VALUES (?)", &[Value::from("/about")])
        .await
        .unwrap();
    assert_eq!(manager.insert_id("links").await.unwrap(), 1);

    let mut rows = manager
        .exec("SELECT id, href FROM links", &[])
        .await
        .unwrap()
        .into_rows()
        .unwrap();
    let record = manager.fetch_array(&mut rows).unwrap();

    assert_eq!(record.get("id"), Some(&Value::Int(1)));
    assert_eq!(record.get("href"), Some(&Value::String("/about".to_string())));
}

#[tokio::test]
async fn test_stable_policy_reuses_handle() {
    let dir = tempdir().unwrap();
    let registry = ConnectionRegistry::shared();
    let config = DatasourceConfig::default();
    let mut first = GenericSqlManager::new(&config, registry.clone());
    let mut second = GenericSqlManager::new(&config, registry.clone());

    let a = first.connect(&sqlite_params(&dir)).await.unwrap();
    let b = second.connect(&sqlite_params(&dir)).await.unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_salted_policy_opens_fresh_handles() {
    let dir = tempdir().unwrap();
    let registry = ConnectionRegistry::shared();
    let config = DatasourceConfig {
        fingerprint: FingerprintPolicy::Salted,
        ..Default::default()
    };
    let mut first = GenericSqlManager::new(&config, registry.clone());
    let mut second = GenericSqlManager::new(&config, registry.clone());

    let a = first.connect(&sqlite_params(&dir)).await.unwrap();
    let b = second.connect(&sqlite_params(&dir)).await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_unreachable_host_fails_cleanly() {
    let mut manager =
        GenericSqlManager::new(&DatasourceConfig::default(), ConnectionRegistry::shared());
    let params = ConnectParams::new("postgres://127.0.0.1:1", "nobody", "nothing", "crawl");

    assert!(manager.connect(&params).await.is_err());
    assert!(!manager.is_connected());
    assert!(manager.exec("SELECT 1", &[]).await.is_err());
}

#[tokio::test]
async fn test_postgres_folds_field_names() {
    let Some(url) = get_test_database_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let url = Url::parse(&url).unwrap();
    let host = format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or("localhost"),
        url.port().unwrap_or(5432)
    );
    let params = ConnectParams::new(
        &host,
        url.username(),
        url.password().unwrap_or(""),
        url.path().trim_start_matches('/'),
    );

    let mut manager =
        GenericSqlManager::new(&DatasourceConfig::default(), ConnectionRegistry::shared());
    manager.connect(&params).await.unwrap();
    assert!(manager.folds_case());

    manager
        .exec("CREATE TEMPORARY TABLE crawl (id SERIAL PRIMARY KEY, url TEXT)", &[])
        .await
        .unwrap();
    manager
        .exec("INSERT INTO crawl (url) VALUES ($1)", &[Value::from("http://example.com")])
        .await
        .unwrap();
    assert_eq!(manager.insert_id("crawl").await.unwrap(), 1);

    let mut rows = manager
        .exec("SELECT url FROM crawl", &[])
        .await
        .unwrap()
        .into_rows()
        .unwrap();
    let record = manager.fetch_array(&mut rows).unwrap();
    assert_eq!(
        record.get("URL"),
        Some(&Value::String("http://example.com".to_string()))
    );
}
