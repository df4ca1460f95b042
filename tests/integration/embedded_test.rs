//! Embedded file manager against real SQLite files.

use datasource::db::{
    ConnectParams, ConnectionRegistry, DatasourceManager, EmbeddedFileManager, ExecOutcome, Value,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn crawl_index() -> ConnectParams {
    ConnectParams::new("", "", "", "crawl_index")
}

async fn create_manager(dir: &tempfile::TempDir) -> EmbeddedFileManager {
    EmbeddedFileManager::new(dir.path(), ConnectionRegistry::shared()).await
}

#[tokio::test]
async fn test_crawl_index_round_trip() {
    let dir = tempdir().unwrap();
    let mut manager = create_manager(&dir).await;
    assert!(manager.is_available());

    manager.connect(&crawl_index()).await.unwrap();
    assert!(dir.path().join("crawl_index.db").exists());

    manager
        .exec("CREATE TABLE pages (id INTEGER PRIMARY KEY, url TEXT)", &[])
        .await
        .unwrap();

    let outcome = manager
        .exec(
            "INSERT INTO pages (url) VALUES (?)",
            &[Value::from("http://example.com")],
        )
        .await
        .unwrap();
    assert_eq!(outcome.count(), Some(1));
    assert_eq!(manager.affected_rows(), 1);
    assert!(manager.insert_id("").await.unwrap() > 0);

    let mut rows = manager
        .exec("SELECT url FROM pages", &[])
        .await
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(manager.affected_rows(), 1);

    let record = manager.fetch_array(&mut rows).unwrap();
    assert_eq!(
        record.to_json(),
        serde_json::json!({ "url": "http://example.com" })
    );
    assert!(manager.fetch_array(&mut rows).is_none());
}

#[tokio::test]
async fn test_insert_ids_increase() {
    let dir = tempdir().unwrap();
    let mut manager = create_manager(&dir).await;
    manager.connect(&crawl_index()).await.unwrap();
    manager
        .exec("CREATE TABLE pages (id INTEGER PRIMARY KEY, url TEXT)", &[])
        .await
        .unwrap();

    let mut ids = Vec::new();
    for url in ["http://a.example", "http://b.example"] {
        manager
            .exec("INSERT INTO pages (url) VALUES (?)", &[Value::from(url)])
            .await
            .unwrap();
        ids.push(manager.insert_id("pages").await.unwrap());
    }

    assert_eq!(ids, vec![1, 2]);
    assert_eq!(manager.cached_sql(), Some("INSERT INTO pages (url) VALUES (?)"));
}

#[tokio::test]
async fn test_identical_connects_share_handle() {
    let dir = tempdir().unwrap();
    let registry = ConnectionRegistry::shared();
    let mut first = EmbeddedFileManager::new(dir.path(), registry.clone()).await;
    let mut second = EmbeddedFileManager::new(dir.path(), registry.clone()).await;

    let a = first.connect(&crawl_index()).await.unwrap();
    let b = second.connect(&crawl_index()).await.unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_plain_write_reports_success_sentinel() {
    let dir = tempdir().unwrap();
    let mut manager = create_manager(&dir).await;
    manager.connect(&crawl_index()).await.unwrap();
    manager
        .exec("CREATE TABLE pages (id INTEGER PRIMARY KEY, url TEXT)", &[])
        .await
        .unwrap();

    let outcome = manager
        .exec("UPDATE pages SET url = 'x' WHERE id = -1", &[])
        .await
        .unwrap();

    assert!(matches!(outcome, ExecOutcome::Count(1)));
    assert_eq!(manager.affected_rows(), 0);
}

#[tokio::test]
async fn test_escape_string_survives_literal_round_trip() {
    let dir = tempdir().unwrap();
    let mut manager = create_manager(&dir).await;
    manager.connect(&crawl_index()).await.unwrap();

    for raw in ["O'Brien", r"C:\path\to", "it''s", "plain", "nul\0byte", "q'\0\\"] {
        let escaped = manager.escape_string(raw);
        let sql = format!("SELECT '{escaped}' AS v");

        let mut rows = manager.exec(&sql, &[]).await.unwrap().into_rows().unwrap();
        let record = manager.fetch_array(&mut rows).unwrap();

        assert_eq!(record.get("v"), Some(&Value::String(raw.to_string())));
    }
}

#[tokio::test]
async fn test_database_path_with_separator_is_literal() {
    let data = tempdir().unwrap();
    let elsewhere = tempdir().unwrap();
    let path = elsewhere.path().join("archive.sqlite");

    let mut manager = create_manager(&data).await;
    manager
        .connect(&ConnectParams::new("", "", "", &path.display().to_string()))
        .await
        .unwrap();
    manager
        .exec("CREATE TABLE t (id INTEGER)", &[])
        .await
        .unwrap();

    assert!(path.exists());
    assert!(!data.path().join("archive.sqlite.db").exists());
}

#[tokio::test]
async fn test_data_dir_with_url_reserved_characters() {
    let root = tempdir().unwrap();

    for name in ["pct%41dir", "q?dir", "hash#dir"] {
        let data_dir = root.path().join(name);
        let mut manager = EmbeddedFileManager::new(&data_dir, ConnectionRegistry::shared()).await;

        manager.connect(&crawl_index()).await.unwrap();
        manager
            .exec("CREATE TABLE pages (id INTEGER PRIMARY KEY, url TEXT)", &[])
            .await
            .unwrap();

        assert!(data_dir.join("crawl_index.db").exists(), "missing db in {name}");
    }
}

#[tokio::test]
async fn test_sql_error_is_reported_not_raised() {
    let dir = tempdir().unwrap();
    let mut manager = create_manager(&dir).await;
    manager.connect(&crawl_index()).await.unwrap();

    assert!(manager.exec("SELEC nonsense", &[]).await.is_err());
    assert!(manager
        .exec("SELECT * FROM missing WHERE id = ?", &[Value::Int(1)])
        .await
        .is_err());

    // The session survives statement errors.
    assert!(manager.exec("SELECT 1", &[]).await.is_ok());
}

#[tokio::test]
async fn test_reconnects_after_handle_is_dropped() {
    let dir = tempdir().unwrap();
    let registry = ConnectionRegistry::shared();
    let now = Arc::new(AtomicU64::new(100));
    let clock = now.clone();

    let mut manager = EmbeddedFileManager::new(dir.path(), registry.clone())
        .await
        .with_clock(Arc::new(move || clock.load(Ordering::SeqCst)));
    manager.connect(&crawl_index()).await.unwrap();
    manager
        .exec("CREATE TABLE pages (id INTEGER PRIMARY KEY, url TEXT)", &[])
        .await
        .unwrap();

    registry.clear().await;
    assert!(!manager.is_connected());

    now.store(101, Ordering::SeqCst);
    let outcome = manager.exec("SELECT COUNT(*) AS n FROM pages", &[]).await;

    assert!(outcome.is_ok());
    assert!(manager.is_connected());
    assert_eq!(manager.connect_time(), 101);
}
