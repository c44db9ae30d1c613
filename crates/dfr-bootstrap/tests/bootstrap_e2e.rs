//! End-to-end discovery runs against a real tree and manifest database

use std::os::unix::fs::symlink;
use std::path::Path;

use sqlx::Row;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use dfr_bootstrap::acl::AclExtractorKind;
use dfr_bootstrap::runner::run_bootstrap;
use dfr_bootstrap::BootstrapConfig;
use dfr_manifest::connection::connect;
use dfr_manifest::ManifestStore;

fn seed_tree(root: &Path) {
    std::fs::write(root.join("a.txt"), vec![0u8; 1024]).unwrap();
    std::fs::create_dir(root.join("b")).unwrap();
    std::fs::write(root.join("b/c.pdf"), vec![0u8; 2048]).unwrap();
    symlink(root.join("a.txt"), root.join("b/d")).unwrap();
}

fn config(root: &Path, db_path: &Path, extractor: AclExtractorKind) -> BootstrapConfig {
    let mut config = BootstrapConfig::new(root);
    config.db_path = db_path.to_path_buf();
    config.acl_extractor = extractor;
    config
}

async fn open_store(db_path: &Path) -> ManifestStore {
    ManifestStore::new(connect(db_path, 16).await.unwrap())
}

#[tokio::test]
async fn bootstrap_populates_manifest() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("share");
    std::fs::create_dir(&root).unwrap();
    seed_tree(&root);
    let db_path = dir.path().join("manifest.db");

    let stats = run_bootstrap(
        &config(&root, &db_path, AclExtractorKind::Stat),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.total_discovered, 3);
    assert_eq!(stats.acl_captured, 2);
    assert_eq!(stats.other_errors, 1);
    assert_eq!(stats.total_added, 3);
    assert_eq!(stats.total_skipped, 0);

    let store = open_store(&db_path).await;
    let counts = store.discovery_stats().await.unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.discovered, 2);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.acl_captured, 2);

    let row = sqlx::query("SELECT size, acl_captured, raw_acl FROM manifest WHERE file_name = ?")
        .bind("a.txt")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(row.try_get::<i64, _>("size").unwrap(), 1024);
    assert!(row.try_get::<bool, _>("acl_captured").unwrap());
    assert!(row.try_get::<Option<String>, _>("raw_acl").unwrap().is_some());
}

#[tokio::test]
async fn rescan_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("share");
    std::fs::create_dir(&root).unwrap();
    seed_tree(&root);
    let db_path = dir.path().join("manifest.db");
    let config = config(&root, &db_path, AclExtractorKind::Stat);

    let first = run_bootstrap(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(first.total_added, 3);

    let store = open_store(&db_path).await;
    let acl_before: Vec<(String, Option<String>)> =
        sqlx::query("SELECT file_path, raw_acl FROM manifest ORDER BY file_path")
            .fetch_all(store.pool())
            .await
            .unwrap()
            .into_iter()
            .map(|row| {
                (
                    row.try_get("file_path").unwrap(),
                    row.try_get("raw_acl").unwrap(),
                )
            })
            .collect();

    let second = run_bootstrap(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(second.total_added, 0);
    assert_eq!(second.total_skipped, 3);

    let counts = store.discovery_stats().await.unwrap();
    assert_eq!(counts.total, 3, "re-scan must not duplicate rows");

    let acl_after: Vec<(String, Option<String>)> =
        sqlx::query("SELECT file_path, raw_acl FROM manifest ORDER BY file_path")
            .fetch_all(store.pool())
            .await
            .unwrap()
            .into_iter()
            .map(|row| {
                (
                    row.try_get("file_path").unwrap(),
                    row.try_get("raw_acl").unwrap(),
                )
            })
            .collect();
    assert_eq!(acl_before, acl_after, "raw_acl must survive a re-scan");
}

#[tokio::test]
async fn noop_extractor_rows_are_not_ingestion_eligible() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("share");
    std::fs::create_dir(&root).unwrap();
    seed_tree(&root);
    let db_path = dir.path().join("manifest.db");

    let stats = run_bootstrap(
        &config(&root, &db_path, AclExtractorKind::Noop),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.acl_captured, 0);
    assert_eq!(stats.acl_failed, 2);

    let store = open_store(&db_path).await;
    let counts = store.discovery_stats().await.unwrap();
    assert_eq!(counts.acl_failed, 2);
    assert_eq!(counts.discovered, 0);
    assert_eq!(counts.acl_captured, 0);

    // Policy consequence: acl_failed rows never reach ingestion.
    assert!(store.fetch_pending(10, 0).await.unwrap().is_empty());

    let row = sqlx::query("SELECT raw_acl FROM manifest WHERE file_name = ?")
        .bind("a.txt")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert!(row.try_get::<Option<String>, _>("raw_acl").unwrap().is_none());
}

#[tokio::test]
async fn invalid_config_fails_before_any_work() {
    let dir = TempDir::new().unwrap();
    let mut config = BootstrapConfig::new(dir.path());
    config.db_path = dir.path().join("manifest.db");
    config.workers = 0;

    let result = run_bootstrap(&config, CancellationToken::new()).await;
    assert!(result.is_err());
    assert!(!config.db_path.exists(), "no database before validation");
}
