//! Manifest store behavior tests
//!
//! Covers the upsert insert/skip contract, the last_seen refresh on
//! re-observation, the ingestion status machine, and the pending cursor.

use std::path::Path;

use sqlx::Row;
use tempfile::TempDir;

use dfr_manifest::connection::connect;
use dfr_manifest::record::{DiscoveryStatus, FileRecord, IngestionStatus};
use dfr_manifest::ManifestStore;

fn discovered(path: &str, size: i64, acl: &str) -> FileRecord {
    let path = Path::new(path);
    FileRecord {
        file_path: path.to_path_buf(),
        file_name: path.file_name().unwrap().to_string_lossy().into_owned(),
        parent_dir: path.parent().unwrap().to_path_buf(),
        size: Some(size),
        mtime: Some(1_700_000_000),
        raw_acl: Some(acl.to_string()),
        acl_captured: true,
        status: DiscoveryStatus::Discovered,
        error: None,
        is_directory: false,
    }
}

async fn setup_store(dir: &TempDir) -> ManifestStore {
    let pool = connect(&dir.path().join("manifest.db"), 16)
        .await
        .expect("manifest db should open");
    let store = ManifestStore::new(pool);
    store.init_schema().await.expect("schema should apply");
    store
}

#[tokio::test]
async fn init_schema_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;
    store.init_schema().await.expect("second init should be a no-op");
}

#[tokio::test]
async fn bulk_upsert_counts_inserted_and_skipped() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;

    let records = vec![
        discovered("/share/a.txt", 1024, "user::rw-"),
        discovered("/share/b.txt", 2048, "user::rw-"),
    ];
    let (inserted, skipped) = store.bulk_upsert(&records).await.unwrap();
    assert_eq!((inserted, skipped), (2, 0));

    // Re-scan: same paths plus one new file
    let mut rescan = records.clone();
    rescan.push(discovered("/share/c.txt", 512, "user::r--"));
    let (inserted, skipped) = store.bulk_upsert(&rescan).await.unwrap();
    assert_eq!((inserted, skipped), (1, 2));

    let stats = store.discovery_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.discovered, 3);
    assert_eq!(stats.acl_captured, 3);
}

#[tokio::test]
async fn upsert_refreshes_last_seen_without_touching_discovery_fields() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;

    let original = discovered("/share/a.txt", 1024, "user::rw-");
    store.bulk_upsert(&[original.clone()]).await.unwrap();

    // Age the row so the refresh is observable, then present the path again
    // with different discovery fields.
    sqlx::query("UPDATE manifest SET last_seen = '2000-01-01 00:00:00' WHERE file_path = ?")
        .bind("/share/a.txt")
        .execute(store.pool())
        .await
        .unwrap();

    let mut changed = original;
    changed.size = Some(9999);
    changed.raw_acl = Some("user::---".to_string());
    store.bulk_upsert(&[changed]).await.unwrap();

    let row = sqlx::query("SELECT size, raw_acl, last_seen FROM manifest WHERE file_path = ?")
        .bind("/share/a.txt")
        .fetch_one(store.pool())
        .await
        .unwrap();

    let size: i64 = row.try_get("size").unwrap();
    let raw_acl: String = row.try_get("raw_acl").unwrap();
    let last_seen: String = row.try_get("last_seen").unwrap();
    assert_eq!(size, 1024, "conflict must not overwrite discovery fields");
    assert_eq!(raw_acl, "user::rw-");
    assert_ne!(last_seen, "2000-01-01 00:00:00", "last_seen must refresh");
}

#[tokio::test]
async fn update_ingestion_tracks_attempts_and_completion() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;
    store
        .bulk_upsert(&[discovered("/share/a.txt", 1, "x")])
        .await
        .unwrap();

    store
        .update_ingestion("/share/a.txt", IngestionStatus::Ingesting, None)
        .await
        .unwrap();
    store
        .update_ingestion("/share/a.txt", IngestionStatus::Failed, Some("boom"))
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT ingestion_status, ingestion_attempts, ingestion_error, ingested_at FROM manifest WHERE file_path = ?",
    )
    .bind("/share/a.txt")
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(row.try_get::<String, _>("ingestion_status").unwrap(), "failed");
    assert_eq!(row.try_get::<i64, _>("ingestion_attempts").unwrap(), 2);
    assert_eq!(row.try_get::<String, _>("ingestion_error").unwrap(), "boom");
    assert!(row
        .try_get::<Option<String>, _>("ingested_at")
        .unwrap()
        .is_none());

    // Retry to completion: error clears, ingested_at is stamped.
    store
        .update_ingestion("/share/a.txt", IngestionStatus::Ingesting, None)
        .await
        .unwrap();
    store
        .update_ingestion("/share/a.txt", IngestionStatus::Completed, None)
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT ingestion_status, ingestion_attempts, ingestion_error, ingested_at FROM manifest WHERE file_path = ?",
    )
    .bind("/share/a.txt")
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(
        row.try_get::<String, _>("ingestion_status").unwrap(),
        "completed"
    );
    assert_eq!(row.try_get::<i64, _>("ingestion_attempts").unwrap(), 4);
    assert!(row
        .try_get::<Option<String>, _>("ingestion_error")
        .unwrap()
        .is_none());
    assert!(row
        .try_get::<Option<String>, _>("ingested_at")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn fetch_pending_filters_and_orders() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;

    // Eligible: discovered files. Ineligible: acl_failed, skipped.
    let mut acl_failed = discovered("/share/bad.txt", 1, "x");
    acl_failed.status = DiscoveryStatus::AclFailed;
    acl_failed.raw_acl = None;
    acl_failed.acl_captured = false;
    store
        .bulk_upsert(&[
            discovered("/share/c.txt", 1, "x"),
            discovered("/share/a.txt", 1, "x"),
            discovered("/share/b.txt", 1, "x"),
            acl_failed,
            FileRecord::skipped(Path::new("/share/link"), "Symlink skipped"),
        ])
        .await
        .unwrap();

    let page = store.fetch_pending(2, 0).await.unwrap();
    assert_eq!(
        page.iter().map(|r| r.file_path.as_str()).collect::<Vec<_>>(),
        vec!["/share/a.txt", "/share/b.txt"]
    );

    let page = store.fetch_pending(2, 2).await.unwrap();
    assert_eq!(
        page.iter().map(|r| r.file_path.as_str()).collect::<Vec<_>>(),
        vec!["/share/c.txt"]
    );

    // Completed rows drop out; failed rows stay eligible for retry.
    store
        .update_ingestion("/share/a.txt", IngestionStatus::Completed, None)
        .await
        .unwrap();
    store
        .update_ingestion("/share/b.txt", IngestionStatus::Failed, Some("err"))
        .await
        .unwrap();

    let page = store.fetch_pending(10, 0).await.unwrap();
    let paths: Vec<_> = page.iter().map(|r| r.file_path.as_str()).collect();
    assert_eq!(paths, vec!["/share/b.txt", "/share/c.txt"]);
}

#[tokio::test]
async fn fetch_pending_excludes_ingesting_until_reset() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;
    store
        .bulk_upsert(&[discovered("/share/a.txt", 1, "x")])
        .await
        .unwrap();

    store
        .update_ingestion("/share/a.txt", IngestionStatus::Ingesting, None)
        .await
        .unwrap();
    assert!(store.fetch_pending(10, 0).await.unwrap().is_empty());

    // A forcibly-killed run leaves ingesting rows behind; reset reclaims them.
    let reclaimed = store.reset_stale_ingesting().await.unwrap();
    assert_eq!(reclaimed, 1);
    assert_eq!(store.fetch_pending(10, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn permission_error_bumps_retry_count_on_reobservation() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;

    let record =
        FileRecord::permission_denied(Path::new("/share/locked.txt"), false, "Permission denied");
    store.record_permission_error(&record).await.unwrap();
    store.record_permission_error(&record).await.unwrap();

    let row = sqlx::query("SELECT status, retry_count FROM manifest WHERE file_path = ?")
        .bind("/share/locked.txt")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(
        row.try_get::<String, _>("status").unwrap(),
        "permission_denied"
    );
    assert_eq!(row.try_get::<i64, _>("retry_count").unwrap(), 1);
}

#[tokio::test]
async fn status_counters_sum_to_total() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(&dir).await;

    let mut errored = discovered("/share/hung.txt", 1, "x");
    errored.status = DiscoveryStatus::Error;
    errored.raw_acl = None;
    errored.acl_captured = false;
    store
        .bulk_upsert(&[
            discovered("/share/a.txt", 1, "x"),
            errored,
            FileRecord::skipped(Path::new("/share/link"), "Symlink skipped"),
            FileRecord::permission_denied(Path::new("/share/locked"), false, "denied"),
        ])
        .await
        .unwrap();

    let stats = store.discovery_stats().await.unwrap();
    assert_eq!(
        stats.total,
        stats.discovered + stats.permission_denied + stats.acl_failed + stats.errors + stats.skipped
    );
    assert_eq!(stats.total, 4);

    let ingestion = store.ingestion_stats().await.unwrap();
    assert_eq!(ingestion.total, 1);
    assert_eq!(ingestion.pending, 1);
}
