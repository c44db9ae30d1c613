//! Manifest schema
//!
//! One table keyed by absolute path. Creation is idempotent; every row
//! carries `schema_version` so future migrations can rewrite in place.

/// Current row schema version
pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS manifest (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT UNIQUE NOT NULL,
    file_name TEXT NOT NULL,
    parent_dir TEXT NOT NULL,
    size INTEGER,
    mtime INTEGER,
    raw_acl TEXT,
    acl_captured BOOLEAN DEFAULT FALSE,
    status TEXT DEFAULT 'pending' NOT NULL,
    ingestion_status TEXT DEFAULT 'pending' NOT NULL,
    ingestion_attempts INTEGER DEFAULT 0,
    ingestion_error TEXT,
    ingested_at TIMESTAMP,
    error TEXT,
    retry_count INTEGER DEFAULT 0,
    is_directory BOOLEAN DEFAULT FALSE,
    first_seen TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    last_seen TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    schema_version INTEGER DEFAULT 1
)
"#;

pub const CREATE_INDEXES_SQL: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_manifest_name ON manifest(file_name)",
    "CREATE INDEX IF NOT EXISTS idx_manifest_status ON manifest(status)",
    "CREATE INDEX IF NOT EXISTS idx_manifest_ingestion_status ON manifest(ingestion_status)",
    "CREATE INDEX IF NOT EXISTS idx_manifest_acl ON manifest(acl_captured)",
    "CREATE INDEX IF NOT EXISTS idx_manifest_dir ON manifest(is_directory)",
    "CREATE INDEX IF NOT EXISTS idx_manifest_status_path ON manifest(status, file_path)",
    "CREATE INDEX IF NOT EXISTS idx_manifest_parent_name ON manifest(parent_dir, file_name)",
];
