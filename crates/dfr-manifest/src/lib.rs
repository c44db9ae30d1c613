//! DFR Manifest Store
//!
//! The durable file manifest shared by the discovery and ingestion engines:
//! a single SQLite table keyed by absolute path, holding filesystem facts,
//! the captured permission blob, and both status machines.
//!
//! Discovery writes rows through [`store::ManifestStore::bulk_upsert`];
//! ingestion drains them through `fetch_pending` and writes outcomes back
//! with `update_ingestion`. Directory entries are walked but not persisted
//! as rows; only regular files, skipped symlinks and unreadable entries
//! appear in the manifest.

pub mod connection;
pub mod record;
pub mod schema;
pub mod store;

pub use record::{
    BootstrapStats, DiscoveryStatus, FileRecord, IngestionCounts, IngestionStatus, ManifestCounts,
    PendingFile,
};
pub use store::{ManifestStore, StoreError};
