//! Manifest domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Discovery outcome for a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    /// Reserved initial state; rows are normally created past this
    Pending,
    /// Stat succeeded and the ACL policy was satisfied
    Discovered,
    /// Stat succeeded but the ACL blob could not be captured
    AclFailed,
    PermissionDenied,
    /// Stat timed out or failed unexpectedly
    Error,
    /// Symlink or unknown entry type; never traversed
    Skipped,
}

impl DiscoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStatus::Pending => "pending",
            DiscoveryStatus::Discovered => "discovered",
            DiscoveryStatus::AclFailed => "acl_failed",
            DiscoveryStatus::PermissionDenied => "permission_denied",
            DiscoveryStatus::Error => "error",
            DiscoveryStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ingestion state machine: pending -> ingesting -> {completed, failed},
/// with failed -> ingesting permitted on retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    Ingesting,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Pending => "pending",
            IngestionStatus::Ingesting => "ingesting",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One observed filesystem entry, as produced by the walker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path
    pub file_path: PathBuf,
    /// Base name
    pub file_name: String,
    pub parent_dir: PathBuf,
    /// Size in bytes; None when stat failed
    pub size: Option<i64>,
    /// Modification time as epoch seconds
    pub mtime: Option<i64>,
    /// Opaque permission blob (getfacl text or a stat JSON object)
    pub raw_acl: Option<String>,
    pub acl_captured: bool,
    pub status: DiscoveryStatus,
    pub error: Option<String>,
    pub is_directory: bool,
}

impl FileRecord {
    /// Record for a skipped entry (symlink, unknown type)
    pub fn skipped(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            file_path: path.to_path_buf(),
            file_name: base_name(path),
            parent_dir: parent_of(path),
            size: None,
            mtime: None,
            raw_acl: None,
            acl_captured: false,
            status: DiscoveryStatus::Skipped,
            error: Some(reason.into()),
            is_directory: false,
        }
    }

    /// Record for an entry that could not be read
    pub fn permission_denied(path: &Path, is_directory: bool, message: impl Into<String>) -> Self {
        Self {
            file_path: path.to_path_buf(),
            file_name: base_name(path),
            parent_dir: parent_of(path),
            size: None,
            mtime: None,
            raw_acl: None,
            acl_captured: false,
            status: DiscoveryStatus::PermissionDenied,
            error: Some(message.into()),
            is_directory,
        }
    }

    /// Record for a stat timeout or unexpected processing failure
    pub fn errored(path: &Path, message: impl Into<String>) -> Self {
        Self {
            file_path: path.to_path_buf(),
            file_name: base_name(path),
            parent_dir: parent_of(path),
            size: None,
            mtime: None,
            raw_acl: None,
            acl_captured: false,
            status: DiscoveryStatus::Error,
            error: Some(message.into()),
            is_directory: false,
        }
    }

    pub fn path_str(&self) -> String {
        self.file_path.to_string_lossy().into_owned()
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Manifest row as seen by the ingestion engine
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub file_path: String,
    pub file_name: String,
    pub parent_dir: String,
    pub size: Option<i64>,
    pub mtime: Option<i64>,
    pub raw_acl: Option<String>,
    pub acl_captured: bool,
    pub status: String,
}

/// Per-status row counts over the whole manifest
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestCounts {
    pub total: i64,
    pub discovered: i64,
    pub permission_denied: i64,
    pub acl_failed: i64,
    pub errors: i64,
    pub skipped: i64,
    pub acl_captured: i64,
}

/// Ingestion progress counters over discovered file rows
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionCounts {
    pub total: i64,
    pub pending: i64,
    pub ingesting: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Aggregate result of one bootstrap run
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapStats {
    pub total_discovered: u64,
    pub total_added: u64,
    pub total_skipped: u64,
    pub acl_captured: u64,
    pub acl_failed: u64,
    pub permission_errors: u64,
    pub other_errors: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BootstrapStats {
    pub fn new() -> Self {
        Self {
            total_discovered: 0,
            total_added: 0,
            total_skipped: 0,
            acl_captured: 0,
            acl_failed: 0,
            permission_errors: 0,
            other_errors: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn records_per_second(&self) -> f64 {
        let duration = self.duration_seconds();
        if duration <= 0.0 {
            return 0.0;
        }
        self.total_discovered as f64 / duration
    }

    pub fn acl_capture_rate(&self) -> f64 {
        let total = self.acl_captured + self.acl_failed;
        if total == 0 {
            return 0.0;
        }
        (self.acl_captured as f64 / total as f64) * 100.0
    }

    /// Human-readable end-of-run block
    pub fn summary(&self) -> String {
        let lines = [
            "Bootstrap complete".to_string(),
            format!("  Total entries observed: {}", self.total_discovered),
            format!("  Records added: {}", self.total_added),
            format!("  Records skipped (already existed): {}", self.total_skipped),
            format!(
                "  ACL captured: {} ({:.1}%)",
                self.acl_captured,
                self.acl_capture_rate()
            ),
            format!("  ACL failed: {}", self.acl_failed),
            format!("  Permission errors: {}", self.permission_errors),
            format!("  Other errors: {}", self.other_errors),
            format!("  Time elapsed: {:.1}s", self.duration_seconds()),
            format!("  Records/second: {:.1}", self.records_per_second()),
        ];
        lines.join("\n")
    }
}

impl Default for BootstrapStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_record_carries_reason() {
        let record = FileRecord::skipped(Path::new("/share/link"), "Symlink skipped");
        assert_eq!(record.status, DiscoveryStatus::Skipped);
        assert_eq!(record.file_name, "link");
        assert_eq!(record.parent_dir, PathBuf::from("/share"));
        assert_eq!(record.error.as_deref(), Some("Symlink skipped"));
        assert!(!record.acl_captured);
    }

    #[test]
    fn capture_rate_handles_empty_run() {
        let stats = BootstrapStats::new();
        assert_eq!(stats.acl_capture_rate(), 0.0);
        assert_eq!(stats.records_per_second(), 0.0);
    }

    #[test]
    fn status_round_trips_as_str() {
        assert_eq!(DiscoveryStatus::AclFailed.as_str(), "acl_failed");
        assert_eq!(IngestionStatus::Completed.as_str(), "completed");
    }
}
