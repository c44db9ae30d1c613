//! Concurrent directory walker
//!
//! Depth-first, single-threaded traversal; per-file stat and ACL capture
//! run on a bounded worker budget so an I/O hang on one file never stalls
//! the tree. Records flow through a bounded channel, which gives the batch
//! processor natural backpressure over the walk.
//!
//! Failure policy: no single entry aborts the walk. Directory reads are
//! retried with exponential backoff and then skipped; files degrade to
//! `permission_denied`/`error` records. Symlinks are never followed, even
//! to non-cyclic targets — the graph structure of a networked share is
//! untrusted. Directories themselves are not persisted as rows.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use dfr_manifest::record::{DiscoveryStatus, FileRecord};

use crate::acl::AclExtractor;
use crate::error::{BootstrapError, Result};

/// Capacity of the record channel between walker and batch processor
const CHANNEL_CAPACITY: usize = 1024;

pub struct DirectoryWalker {
    file_timeout: Duration,
    max_retries: u32,
    workers: usize,
    extractor: AclExtractor,
    cancel: CancellationToken,
}

impl DirectoryWalker {
    pub fn new(
        file_timeout: Duration,
        max_retries: u32,
        workers: usize,
        extractor: AclExtractor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            file_timeout,
            max_retries,
            workers: workers.max(1),
            extractor,
            cancel,
        }
    }

    /// Resolve `root` and return a lazy stream of file records.
    ///
    /// A missing root or a root we cannot enumerate yields a typed error
    /// (and therefore zero records); everything below the root degrades to
    /// per-entry records instead.
    pub async fn walk(self, root: &Path) -> Result<ReceiverStream<FileRecord>> {
        let root = match tokio::fs::canonicalize(root).await {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(path = %root.display(), "root_path_not_found");
                return Err(BootstrapError::RootNotFound(root.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = tokio::fs::read_dir(&root).await {
            error!(
                path = %root.display(),
                error = %e,
                likely_cause = "Service account lacks read permissions on root",
                developer_action = "Check share ACLs and mount options for the service account",
                "root_permission_denied"
            );
            return Err(BootstrapError::RootUnreadable(root));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let walker = Arc::new(self);
        tokio::spawn(walker.walk_dir(root, tx));
        Ok(ReceiverStream::new(rx))
    }

    fn walk_dir(
        self: Arc<Self>,
        dir: PathBuf,
        tx: mpsc::Sender<FileRecord>,
    ) -> BoxFuture<'static, ()> {
        async move {
            if self.cancel.is_cancelled() {
                return;
            }

            let Some(entries) = self.scan_with_retries(&dir).await else {
                return;
            };

            let mut files = Vec::new();
            let mut subdirs = Vec::new();

            for entry in entries {
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            likely_cause = "File locked or ACL prevents read",
                            developer_action = "Check file permissions and ensure the file is not locked",
                            "entry_access_error"
                        );
                        let record =
                            FileRecord::permission_denied(&path, false, format!("OS error: {}", e));
                        if tx.send(record).await.is_err() {
                            return;
                        }
                        continue;
                    }
                };

                if file_type.is_symlink() {
                    debug!(path = %path.display(), "symlink_skipped");
                    let record = FileRecord::skipped(&path, "Symlink skipped to prevent cycles");
                    if tx.send(record).await.is_err() {
                        return;
                    }
                } else if file_type.is_dir() {
                    subdirs.push(path);
                } else if file_type.is_file() {
                    files.push(path);
                } else {
                    debug!(path = %path.display(), "unknown_entry_type");
                    let record = FileRecord::skipped(&path, "Unknown entry type");
                    if tx.send(record).await.is_err() {
                        return;
                    }
                }
            }

            // Stat/ACL work for this directory's files runs concurrently,
            // bounded by the worker budget. Emission order across children
            // is not guaranteed.
            let mut records = futures::stream::iter(
                files.into_iter().map(|path| self.process_file(path)),
            )
            .buffer_unordered(self.workers);

            while let Some(record) = records.next().await {
                if self.cancel.is_cancelled() {
                    return;
                }
                if tx.send(record).await.is_err() {
                    return;
                }
            }
            drop(records);

            // Depth-first: parents are emitted before their children.
            for subdir in subdirs {
                if self.cancel.is_cancelled() {
                    return;
                }
                self.clone().walk_dir(subdir, tx.clone()).await;
            }
        }
        .boxed()
    }

    /// Enumerate a directory, retrying transient failures with 2^attempt
    /// backoff. Exhaustion skips the directory: no row is emitted.
    async fn scan_with_retries(&self, dir: &Path) -> Option<Vec<tokio::fs::DirEntry>> {
        for attempt in 0..self.max_retries {
            match scan_dir(dir).await {
                Ok(entries) => return Some(entries),
                Err(e) => {
                    let denied = e.kind() == ErrorKind::PermissionDenied;
                    warn!(
                        path = %dir.display(),
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        likely_cause = if denied {
                            "Service account lacks read permissions"
                        } else {
                            "Share mount may be unstable"
                        },
                        developer_action = if denied {
                            "Check share ACLs and mount options for the service account"
                        } else {
                            "Check network connectivity and mount status"
                        },
                        "directory_access_error"
                    );

                    if attempt + 1 == self.max_retries {
                        error!(
                            path = %dir.display(),
                            retries = self.max_retries,
                            error = %e,
                            "directory_scan_failed"
                        );
                        return None;
                    }

                    let backoff = Duration::from_secs(1u64 << attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => return None,
                    }
                }
            }
        }
        None
    }

    /// Stat one regular file under the per-file timeout, then capture its
    /// ACL blob. Always yields a record.
    async fn process_file(&self, path: PathBuf) -> FileRecord {
        let stat_path = path.clone();
        let stat = tokio::time::timeout(
            self.file_timeout,
            tokio::task::spawn_blocking(move || std::fs::symlink_metadata(&stat_path)),
        )
        .await;

        let metadata = match stat {
            Err(_) => {
                warn!(
                    path = %path.display(),
                    timeout_seconds = self.file_timeout.as_secs(),
                    likely_cause = "File operation hung",
                    developer_action = "Check share health and network stability",
                    "stat_timeout"
                );
                return FileRecord::errored(
                    &path,
                    format!("Stat timeout after {}s", self.file_timeout.as_secs()),
                );
            }
            Ok(Err(e)) => {
                return FileRecord::errored(&path, format!("Processing error: {}", e));
            }
            Ok(Ok(Err(e))) if e.kind() == ErrorKind::PermissionDenied => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    likely_cause = "File locked or ACL prevents read",
                    developer_action = "Check file permissions and ensure the file is not locked",
                    "entry_permission_denied"
                );
                return FileRecord::permission_denied(
                    &path,
                    false,
                    format!("Permission denied: {}", e),
                );
            }
            Ok(Ok(Err(e))) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    likely_cause = "Transient share error or corrupted file",
                    developer_action = "Check share health and file integrity",
                    "entry_access_error"
                );
                return FileRecord::permission_denied(&path, false, format!("OS error: {}", e));
            }
            Ok(Ok(Ok(metadata))) => metadata,
        };

        let acl = self.extractor.extract(&path, self.file_timeout).await;
        let status = if acl.captured {
            DiscoveryStatus::Discovered
        } else {
            DiscoveryStatus::AclFailed
        };

        FileRecord {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            parent_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            size: Some(metadata.len() as i64),
            mtime: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            raw_acl: acl.raw,
            acl_captured: acl.captured,
            error: if acl.captured { None } else { acl.error },
            status,
            is_directory: false,
            file_path: path,
        }
    }
}

async fn scan_dir(dir: &Path) -> std::io::Result<Vec<tokio::fs::DirEntry>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry);
    }
    Ok(entries)
}
