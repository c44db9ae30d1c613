//! Permission capture strategies
//!
//! Three strategies, selected at startup:
//!
//! - `getfacl`: spawn `getfacl -c` under the per-file timeout, falling back
//!   to stat when the tool is missing or fails. Best for CIFS/NTFS mounts
//!   on Linux.
//! - `stat`: file metadata only, serialized as a small JSON object.
//! - `noop`: no capture at all; every file ends `acl_failed`.
//!
//! Extraction never fails the walk: every outcome is an [`AclResult`].

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

/// Strategy tag, selectable on the CLI
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AclExtractorKind {
    /// getfacl with stat fallback
    #[default]
    Getfacl,
    /// stat metadata only
    Stat,
    /// capture disabled
    Noop,
}

impl std::fmt::Display for AclExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AclExtractorKind::Getfacl => "getfacl",
            AclExtractorKind::Stat => "stat",
            AclExtractorKind::Noop => "noop",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one extraction attempt
#[derive(Debug, Clone)]
pub struct AclResult {
    pub raw: Option<String>,
    pub captured: bool,
    pub method: &'static str,
    pub error: Option<String>,
}

impl AclResult {
    fn captured(method: &'static str, raw: String) -> Self {
        Self {
            raw: Some(raw),
            captured: true,
            method,
            error: None,
        }
    }

    fn failed(method: &'static str, error: impl Into<String>) -> Self {
        Self {
            raw: None,
            captured: false,
            method,
            error: Some(error.into()),
        }
    }
}

/// Configured extractor; cheap to copy around the walker's worker tasks.
#[derive(Debug, Clone, Copy)]
pub struct AclExtractor {
    kind: AclExtractorKind,
}

impl AclExtractor {
    pub fn new(kind: AclExtractorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> AclExtractorKind {
        self.kind
    }

    /// Extract the permission blob for `path`, bounded by `timeout`.
    pub async fn extract(&self, path: &Path, timeout: Duration) -> AclResult {
        match self.kind {
            AclExtractorKind::Noop => AclResult::failed("noop", "ACL extraction disabled"),
            AclExtractorKind::Stat => stat_acl(path, timeout).await,
            AclExtractorKind::Getfacl => {
                let result = try_getfacl(path, timeout).await;
                if result.captured {
                    result
                } else {
                    // A missing or failing tool silently downgrades to stat.
                    stat_acl(path, timeout).await
                }
            }
        }
    }
}

/// Run `getfacl -c` with piped output. On timeout the child is killed and
/// reaped before returning; it is never left to the garbage collector.
async fn try_getfacl(path: &Path, timeout: Duration) -> AclResult {
    let mut child = match Command::new("getfacl")
        .arg("-c")
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return AclResult::failed("getfacl", "getfacl command not found");
        }
        Err(e) => return AclResult::failed("getfacl", e.to_string()),
    };

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let run = async {
        let mut out = Vec::new();
        let mut err = Vec::new();
        if let Some(pipe) = stdout.as_mut() {
            let _ = pipe.read_to_end(&mut out).await;
        }
        if let Some(pipe) = stderr.as_mut() {
            let _ = pipe.read_to_end(&mut err).await;
        }
        let status = child.wait().await;
        (out, err, status)
    };

    match tokio::time::timeout(timeout, run).await {
        Ok((out, _, Ok(status))) if status.success() => {
            let text = String::from_utf8_lossy(&out).trim().to_string();
            AclResult::captured("getfacl", text)
        }
        Ok((_, err, Ok(status))) => {
            let text = String::from_utf8_lossy(&err).trim().to_string();
            let message = if text.is_empty() {
                format!("Exit code {}", status.code().unwrap_or(-1))
            } else {
                text
            };
            AclResult::failed("getfacl", message)
        }
        Ok((_, _, Err(e))) => AclResult::failed("getfacl", e.to_string()),
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            warn!(
                path = %path.display(),
                timeout_seconds = timeout.as_secs(),
                method = "getfacl",
                "acl_extraction_timeout"
            );
            AclResult::failed("getfacl", format!("Timeout after {}s", timeout.as_secs()))
        }
    }
}

/// Fallback capture: serialize stat facts as a JSON object.
async fn stat_acl(path: &Path, timeout: Duration) -> AclResult {
    let stat_path = path.to_path_buf();
    let stat = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || std::fs::metadata(&stat_path)),
    )
    .await;

    match stat {
        Err(_) => {
            warn!(
                path = %path.display(),
                timeout_seconds = timeout.as_secs(),
                method = "stat",
                "acl_extraction_timeout"
            );
            AclResult::failed("stat", format!("Stat timeout after {}s", timeout.as_secs()))
        }
        Ok(Err(e)) => AclResult::failed("stat", e.to_string()),
        Ok(Ok(Err(e))) => AclResult::failed("stat", e.to_string()),
        Ok(Ok(Ok(metadata))) => {
            use std::os::unix::fs::MetadataExt;
            let blob = serde_json::json!({
                "mode": format!("0o{:o}", metadata.mode()),
                "uid": metadata.uid(),
                "gid": metadata.gid(),
                "size": metadata.size(),
                "mtime": metadata.mtime(),
                "atime": metadata.atime(),
                "ctime": metadata.ctime(),
            });
            match serde_json::to_string_pretty(&blob) {
                Ok(text) => AclResult::captured("stat", text),
                Err(e) => AclResult::failed("stat", e.to_string()),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn noop_never_captures() {
        let extractor = AclExtractor::new(AclExtractorKind::Noop);
        let result = extractor.extract(Path::new("/definitely/missing"), TIMEOUT).await;
        assert!(!result.captured);
        assert!(result.raw.is_none());
        assert_eq!(result.method, "noop");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn stat_captures_json_blob() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let extractor = AclExtractor::new(AclExtractorKind::Stat);
        let result = extractor.extract(file.path(), TIMEOUT).await;
        assert!(result.captured, "stat on a real file should capture");
        assert_eq!(result.method, "stat");

        let blob: serde_json::Value = serde_json::from_str(result.raw.as_deref().unwrap()).unwrap();
        assert!(blob.get("mode").is_some());
        assert!(blob.get("uid").is_some());
        assert!(blob.get("size").is_some());
    }

    #[tokio::test]
    async fn stat_fails_on_missing_file() {
        let extractor = AclExtractor::new(AclExtractorKind::Stat);
        let result = extractor
            .extract(Path::new("/definitely/missing/file.txt"), TIMEOUT)
            .await;
        assert!(!result.captured);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn getfacl_strategy_always_produces_a_result() {
        // Whether or not getfacl exists on the test host, the composite
        // strategy must degrade to stat and capture for a readable file.
        let file = tempfile::NamedTempFile::new().unwrap();
        let extractor = AclExtractor::new(AclExtractorKind::Getfacl);
        let result = extractor.extract(file.path(), TIMEOUT).await;
        assert!(result.captured);
    }
}
