//! Document service HTTP client
//!
//! Thin client over the service's v1 API: collection management, document
//! listing (for server-side dedup), multipart upload, and task-status
//! polling. Every non-2xx response becomes a typed error carrying the
//! status code and decoded body.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Fixed interval between task-status polls
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Transient polling failures tolerated before surfacing
const MAX_POLL_RETRIES: u32 = 10;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed [{status}]: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Task unknown (server may have restarted): {0}")]
    TaskUnknown(String),

    #[error("Status polling timed out after {0}s")]
    PollTimeout(u64),

    #[error("Status polling retries exceeded: {0}")]
    PollRetriesExceeded(String),

    #[error("Upload failed after {attempts} attempts: {last_error}")]
    UploadRetriesExceeded { attempts: u32, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON `data` part sent alongside the document parts
#[derive(Debug, Clone, Serialize)]
pub struct UploadPayload {
    pub collection_name: String,
    pub blocking: bool,
    pub split_options: SplitOptions,
    /// One metadata object per file, positionally aligned with the parts
    pub custom_metadata: Vec<serde_json::Value>,
    pub generate_summary: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitOptions {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
}

/// Upload acknowledgment; servers answer with `task_id`, `task` or `id`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(alias = "task", alias = "id")]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub state: String,
    pub result: Option<TaskResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub failed_documents: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentsResponse {
    #[serde(default)]
    documents: Vec<DocumentEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentEntry {
    metadata: Option<DocumentMetadata>,
    document_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentMetadata {
    filename: Option<String>,
}

pub struct DocumentClient {
    client: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
}

impl DocumentClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        poll_timeout: Duration,
        proxy_http: Option<&str>,
        proxy_https: Option<&str>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().timeout(request_timeout);
        if let Some(proxy) = proxy_http {
            builder = builder.proxy(reqwest::Proxy::http(proxy)?);
        }
        if let Some(proxy) = proxy_https {
            builder = builder.proxy(reqwest::Proxy::https(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /v1/collection. "Already exists" is the server's concern; the
    /// caller treats a conflict as a warning, not a failure.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        embedding_dimension: u32,
        metadata_schema: Option<Vec<serde_json::Value>>,
    ) -> Result<serde_json::Value, ClientError> {
        let url = format!("{}/v1/collection", self.base_url);
        let payload = serde_json::json!({
            "collection_name": collection_name,
            "embedding_dimension": embedding_dimension,
            "metadata_schema": metadata_schema.unwrap_or_default(),
        });

        debug!(collection = collection_name, "creating_collection");
        let response = self.client.post(&url).json(&payload).send().await?;
        let body = check_status("Create collection", response).await?;
        parse_lenient(&body)
    }

    /// DELETE /v1/collections with a JSON body naming the collections.
    pub async fn delete_collections(
        &self,
        collection_names: &[String],
    ) -> Result<serde_json::Value, ClientError> {
        let url = format!("{}/v1/collections", self.base_url);

        debug!(collections = ?collection_names, "deleting_collections");
        let response = self
            .client
            .delete(&url)
            .json(&collection_names)
            .send()
            .await?;
        let body = check_status("Delete collections", response).await?;
        parse_lenient(&body)
    }

    /// GET /v1/documents: the set of file names the server already holds,
    /// used to skip re-uploads.
    pub async fn list_documents(
        &self,
        collection_name: &str,
    ) -> Result<HashSet<String>, ClientError> {
        let url = format!("{}/v1/documents", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("collection_name", collection_name)])
            .send()
            .await?;
        let body = check_status("List documents", response).await?;

        let parsed: DocumentsResponse = if body.is_empty() {
            DocumentsResponse::default()
        } else {
            serde_json::from_str(&body)?
        };

        let names = parsed
            .documents
            .into_iter()
            .filter_map(|doc| {
                doc.metadata
                    .and_then(|m| m.filename)
                    .or(doc.document_name)
            })
            .collect();
        Ok(names)
    }

    /// POST /v1/documents as multipart: one `documents` part per file plus
    /// a single JSON `data` part. File contents are read up front, so no
    /// handle outlives the call whatever the outcome.
    pub async fn upload_documents(
        &self,
        files: &[PathBuf],
        payload: &UploadPayload,
    ) -> Result<UploadResponse, ClientError> {
        let url = format!("{}/v1/documents", self.base_url);

        let mut form = reqwest::multipart::Form::new();
        for path in files {
            let bytes = tokio::fs::read(path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned());
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(guess_content_type(path))?;
            form = form.part("documents", part);
        }
        let data = reqwest::multipart::Part::text(serde_json::to_string(payload)?)
            .mime_str("application/json")?;
        form = form.part("data", data);

        debug!(files = files.len(), "uploading_documents");
        let response = self.client.post(&url).multipart(form).send().await?;
        let body = check_status("Upload", response).await?;

        if body.is_empty() {
            return Ok(UploadResponse::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Poll GET /v1/status until the task reaches a terminal state.
    ///
    /// `FINISHED` returns the final status (including any
    /// `failed_documents`); `FAILED` and `UNKNOWN` become typed errors.
    /// Transient transport failures are retried a bounded number of times;
    /// the total wait is capped by the configured poll timeout.
    pub async fn poll_task(&self, task_id: &str) -> Result<TaskStatus, ClientError> {
        let url = format!("{}/v1/status", self.base_url);
        let started = Instant::now();
        let mut transient_retries = 0u32;

        info!(task_id, "polling_task_status");

        loop {
            let response = match self
                .client
                .get(&url)
                .query(&[("task_id", task_id)])
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    transient_retries += 1;
                    warn!(task_id, retry = transient_retries, error = %e, "poll_request_failed");
                    if transient_retries > MAX_POLL_RETRIES {
                        return Err(ClientError::PollRetriesExceeded(e.to_string()));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            let body = response.text().await.unwrap_or_default();
            // A body the server cannot explain is indistinguishable from a
            // lost task.
            let status: TaskStatus = serde_json::from_str(&body).unwrap_or(TaskStatus {
                state: "UNKNOWN".to_string(),
                result: None,
            });

            debug!(task_id, state = %status.state, elapsed_seconds = started.elapsed().as_secs(), "task_status");

            match status.state.as_str() {
                "FINISHED" => {
                    if let Some(result) = &status.result {
                        if !result.failed_documents.is_empty() {
                            error!(
                                task_id,
                                failed = result.failed_documents.len(),
                                "task_finished_with_failed_documents"
                            );
                        }
                    }
                    info!(task_id, "task_finished");
                    return Ok(status);
                }
                "FAILED" => {
                    error!(task_id, body = %body, "task_failed");
                    return Err(ClientError::TaskFailed(body));
                }
                "UNKNOWN" => {
                    error!(task_id, body = %body, "task_unknown");
                    return Err(ClientError::TaskUnknown(body));
                }
                _ => {}
            }

            if started.elapsed() > self.poll_timeout {
                error!(task_id, timeout_seconds = self.poll_timeout.as_secs(), "poll_timeout");
                return Err(ClientError::PollTimeout(self.poll_timeout.as_secs()));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<String, ClientError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.as_u16() >= 400 {
        error!(operation, status = status.as_u16(), body = %body, "request_failed");
        return Err(ClientError::Api {
            operation,
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

fn parse_lenient(body: &str) -> Result<serde_json::Value, ClientError> {
    if body.is_empty() {
        return Ok(serde_json::json!({"status": "ok"}));
    }
    Ok(serde_json::from_str(body)?)
}

/// Content type by extension; anything unmapped uploads as a binary blob.
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
