//! Engine run control
//!
//! Both engines (discovery and ingestion) expose the same contract to an
//! external process-control surface: `start` launches a run and returns a
//! job id, `stop` cancels it, `status` reports the current run. A controller
//! owns at most one run at a time; starting while a run is live is rejected.
//! Mutual exclusion *between* the two engines on a shared manifest is the
//! caller's responsibility.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{CommonError, Result};

/// Snapshot of an engine's run state
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub job_id: Option<Uuid>,
    pub process_id: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub config: Option<serde_json::Value>,
}

struct RunningJob {
    job_id: Uuid,
    start_time: DateTime<Utc>,
    config: serde_json::Value,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Single-run controller for one engine
pub struct EngineController {
    name: &'static str,
    job: Mutex<Option<RunningJob>>,
}

impl EngineController {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            job: Mutex::new(None),
        }
    }

    /// Launch a run. `run` receives a cancellation token that `stop` trips.
    ///
    /// Returns the new job id, or [`CommonError::EngineRunning`] when a
    /// previous run has not finished.
    pub async fn start<F, Fut>(&self, config: serde_json::Value, run: F) -> Result<Uuid>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut guard = self.job.lock().await;

        if let Some(job) = guard.as_ref() {
            if !job.handle.is_finished() {
                return Err(CommonError::EngineRunning(self.name.to_string()));
            }
        }

        let cancel = CancellationToken::new();
        let job_id = Uuid::new_v4();
        let name = self.name;
        let fut = run(cancel.clone());

        let handle = tokio::spawn(async move {
            match fut.await {
                Ok(()) => info!(engine = name, %job_id, "engine_run_finished"),
                Err(e) => error!(engine = name, %job_id, error = %e, "engine_run_failed"),
            }
        });

        *guard = Some(RunningJob {
            job_id,
            start_time: Utc::now(),
            config,
            cancel,
            handle,
        });

        info!(engine = name, %job_id, "engine_run_started");
        Ok(job_id)
    }

    /// Cancel the current run and wait for it to drain. Idempotent; returns
    /// whether a live run was actually stopped.
    pub async fn stop(&self) -> bool {
        let job = { self.job.lock().await.take() };
        match job {
            Some(job) => {
                let was_running = !job.handle.is_finished();
                job.cancel.cancel();
                let _ = job.handle.await;
                info!(engine = self.name, job_id = %job.job_id, "engine_run_stopped");
                was_running
            }
            None => false,
        }
    }

    pub async fn status(&self) -> EngineStatus {
        let guard = self.job.lock().await;
        match guard.as_ref() {
            Some(job) => EngineStatus {
                running: !job.handle.is_finished(),
                job_id: Some(job.job_id),
                process_id: std::process::id(),
                start_time: Some(job.start_time),
                config: Some(job.config.clone()),
            },
            None => EngineStatus {
                running: false,
                job_id: None,
                process_id: std::process::id(),
                start_time: None,
                config: None,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn idle_run(cancel: CancellationToken) -> impl Future<Output = anyhow::Result<()>> {
        async move {
            cancel.cancelled().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_rejects_concurrent_run() {
        let controller = EngineController::new("test");
        controller
            .start(serde_json::json!({}), idle_run)
            .await
            .unwrap();

        let err = controller
            .start(serde_json::json!({}), idle_run)
            .await
            .unwrap_err();
        assert!(matches!(err, CommonError::EngineRunning(_)));

        assert!(controller.stop().await);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let controller = EngineController::new("test");
        assert!(!controller.stop().await);

        controller
            .start(serde_json::json!({"k": 1}), idle_run)
            .await
            .unwrap();
        assert!(controller.stop().await);
        assert!(!controller.stop().await);
    }

    #[tokio::test]
    async fn status_reflects_lifecycle() {
        let controller = EngineController::new("test");
        let status = controller.status().await;
        assert!(!status.running);
        assert!(status.job_id.is_none());

        let job_id = controller
            .start(serde_json::json!({"root": "/tmp"}), idle_run)
            .await
            .unwrap();
        let status = controller.status().await;
        assert!(status.running);
        assert_eq!(status.job_id, Some(job_id));
        assert!(status.start_time.is_some());

        controller.stop().await;
        let status = controller.status().await;
        assert!(!status.running);
    }

    #[tokio::test]
    async fn finished_run_allows_restart() {
        let controller = EngineController::new("test");
        controller
            .start(serde_json::json!({}), |_cancel| async { Ok(()) })
            .await
            .unwrap();

        // Wait for the spawned task to settle before restarting.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        controller
            .start(serde_json::json!({}), idle_run)
            .await
            .unwrap();
        controller.stop().await;
    }
}
