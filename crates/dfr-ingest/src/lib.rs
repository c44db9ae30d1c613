//! DFR Ingest - Ingestion engine
//!
//! Drains the manifest populated by the discovery engine: fetches batches
//! of discovered files, deduplicates against the document service, uploads
//! them as multipart batches, polls the asynchronous processing task, and
//! writes per-row outcomes back into the manifest. Progress is checkpointed
//! to a JSON file so an interrupted run resumes where it left off.
//!
//! Uploads are at-least-once; the server-side document listing and the
//! completed-status skip in the manifest keep re-runs from re-ingesting.

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod processor;
pub mod repository;
pub mod runner;

pub use config::IngestionConfig;
pub use error::{IngestError, Result};
