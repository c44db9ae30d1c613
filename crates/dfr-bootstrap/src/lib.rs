//! DFR Bootstrap - Discovery engine
//!
//! Walks a (possibly networked) filesystem tree and records every reachable
//! regular file into the manifest with size, modification time and a
//! captured permission blob. The walk is fault tolerant: permission
//! denials, hung stat calls and symlink cycles degrade to per-entry records
//! instead of aborting the run.
//!
//! Pipeline: [`walker::DirectoryWalker`] produces a bounded stream of
//! records; [`batch::BatchProcessor`] buffers them and flushes batches to
//! the manifest store. [`runner::run_bootstrap`] wires the pieces together
//! under a cancellation token.

pub mod acl;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod runner;
pub mod walker;

pub use config::BootstrapConfig;
pub use error::{BootstrapError, Result};
