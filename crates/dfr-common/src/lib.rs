//! DFR Common Library
//!
//! Shared infrastructure for the DFR workspace:
//!
//! - **Error Handling**: workspace-wide error and result types
//! - **Logging**: tracing subscriber setup (console/file, text/json)
//! - **Engine Control**: the start/stop/status contract both engines expose
//!   to an external process-control surface

pub mod control;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
