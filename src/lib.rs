// file: src/lib.rs
// version: 1.0.0
// guid: a9e0d38f-3f0b-437c-8db6-8452db18050a

//! # coverage-watch
//!
//! Watches a source tree and re-runs a coverage-instrumented test suite on
//! every debounced burst of changes, keeping an LCOV report (by default
//! `./.analyze/lcov.info`) fresh for editor coverage overlays.
//!
//! A failing run never stops the watch loop. Interrupting the process stops
//! the watcher and the in-flight run, including every process the run spawned.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod report;
pub mod runner;
pub mod session;
pub mod watcher;

pub use error::{Result, WatchError};

/// Version information for the utility
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
