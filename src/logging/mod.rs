// file: src/logging/mod.rs
// version: 1.0.0
// guid: 1e333774-f60f-4a3f-8d0a-8e07188cb479

//! Logging system for coverage-watch

pub mod logger;

pub use logger::init_logger;
