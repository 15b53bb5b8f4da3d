// file: src/cli/mod.rs
// version: 1.0.0
// guid: 91cb8d60-ebf5-455a-9ab3-03d211076f24

//! Command line interface for coverage-watch

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::*;
