// file: src/report/mod.rs
// version: 1.0.0
// guid: 2c434ae9-c496-4985-8ac1-ea74cdd24665

//! LCOV report handling
//!
//! Coverage tools write into a staging directory next to the final report.
//! Only a run that completes successfully promotes its report, replacing the
//! previous file in a single rename so editor overlays never observe a
//! partially written or appended report.

pub mod lcov;
pub mod staging;

pub use lcov::LcovSummary;
pub use staging::ReportPath;
