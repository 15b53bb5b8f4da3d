// file: src/runner/tool.rs
// version: 1.0.0
// guid: 9da42de4-811b-4285-9391-1fddf368938e

//! Command lines for the supported coverage tools

use crate::config::{CoverageSettings, ToolKind};
use crate::error::WatchError;
use crate::report::ReportPath;
use crate::Result;

/// Placeholder replaced by the staged report file in custom commands
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder replaced by the staging directory in custom commands
pub const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build the invocation that writes an LCOV report into the staging area
    pub fn for_settings(settings: &CoverageSettings, report: &ReportPath) -> Result<Self> {
        let staged = report.staged_file().to_string_lossy().into_owned();
        let staging_dir = report.staging_dir().to_string_lossy().into_owned();

        let mut spec = match settings.tool {
            ToolKind::LlvmCov => Self {
                program: "cargo".to_string(),
                args: vec![
                    "llvm-cov".to_string(),
                    "--lcov".to_string(),
                    "--output-path".to_string(),
                    staged,
                ],
            },
            ToolKind::Tarpaulin => Self {
                program: "cargo".to_string(),
                args: vec![
                    "tarpaulin".to_string(),
                    "--out".to_string(),
                    "Lcov".to_string(),
                    "--output-dir".to_string(),
                    staging_dir,
                ],
            },
            ToolKind::Custom => {
                let (program, rest) = settings.command.split_first().ok_or_else(|| {
                    WatchError::config("The custom tool requires coverage.command to be set")
                })?;
                let substitute = |s: &String| {
                    s.replace(OUTPUT_DIR_PLACEHOLDER, &staging_dir)
                        .replace(OUTPUT_PLACEHOLDER, &staged)
                };
                Self {
                    program: substitute(program),
                    args: rest.iter().map(substitute).collect(),
                }
            }
        };

        spec.args.extend(settings.extra_args.iter().cloned());
        Ok(spec)
    }

    /// Render for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executables that must be on `PATH` for the configured tool
pub fn required_programs(settings: &CoverageSettings) -> Vec<String> {
    match settings.tool {
        ToolKind::LlvmCov => vec!["cargo".to_string(), "cargo-llvm-cov".to_string()],
        ToolKind::Tarpaulin => vec!["cargo".to_string(), "cargo-tarpaulin".to_string()],
        ToolKind::Custom => settings.command.first().cloned().into_iter().collect(),
    }
}

/// Install hint for a missing program
pub fn install_hint(program: &str) -> Option<&'static str> {
    match program {
        "cargo-llvm-cov" => Some("cargo install cargo-llvm-cov"),
        "cargo-tarpaulin" => Some("cargo install cargo-tarpaulin"),
        "cargo" => Some("install a Rust toolchain from https://rustup.rs"),
        _ => None,
    }
}
