// file: src/config/mod.rs
// version: 1.0.0
// guid: a337eca8-1fad-4591-a07d-9672a5a296ce

//! Configuration module for coverage-watch
//!
//! Handles the configuration model, layered loading, and validation.

pub mod loader;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Project configuration file looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = ".coverage-watch.toml";

/// Default location of the LCOV report consumed by editor overlays
pub const DEFAULT_OUTPUT: &str = "./.analyze/lcov.info";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watch: WatchSettings,
    pub coverage: CoverageSettings,
    pub logging: LoggingConfig,
}

/// What to watch and how to react to changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Directories watched recursively
    pub paths: Vec<PathBuf>,

    /// File extensions that count as source changes; empty means any file
    pub extensions: Vec<String>,

    /// Gitignore-style globs for paths that never trigger a cycle
    pub ignore: Vec<String>,

    /// Quiet period that closes a burst of changes
    pub debounce_ms: u64,

    /// Run a cycle immediately on startup
    pub initial_run: bool,

    /// What to do with changes that arrive while a cycle is running
    pub on_busy: BusyPolicy,

    /// Clear the terminal before each cycle
    pub clear_screen: bool,
}

/// Coverage tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageSettings {
    pub tool: ToolKind,

    /// Final LCOV report path
    pub output: PathBuf,

    /// Extra arguments appended to the tool invocation
    pub extra_args: Vec<String>,

    /// Full command line for the custom tool; `{output}` is replaced by the report path
    pub command: Vec<String>,

    pub working_dir: Option<PathBuf>,

    /// Per-run limit in seconds; unset means no limit
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Coverage-instrumented test runners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "llvm-cov")]
    LlvmCov,
    #[serde(rename = "tarpaulin")]
    Tarpaulin,
    #[serde(rename = "custom")]
    Custom,
}

impl ToolKind {
    /// Get the tool name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::LlvmCov => "llvm-cov",
            ToolKind::Tarpaulin => "tarpaulin",
            ToolKind::Custom => "custom",
        }
    }
}

impl std::str::FromStr for ToolKind {
    type Err = crate::error::WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llvm-cov" | "cargo-llvm-cov" => Ok(ToolKind::LlvmCov),
            "tarpaulin" | "cargo-tarpaulin" => Ok(ToolKind::Tarpaulin),
            "custom" => Ok(ToolKind::Custom),
            _ => Err(crate::error::WatchError::config(format!(
                "Unknown coverage tool: {}",
                s
            ))),
        }
    }
}

/// Handling of changes detected while a cycle is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Let the running cycle finish, then run one follow-up cycle
    Queue,
    /// Cancel the running cycle and start over
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch: WatchSettings::default(),
            coverage: CoverageSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("src")],
            extensions: vec!["rs".to_string(), "toml".to_string()],
            ignore: vec![
                "target/".to_string(),
                ".analyze/".to_string(),
                ".git/".to_string(),
                "*~".to_string(),
                "*.swp".to_string(),
            ],
            debounce_ms: 500,
            initial_run: true,
            on_busy: BusyPolicy::Queue,
            clear_screen: false,
        }
    }
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            tool: ToolKind::LlvmCov,
            output: PathBuf::from(DEFAULT_OUTPUT),
            extra_args: Vec::new(),
            command: Vec::new(),
            working_dir: None,
            timeout_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Config {
    /// Get the user configuration file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("coverage-watch").join("config.toml"))
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_editor_overlay_layout() {
        let config = Config::default();
        assert_eq!(config.watch.paths, vec![PathBuf::from("src")]);
        assert_eq!(config.coverage.output, PathBuf::from("./.analyze/lcov.info"));
        assert_eq!(config.coverage.tool, ToolKind::LlvmCov);
        assert_eq!(config.watch.on_busy, BusyPolicy::Queue);
        assert!(config.watch.initial_run);
    }

    #[test]
    fn test_tool_kind_from_str() {
        assert_eq!("llvm-cov".parse::<ToolKind>().unwrap(), ToolKind::LlvmCov);
        assert_eq!(
            "cargo-tarpaulin".parse::<ToolKind>().unwrap(),
            ToolKind::Tarpaulin
        );
        assert!("grcov".parse::<ToolKind>().is_err());
    }

    #[test]
    fn test_toml_round_trip_of_partial_file() {
        let parsed: Config = toml::from_str(
            r#"
[coverage]
tool = "tarpaulin"
"#,
        )
        .unwrap();
        assert_eq!(parsed.coverage.tool, ToolKind::Tarpaulin);
        assert_eq!(parsed.watch, WatchSettings::default());

        let rendered = parsed.to_toml().unwrap();
        assert!(rendered.contains("tool = \"tarpaulin\""));
    }
}
