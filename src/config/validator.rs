// file: src/config/validator.rs
// version: 1.0.0
// guid: e1c442e9-cc72-4e36-8fde-ea813883083d

use super::{Config, ToolKind};
use crate::error::WatchError;
use crate::Result;
use std::path::Path;
use tracing::debug;

const MIN_DEBOUNCE_MS: u64 = 10;
const MAX_DEBOUNCE_MS: u64 = 60_000;

impl Config {
    /// Check the configuration for internal consistency.
    ///
    /// Does not touch the file system; see [`Config::check_paths`].
    pub fn validate(&self) -> Result<()> {
        if self.watch.paths.is_empty() {
            return Err(WatchError::validation(
                "At least one watch path must be configured",
            ));
        }

        if !(MIN_DEBOUNCE_MS..=MAX_DEBOUNCE_MS).contains(&self.watch.debounce_ms) {
            return Err(WatchError::validation(format!(
                "Debounce must be between {}ms and {}ms, got {}ms",
                MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS, self.watch.debounce_ms
            )));
        }

        if self.coverage.output.as_os_str().is_empty() || self.coverage.output.file_name().is_none()
        {
            return Err(WatchError::validation(format!(
                "Coverage output must name a file: {:?}",
                self.coverage.output
            )));
        }

        if self.coverage.tool == ToolKind::Custom && self.coverage.command.is_empty() {
            return Err(WatchError::validation(
                "The custom tool requires coverage.command to be set",
            ));
        }

        if self.coverage.timeout_secs == Some(0) {
            return Err(WatchError::validation(
                "coverage.timeout_secs must be greater than zero",
            ));
        }

        for ext in &self.watch.extensions {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(WatchError::validation(format!(
                    "Extensions are written without a leading dot: {:?}",
                    ext
                )));
            }
        }

        Ok(())
    }

    /// Check that every watch path and the working directory exist as directories
    pub fn check_paths(&self) -> Result<()> {
        for path in &self.watch.paths {
            check_directory(path, "Watch path")?;
        }

        if let Some(dir) = &self.coverage.working_dir {
            check_directory(dir, "Working directory")?;
        }

        debug!("All configured paths exist");
        Ok(())
    }
}

fn check_directory(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(WatchError::validation(format!(
            "{} does not exist: {}",
            what,
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(WatchError::validation(format!(
            "{} is not a directory: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_watch_paths() {
        let mut config = Config::default();
        config.watch.paths.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_debounce() {
        let mut config = Config::default();
        config.watch.debounce_ms = 0;
        assert!(config.validate().is_err());

        config.watch.debounce_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_tool_needs_command() {
        let mut config = Config::default();
        config.coverage.tool = ToolKind::Custom;
        assert!(config.validate().is_err());

        config.coverage.command = vec!["make".to_string(), "coverage".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_dotted_extension() {
        let mut config = Config::default();
        config.watch.extensions = vec![".rs".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("leading dot"));
    }

    #[test]
    fn test_rejects_output_without_file_name() {
        let mut config = Config::default();
        config.coverage.output = PathBuf::from("/");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_check_paths() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();

        config.watch.paths = vec![temp.path().to_path_buf()];
        assert!(config.check_paths().is_ok());

        config.watch.paths = vec![temp.path().join("missing")];
        let err = config.check_paths().unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let file = temp.path().join("file.rs");
        std::fs::write(&file, "fn main() {}").unwrap();
        config.watch.paths = vec![file];
        let err = config.check_paths().unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
