// file: src/config/loader.rs
// version: 1.0.0
// guid: e9a08a09-aaf3-481a-bc39-725834b20801

//! Layered configuration loading
//!
//! Sources, lowest precedence first: built-in defaults, the user config file,
//! the project config file, then `COVERAGE_WATCH_*` environment variables.
//! Command-line flags are applied on top by the CLI layer.

use super::{Config, ToolKind, PROJECT_CONFIG_FILE};
use crate::error::WatchError;
use crate::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration loader with environment overrides and path expansion
pub struct ConfigLoader {
    user_file: Option<PathBuf>,
    project_file: Option<PathBuf>,
    explicit_project_file: bool,
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader reading the real environment
    pub fn new() -> Self {
        Self {
            user_file: Config::user_config_path(),
            project_file: Some(PathBuf::from(PROJECT_CONFIG_FILE)),
            explicit_project_file: false,
            env_vars: std::env::vars().collect(),
        }
    }

    /// Use an explicit project file; unlike the default one it must exist
    pub fn with_project_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.project_file = Some(path.as_ref().to_path_buf());
        self.explicit_project_file = true;
        self
    }

    /// Skip the per-user configuration file
    pub fn without_user_file(mut self) -> Self {
        self.user_file = None;
        self
    }

    /// Replace the environment used for overrides and expansion
    pub fn with_env(mut self, env_vars: HashMap<String, String>) -> Self {
        self.env_vars = env_vars;
        self
    }

    /// Set environment variable for overrides and expansion
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }

    /// Load the merged configuration
    pub fn load(&self) -> Result<Config> {
        let mut merged = toml::Value::try_from(Config::default())?;

        if let Some(user_file) = &self.user_file {
            if user_file.exists() {
                info!("Loading user configuration from: {}", user_file.display());
                merge_values(&mut merged, Self::read_file(user_file)?);
            }
        }

        if let Some(project_file) = &self.project_file {
            if project_file.exists() {
                info!(
                    "Loading project configuration from: {}",
                    project_file.display()
                );
                merge_values(&mut merged, Self::read_file(project_file)?);
            } else if self.explicit_project_file {
                return Err(WatchError::config(format!(
                    "Config file not found: {}",
                    project_file.display()
                )));
            }
        }

        let config: Config = merged.try_into()?;
        let config = self.apply_env_overrides(config)?;
        let config = self.expand_paths(config)?;

        debug!("Final configuration: {:#?}", config);
        Ok(config)
    }

    /// Read a TOML file into an untyped table
    fn read_file(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path).map_err(|e| {
            WatchError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            WatchError::config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, mut config: Config) -> Result<Config> {
        if let Some(output) = self.env_vars.get("COVERAGE_WATCH_OUTPUT") {
            config.coverage.output = PathBuf::from(output);
        }

        if let Some(debounce) = self.env_vars.get("COVERAGE_WATCH_DEBOUNCE_MS") {
            config.watch.debounce_ms = debounce.parse().map_err(|_| {
                WatchError::config(format!(
                    "COVERAGE_WATCH_DEBOUNCE_MS must be a number of milliseconds, got {:?}",
                    debounce
                ))
            })?;
        }

        if let Some(tool) = self.env_vars.get("COVERAGE_WATCH_TOOL") {
            config.coverage.tool = tool.parse::<ToolKind>()?;
        }

        if let Some(level) = self.env_vars.get("COVERAGE_WATCH_LOG_LEVEL") {
            config.logging.level = level.clone();
        }

        Ok(config)
    }

    /// Expand `~` and `$VAR` in every configured path
    fn expand_paths(&self, mut config: Config) -> Result<Config> {
        config.watch.paths = config
            .watch
            .paths
            .iter()
            .map(|p| self.expand_path(p))
            .collect::<Result<_>>()?;
        config.coverage.output = self.expand_path(&config.coverage.output)?;
        if let Some(dir) = &config.coverage.working_dir {
            config.coverage.working_dir = Some(self.expand_path(dir)?);
        }
        Ok(config)
    }

    fn expand_path(&self, path: &Path) -> Result<PathBuf> {
        let raw = path.to_string_lossy();
        let expanded = shellexpand::full_with_context(
            raw.as_ref(),
            || dirs::home_dir().map(|home| home.to_string_lossy().into_owned()),
            |var: &str| -> std::result::Result<Option<String>, std::env::VarError> {
                Ok(self.env_vars.get(var).cloned())
            },
        )
        .map_err(|e| {
            WatchError::config(format!("Failed to expand path {}: {}", path.display(), e))
        })?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `overlay` into `base`, recursing into tables so that only keys
/// present in the overlay replace values in the base
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusyPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn isolated_loader() -> ConfigLoader {
        ConfigLoader::new()
            .without_user_file()
            .with_env(HashMap::new())
    }

    #[test]
    fn test_defaults_without_files() {
        let loader = ConfigLoader {
            project_file: None,
            ..isolated_loader()
        };
        let config = loader.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_project_file_merges_field_wise() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[watch]
debounce_ms = 250
on_busy = "restart"

[coverage]
extra_args = ["--workspace"]
"#
        )
        .unwrap();

        let config = isolated_loader().with_project_file(file.path()).load()?;

        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.watch.on_busy, BusyPolicy::Restart);
        assert_eq!(config.coverage.extra_args, vec!["--workspace".to_string()]);
        // untouched keys keep their defaults
        assert_eq!(config.watch.paths, vec![PathBuf::from("src")]);
        assert_eq!(config.coverage.tool, ToolKind::LlvmCov);
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = isolated_loader()
            .with_project_file("/definitely/not/here/.coverage-watch.toml")
            .load();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Config file not found"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[watch\ndebounce_ms = ").unwrap();

        let result = isolated_loader().with_project_file(file.path()).load();
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let mut loader = ConfigLoader {
            project_file: None,
            ..isolated_loader()
        };
        loader.set_env_var("COVERAGE_WATCH_DEBOUNCE_MS".to_string(), "1200".to_string());
        loader.set_env_var("COVERAGE_WATCH_TOOL".to_string(), "tarpaulin".to_string());
        loader.set_env_var(
            "COVERAGE_WATCH_OUTPUT".to_string(),
            "coverage/lcov.info".to_string(),
        );

        let config = loader.load()?;
        assert_eq!(config.watch.debounce_ms, 1200);
        assert_eq!(config.coverage.tool, ToolKind::Tarpaulin);
        assert_eq!(config.coverage.output, PathBuf::from("coverage/lcov.info"));
        Ok(())
    }

    #[test]
    fn test_bad_env_override_is_rejected() {
        let mut loader = ConfigLoader {
            project_file: None,
            ..isolated_loader()
        };
        loader.set_env_var("COVERAGE_WATCH_DEBOUNCE_MS".to_string(), "soon".to_string());
        assert!(loader.load().is_err());
    }

    #[test]
    fn test_path_expansion_uses_loader_env() -> Result<()> {
        let mut loader = ConfigLoader {
            project_file: None,
            ..isolated_loader()
        };
        loader.set_env_var("REPORT_DIR".to_string(), "/tmp/reports".to_string());
        loader.set_env_var(
            "COVERAGE_WATCH_OUTPUT".to_string(),
            "$REPORT_DIR/lcov.info".to_string(),
        );

        let config = loader.load()?;
        assert_eq!(config.coverage.output, PathBuf::from("/tmp/reports/lcov.info"));
        Ok(())
    }

    #[test]
    fn test_merge_values_replaces_arrays_wholesale() {
        let mut base: toml::Value = toml::from_str("list = [1, 2, 3]\n[t]\na = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("list = [9]\n[t]\nb = 5").unwrap();
        merge_values(&mut base, overlay);

        assert_eq!(base["list"].as_array().unwrap().len(), 1);
        assert_eq!(base["t"]["a"].as_integer(), Some(1));
        assert_eq!(base["t"]["b"].as_integer(), Some(5));
    }
}
