// file: src/logging/logger.rs
// version: 1.0.0
// guid: 67cc8ae6-7ca3-401a-942f-c10967528232

//! Logger initialization and configuration

use crate::config::LogFormat;
use crate::error::WatchError;
use crate::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the filter: `RUST_LOG` wins, then `-q`/`-v`, then the configured level
pub fn build_filter(verbose: bool, quiet: bool, level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the logging system. Logs go to stderr so stdout stays clean
/// for machine-readable output.
pub fn init_logger(verbose: bool, quiet: bool, level: &str, format: LogFormat) -> Result<()> {
    let filter = build_filter(verbose, quiet, level);
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .pretty(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
    };

    result.map_err(|e| WatchError::config(format!("Failed to initialize logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_twice_fails_gracefully() {
        // Arrange
        let _ = init_logger(false, false, "info", LogFormat::Compact);

        // Act
        let second = init_logger(true, false, "info", LogFormat::Json);

        // Assert
        // a global subscriber can only be installed once per process
        assert!(second.is_err());
    }

    #[test]
    fn test_build_filter_levels() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }

        assert_eq!(build_filter(false, true, "info").to_string(), "error");
        assert_eq!(build_filter(true, false, "info").to_string(), "debug");
        assert_eq!(build_filter(false, false, "warn").to_string(), "warn");
        assert_eq!(build_filter(false, false, "foo=loud").to_string(), "info");
    }
}
