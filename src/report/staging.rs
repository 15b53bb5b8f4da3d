// file: src/report/staging.rs
// version: 1.0.0
// guid: 3d3ba893-82ad-4a3e-b320-ae2e1d6d2711

//! Staging and promotion of the coverage report file

use crate::error::WatchError;
use crate::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// File name every tool writes inside the staging directory.
/// `cargo tarpaulin --out Lcov` always produces this name.
pub const STAGED_FILE_NAME: &str = "lcov.info";

/// Final report location plus the staging directory next to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPath {
    final_path: PathBuf,
    staging_dir: PathBuf,
}

impl ReportPath {
    /// Create report paths for the given final location
    pub fn new<P: AsRef<Path>>(final_path: P) -> Result<Self> {
        let final_path = final_path.as_ref().to_path_buf();
        let file_name = final_path.file_name().ok_or_else(|| {
            WatchError::report(format!(
                "Report path has no file name: {}",
                final_path.display()
            ))
        })?;

        let parent = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staging_dir = parent.join(format!(".{}.staging", file_name.to_string_lossy()));

        Ok(Self {
            final_path,
            staging_dir,
        })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Path the coverage tool is told to write to
    pub fn staged_file(&self) -> PathBuf {
        self.staging_dir.join(STAGED_FILE_NAME)
    }

    /// Create the directory the final report lives in
    pub async fn ensure_dir(&self) -> Result<()> {
        let dir = self.staging_dir.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).await.map_err(|e| {
            WatchError::report(format!(
                "Failed to create report directory {}: {}",
                dir.display(),
                e
            ))
        })
    }

    /// Create the report directory and an empty staging directory
    pub async fn prepare(&self) -> Result<()> {
        self.discard().await?;
        fs::create_dir_all(&self.staging_dir).await.map_err(|e| {
            WatchError::report(format!(
                "Failed to create report directory {}: {}",
                self.staging_dir.display(),
                e
            ))
        })?;
        debug!("Prepared staging directory {}", self.staging_dir.display());
        Ok(())
    }

    /// Replace the final report with the staged one
    pub async fn promote(&self) -> Result<PathBuf> {
        let staged = self.staged_file();
        match fs::metadata(&staged).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(WatchError::report(format!(
                    "Coverage tool did not produce {}",
                    staged.display()
                )))
            }
        }

        fs::rename(&staged, &self.final_path).await.map_err(|e| {
            WatchError::report(format!(
                "Failed to move report into {}: {}",
                self.final_path.display(),
                e
            ))
        })?;

        if let Err(e) = self.discard().await {
            warn!("Could not remove staging directory: {}", e);
        }

        Ok(self.final_path.clone())
    }

    /// Remove the staging directory and anything a failed run left in it
    pub async fn discard(&self) -> Result<()> {
        match fs::remove_dir_all(&self.staging_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
