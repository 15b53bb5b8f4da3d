// file: src/cli/commands.rs
// version: 1.0.0
// guid: 090b893d-a96b-43bb-8de7-f9edd643b6d7

//! Command implementations for the CLI

use crate::{
    config::{loader::ConfigLoader, Config},
    report::ReportPath,
    runner::{required_programs, tool::install_hint, CycleRunner, ProcessRunner},
    session::{self, WatchSession},
    watcher::{debounce_changes, FileWatcher, PathFilter},
    Result,
};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::args::Cli;

/// Load configuration from files and environment, honoring `--config`
pub fn load_config(cli: &Cli) -> Result<Config> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::new().with_project_file(path),
        None => ConfigLoader::new(),
    };
    loader.load()
}

/// Watch sources and run a coverage cycle per debounced change burst
pub async fn watch_command(config: Config, shutdown: watch::Receiver<bool>) -> Result<ExitCode> {
    config.validate()?;
    config.check_paths()?;

    let cwd = std::env::current_dir()?;
    let root = cwd.canonicalize().unwrap_or(cwd);
    let filter = PathFilter::from_config(&config, &root)?;

    let tracked = count_relevant_files(&config.watch.paths, &filter);
    info!(
        "Tracking {} source files; report goes to {}",
        tracked,
        config.coverage.output.display()
    );

    let runner = ProcessRunner::with_base(&config.coverage, &root)?;
    runner.report().ensure_dir().await?;

    let (watcher, events) = FileWatcher::start(&config.watch.paths, filter)?;
    let (batch_tx, batch_rx) = mpsc::unbounded_channel();
    let debounce = tokio::spawn(debounce_changes(
        events,
        Duration::from_millis(config.watch.debounce_ms),
        batch_tx,
    ));

    let mut session = WatchSession::new(runner, &config.watch, root);
    let stats = session.run(batch_rx, shutdown).await;

    // dropping the watcher closes the event channel and ends the debouncer
    drop(watcher);
    if let Err(e) = debounce.await {
        warn!("Debounce task ended abnormally: {}", e);
    }

    info!("Stopped after {} cycles", stats.cycles);
    Ok(ExitCode::SUCCESS)
}

/// Run a single coverage cycle
pub async fn once_command(
    config: Config,
    json_output: bool,
    shutdown: watch::Receiver<bool>,
) -> Result<ExitCode> {
    config.validate()?;
    if let Some(dir) = &config.coverage.working_dir {
        if !dir.is_dir() {
            return Err(crate::error::WatchError::validation(format!(
                "Working directory does not exist: {}",
                dir.display()
            )));
        }
    }

    let runner = ProcessRunner::new(&config.coverage)?;
    runner.report().ensure_dir().await?;
    info!("Coverage command: {}", runner.describe());

    let outcome = runner.run(1, shutdown).await;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        session::report(&outcome);
    }

    Ok(if outcome.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Check that the configured tool and watch paths are usable
pub async fn check_prerequisites_command(config: Config) -> Result<ExitCode> {
    info!("Checking prerequisites for the {} tool", config.coverage.tool.as_str());
    let mut ok = true;

    if let Err(e) = config.validate() {
        error!("✗ {}", e);
        ok = false;
    }

    for program in required_programs(&config.coverage) {
        match which::which(&program) {
            Ok(path) => println!("{} {} ({})", "✓".green(), program, path.display()),
            Err(_) => {
                ok = false;
                println!("{} {} not found on PATH", "✗".red(), program);
                if let Some(hint) = install_hint(&program) {
                    println!("    {}", hint);
                }
            }
        }
    }

    for path in &config.watch.paths {
        if path.is_dir() {
            println!("{} watch path {}", "✓".green(), path.display());
        } else {
            ok = false;
            println!("{} watch path {} is not a directory", "✗".red(), path.display());
        }
    }

    match ReportPath::new(&config.coverage.output) {
        Ok(report) => println!(
            "{} report will be written to {}",
            "✓".green(),
            report.final_path().display()
        ),
        Err(e) => {
            ok = false;
            println!("{} {}", "✗".red(), e);
        }
    }

    if ok {
        info!("✓ All prerequisites are available");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("✗ Some prerequisites are missing");
        Ok(ExitCode::FAILURE)
    }
}

/// Print the effective configuration
pub async fn show_config_command(config: &Config) -> Result<ExitCode> {
    print!("{}", config.to_toml()?);
    Ok(ExitCode::SUCCESS)
}

/// Number of files under the watch paths that would trigger a cycle
fn count_relevant_files(paths: &[PathBuf], filter: &PathFilter) -> usize {
    paths
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| filter.is_relevant(entry.path()))
        .count()
}
