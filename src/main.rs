// file: src/main.rs
// version: 1.0.0
// guid: 33469ea0-69e6-41a9-85b3-7c36843746c0

//! coverage-watch - Main entry point

use clap::Parser;
use coverage_watch::{
    cli::{
        args::{Cli, Commands, WatchArgs},
        commands::*,
    },
    logging::logger,
    runner,
};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, warn};

/// Standard exit code for Ctrl+C
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let format = cli.log_format.map(Into::into).unwrap_or(config.logging.format);
    if let Err(e) = logger::init_logger(cli.verbose, cli.quiet, &config.logging.level, format) {
        eprintln!("Warning: {}", e);
    }

    // Set up signal handling for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Received interrupt, stopping the watcher and any running tests...");
        let _ = shutdown_tx.send(true);

        wait_for_signal().await;
        // exit skips destructors, so kill_on_drop would never fire
        let killed = runner::kill_running();
        warn!(
            "Received second interrupt, killed {} running process group(s) and exiting",
            killed
        );
        std::process::exit(INTERRUPTED.into());
    });

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Watch(WatchArgs::default()));

    let result = match command {
        Commands::Watch(args) => {
            args.apply(&mut config);
            watch_command(config, shutdown_rx.clone()).await
        }
        Commands::Once { run, json } => {
            run.apply(&mut config);
            once_command(config, json, shutdown_rx.clone()).await
        }
        Commands::CheckPrereqs => check_prerequisites_command(config).await,
        Commands::ShowConfig => show_config_command(&config).await,
    };

    let interrupted = *shutdown_rx.borrow();
    match result {
        Ok(_) if interrupted => ExitCode::from(INTERRUPTED),
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve on Ctrl+C, or SIGTERM on unix
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
