// file: src/cli/args.rs
// version: 1.0.0
// guid: ca72a07a-e326-49e9-8666-1755a189e68a

//! Command line argument definitions

use crate::config::{BusyPolicy, Config, LogFormat, ToolKind};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "coverage-watch")]
#[command(about = "Re-run coverage-instrumented tests on every source change and keep an LCOV report fresh")]
#[command(version = crate::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[arg(long, value_enum, global = true, help = "Log output format")]
    pub log_format: Option<LogFormatArg>,

    #[arg(short, long, global = true, help = "Project configuration file [default: .coverage-watch.toml]")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch sources and re-run coverage on every change (default)
    Watch(WatchArgs),

    /// Run a single coverage cycle and exit
    Once {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long, help = "Print the cycle outcome as JSON")]
        json: bool,
    },

    /// Check that the coverage tool and watch paths are available
    CheckPrereqs,

    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Overrides for the watch loop
#[derive(Args, Debug, Default, Clone)]
pub struct WatchArgs {
    #[arg(short, long = "watch", value_name = "DIR", help = "Directory to watch (repeatable)")]
    pub watch: Vec<PathBuf>,

    #[arg(long, value_name = "MS", help = "Quiet period that ends a burst of changes")]
    pub debounce_ms: Option<u64>,

    #[arg(long, help = "Wait for the first change instead of running immediately")]
    pub no_initial_run: bool,

    #[arg(long, help = "Clear the terminal before each cycle")]
    pub clear: bool,

    #[arg(long, value_enum, help = "What to do with changes made during a run")]
    pub on_busy: Option<BusyArg>,

    #[arg(short, long = "ext", value_name = "EXT", help = "File extension that triggers a run (repeatable)")]
    pub extensions: Vec<String>,

    #[arg(short, long, value_name = "GLOB", help = "Gitignore-style pattern to ignore (repeatable)")]
    pub ignore: Vec<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Overrides for the coverage invocation
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    #[arg(short, long, value_name = "FILE", help = "LCOV report path [default: ./.analyze/lcov.info]")]
    pub output: Option<PathBuf>,

    #[arg(short, long, value_enum, help = "Coverage tool to run")]
    pub tool: Option<ToolArg>,

    #[arg(long, value_name = "SECS", help = "Abort a run that takes longer than this")]
    pub timeout_secs: Option<u64>,

    #[arg(last = true, value_name = "TOOL_ARGS", help = "Extra arguments passed to the coverage tool")]
    pub tool_args: Vec<String>,
}

/// Coverage tool argument for CLI
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ToolArg {
    LlvmCov,
    Tarpaulin,
    Custom,
}

impl From<ToolArg> for ToolKind {
    fn from(tool: ToolArg) -> Self {
        match tool {
            ToolArg::LlvmCov => ToolKind::LlvmCov,
            ToolArg::Tarpaulin => ToolKind::Tarpaulin,
            ToolArg::Custom => ToolKind::Custom,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum BusyArg {
    Queue,
    Restart,
}

impl From<BusyArg> for BusyPolicy {
    fn from(arg: BusyArg) -> Self {
        match arg {
            BusyArg::Queue => BusyPolicy::Queue,
            BusyArg::Restart => BusyPolicy::Restart,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogFormatArg {
    Compact,
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl WatchArgs {
    /// Apply flags on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if !self.watch.is_empty() {
            config.watch.paths = self.watch.clone();
        }
        if let Some(ms) = self.debounce_ms {
            config.watch.debounce_ms = ms;
        }
        if self.no_initial_run {
            config.watch.initial_run = false;
        }
        if self.clear {
            config.watch.clear_screen = true;
        }
        if let Some(policy) = self.on_busy {
            config.watch.on_busy = policy.into();
        }
        if !self.extensions.is_empty() {
            config.watch.extensions = self
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect();
        }
        config.watch.ignore.extend(self.ignore.iter().cloned());
        self.run.apply(config);
    }
}

impl RunArgs {
    /// Apply flags on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.coverage.output = output.clone();
        }
        if let Some(tool) = self.tool {
            config.coverage.tool = tool.into();
        }
        if let Some(secs) = self.timeout_secs {
            config.coverage.timeout_secs = Some(secs);
        }
        if self.tool_args.is_empty() {
            return;
        }
        if config.coverage.tool == ToolKind::Custom && config.coverage.command.is_empty() {
            // with the custom tool the trailing args are the whole command
            config.coverage.command = self.tool_args.clone();
        } else {
            config.coverage.extra_args.extend(self.tool_args.iter().cloned());
        }
    }
}
