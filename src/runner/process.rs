// file: src/runner/process.rs
// version: 1.0.0
// guid: be114d55-4dd8-4d2b-a3ef-faf95114345f

//! Child process execution of the coverage tool

use super::{raised, CommandSpec, CycleOutcome, CycleRunner, CycleStatus};
use crate::config::CoverageSettings;
use crate::report::{LcovSummary, ReportPath};
use crate::watcher::filter::absolutize;
use crate::Result;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Time a cancelled run gets to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// How often a running child is checked for exit
const EXIT_POLL: Duration = Duration::from_millis(50);

/// Process groups of runs whose leader has not been reaped yet. A group id
/// stays valid exactly as long as it is listed here.
static LIVE_GROUPS: Mutex<Vec<u32>> = Mutex::new(Vec::new());

fn live_groups() -> MutexGuard<'static, Vec<u32>> {
    LIVE_GROUPS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// SIGKILL the process group of every run in flight.
///
/// For a forced exit that cannot wait for cancelled runs to wind down.
/// Returns the number of groups signalled.
pub fn kill_running() -> usize {
    let groups = live_groups();
    #[cfg(unix)]
    {
        for pid in groups.iter() {
            signal_group(*pid, libc::SIGKILL);
        }
    }
    groups.len()
}

/// Keeps a run's group listed in [`LIVE_GROUPS`] until it is reaped or dropped
struct GroupRegistration(Option<u32>);

impl GroupRegistration {
    fn new(pid: Option<u32>) -> Self {
        if let Some(pid) = pid {
            live_groups().push(pid);
        }
        Self(pid)
    }
}

impl Drop for GroupRegistration {
    fn drop(&mut self) {
        if let Some(pid) = self.0 {
            live_groups().retain(|g| *g != pid);
        }
    }
}

/// Runs the coverage tool as a child process
pub struct ProcessRunner {
    command: CommandSpec,
    report: ReportPath,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Create a runner for the given coverage settings. A relative report
    /// path is taken relative to the current directory.
    pub fn new(settings: &CoverageSettings) -> Result<Self> {
        let base = std::env::current_dir()?;
        Self::with_base(settings, &base)
    }

    /// Create a runner resolving a relative report path against `base`.
    ///
    /// The tool may run in `coverage.working_dir`, so the paths it is handed
    /// must not depend on its own working directory.
    pub fn with_base(settings: &CoverageSettings, base: &Path) -> Result<Self> {
        let report = ReportPath::new(absolutize(base, &settings.output))?;
        let command = CommandSpec::for_settings(settings, &report)?;

        Ok(Self {
            command,
            report,
            working_dir: settings.working_dir.clone(),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn report(&self) -> &ReportPath {
        &self.report
    }

    async fn execute(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> (CycleStatus, Option<LcovSummary>) {
        if let Err(e) = self.report.prepare().await {
            return (
                CycleStatus::SpawnFailed {
                    reason: e.to_string(),
                },
                None,
            );
        }

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(ref wd) = self.working_dir {
            cmd.current_dir(wd);
        }

        // own process group so the whole tree (cargo, rustc, test binaries)
        // can be signalled at once
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        debug!("Spawning: {}", self.command.display());
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.discard_staging().await;
                return (
                    CycleStatus::SpawnFailed {
                        reason: format!("Failed to start {}: {}", self.command.program, e),
                    },
                    None,
                );
            }
        };

        let pid = child.id();
        let _registration = GroupRegistration::new(pid);
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let timed_out = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            waited = reap(&mut child, pid) => self.exit_status(waited),
            _ = raised(cancel) => {
                info!("Stopping in-flight coverage run");
                if let Err(e) = terminate(&mut child, pid).await {
                    error!("Failed to stop coverage run: {}", e);
                }
                CycleStatus::Cancelled
            }
            _ = timed_out => {
                warn!("Coverage run exceeded its time limit");
                if let Err(e) = terminate(&mut child, pid).await {
                    error!("Failed to stop coverage run: {}", e);
                }
                CycleStatus::TimedOut
            }
        };

        if status != CycleStatus::Passed {
            self.discard_staging().await;
            return (status, None);
        }

        match self.report.promote().await {
            Ok(path) => match LcovSummary::from_file(&path).await {
                Ok(summary) => (CycleStatus::Passed, Some(summary)),
                Err(e) => {
                    warn!("Report written but could not be summarized: {}", e);
                    (CycleStatus::Passed, None)
                }
            },
            Err(e) => {
                self.discard_staging().await;
                (
                    CycleStatus::ReportMissing {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        }
    }

    fn exit_status(&self, waited: io::Result<ExitStatus>) -> CycleStatus {
        match waited {
            Ok(status) if status.success() => CycleStatus::Passed,
            Ok(status) => CycleStatus::Failed {
                code: status.code(),
            },
            Err(e) => CycleStatus::SpawnFailed {
                reason: format!("Failed to wait for {}: {}", self.command.program, e),
            },
        }
    }

    async fn discard_staging(&self) {
        if let Err(e) = self.report.discard().await {
            warn!("Failed to clean staging directory: {}", e);
        }
    }
}

#[async_trait::async_trait]
impl CycleRunner for ProcessRunner {
    async fn run(&self, cycle: u64, mut cancel: watch::Receiver<bool>) -> CycleOutcome {
        let started_at = chrono::Local::now();
        let start = Instant::now();

        let (status, summary) = self.execute(&mut cancel).await;

        CycleOutcome {
            cycle,
            status,
            started_at,
            duration: start.elapsed(),
            summary,
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} -> {}",
            self.command.display(),
            self.report.final_path().display()
        )
    }
}

/// Ask the process group to stop, escalating to a kill after the grace period
async fn terminate(child: &mut Child, pid: Option<u32>) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            signal_group(pid, libc::SIGTERM);
            match tokio::time::timeout(TERMINATE_GRACE, reap(child, Some(pid))).await {
                Ok(status) => return status,
                Err(_) => warn!("Coverage run ignored SIGTERM, killing it"),
            }
            signal_group(pid, libc::SIGKILL);
            return reap(child, Some(pid)).await;
        }
    }

    child.start_kill()?;
    reap(child, pid).await
}

/// Wait for the leader to exit and reap it.
///
/// Anything left in the group, e.g. a test binary that outlived cargo, is
/// killed while the leader is still a zombie, so the group id cannot have
/// been recycled yet. Reaping and leaving [`LIVE_GROUPS`] happen under the
/// registry lock so [`kill_running`] never signals a reaped group.
async fn reap(child: &mut Child, pid: Option<u32>) -> io::Result<ExitStatus> {
    let Some(pid) = pid else {
        return child.wait().await;
    };

    loop {
        {
            let mut groups = live_groups();
            #[cfg(unix)]
            {
                if leader_exited(pid) {
                    signal_group(pid, libc::SIGKILL);
                }
            }
            if let Some(status) = child.try_wait()? {
                groups.retain(|g| *g != pid);
                return Ok(status);
            }
        }
        tokio::time::sleep(EXIT_POLL).await;
    }
}

/// Whether `pid` has exited, leaving it unreaped
#[cfg(any(target_os = "linux", target_os = "android"))]
fn leader_exited(pid: u32) -> bool {
    // SAFETY: siginfo_t is plain data and WNOWAIT keeps the child waitable
    unsafe {
        let mut info: libc::siginfo_t = std::mem::zeroed();
        let rc = libc::waitid(
            libc::P_PID,
            pid as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        );
        rc == 0 && info.si_pid() != 0
    }
}

/// Without `waitid(WNOWAIT)` the exit is only seen when reaping, at which
/// point the group id may already be reused, so no sweep happens
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn leader_exited(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // SAFETY: kill(2) with a negative pid only signals the group we created
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if rc != 0 {
        debug!(
            "Signal {} to process group {} not delivered: {}",
            signal,
            pid,
            std::io::Error::last_os_error()
        );
    }
}
