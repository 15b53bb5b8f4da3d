// file: src/session.rs
// version: 1.0.0
// guid: b9367581-5060-45da-95be-4afdfb277d06

//! The watch loop: one coverage cycle per debounced change burst

use crate::config::{BusyPolicy, WatchSettings};
use crate::runner::{raised, CycleOutcome, CycleRunner, CycleStatus};
use crate::watcher::ChangeBatch;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// Counters reported when the session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub cycles: u64,
    pub passed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Why a cycle is starting
#[derive(Debug)]
enum Trigger {
    Startup,
    Changes(ChangeBatch),
}

/// Drives a [`CycleRunner`] from a stream of change batches
pub struct WatchSession<R: CycleRunner> {
    runner: R,
    policy: BusyPolicy,
    initial_run: bool,
    clear_screen: bool,
    root: PathBuf,
    stats: SessionStats,
}

impl<R: CycleRunner> WatchSession<R> {
    pub fn new(runner: R, settings: &WatchSettings, root: PathBuf) -> Self {
        Self {
            runner,
            policy: settings.on_busy,
            initial_run: settings.initial_run,
            clear_screen: settings.clear_screen,
            root,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run cycles until `shutdown` is raised or the batch stream ends.
    ///
    /// A failing cycle never ends the session. On shutdown the in-flight
    /// cycle is cancelled and awaited before returning.
    pub async fn run(
        &mut self,
        mut batches: UnboundedReceiver<ChangeBatch>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionStats {
        info!("Coverage command: {}", self.runner.describe());

        let mut next = if self.initial_run {
            Some(Trigger::Startup)
        } else {
            None
        };
        let mut batches_closed = false;

        loop {
            let trigger = match next.take() {
                Some(trigger) => trigger,
                None if batches_closed => break,
                None => {
                    info!("Waiting for changes...");
                    tokio::select! {
                        batch = batches.recv() => match batch {
                            Some(batch) => Trigger::Changes(batch),
                            None => break,
                        },
                        _ = raised(&mut shutdown) => break,
                    }
                }
            };

            let cycle = self.stats.cycles + 1;
            self.announce(cycle, &trigger);

            let (cancel_tx, cancel_rx) = watch::channel(false);
            let mut queued: Option<ChangeBatch> = None;
            let mut stopping = false;

            let outcome = {
                let run = self
                    .runner
                    .run(cycle, cancel_rx)
                    .instrument(info_span!("cycle", n = cycle));
                tokio::pin!(run);

                loop {
                    tokio::select! {
                        outcome = &mut run => break outcome,
                        batch = batches.recv(), if !batches_closed => match batch {
                            Some(batch) => {
                                debug!("{} more changed paths during cycle {}", batch.len(), cycle);
                                queue(&mut queued, batch);
                                if self.policy == BusyPolicy::Restart {
                                    let _ = cancel_tx.send(true);
                                }
                            }
                            None => batches_closed = true,
                        },
                        _ = raised(&mut shutdown), if !stopping => {
                            info!("Shutdown requested, stopping cycle {}", cycle);
                            stopping = true;
                            let _ = cancel_tx.send(true);
                        }
                    }
                }
            };

            // changes that landed while the run was finishing belong to the same follow-up
            while let Ok(batch) = batches.try_recv() {
                queue(&mut queued, batch);
            }

            self.record(&outcome);
            report(&outcome);

            if stopping || *shutdown.borrow() {
                break;
            }

            next = queued.map(Trigger::Changes);
        }

        info!(
            "Session finished: {} cycles, {} passed, {} failed, {} cancelled",
            self.stats.cycles, self.stats.passed, self.stats.failed, self.stats.cancelled
        );
        self.stats
    }

    fn announce(&self, cycle: u64, trigger: &Trigger) {
        if self.clear_screen {
            clear_terminal();
        }
        match trigger {
            Trigger::Startup => info!("Cycle {}: initial run", cycle),
            Trigger::Changes(batch) => {
                info!("Cycle {}: change detected in {}", cycle, batch.describe(&self.root))
            }
        }
    }

    fn record(&mut self, outcome: &CycleOutcome) {
        self.stats.cycles += 1;
        match outcome.status {
            CycleStatus::Passed => self.stats.passed += 1,
            CycleStatus::Cancelled => self.stats.cancelled += 1,
            _ => self.stats.failed += 1,
        }
    }
}

fn queue(queued: &mut Option<ChangeBatch>, batch: ChangeBatch) {
    match queued {
        Some(existing) => existing.merge(batch),
        None => *queued = Some(batch),
    }
}

/// Log the outcome and print a coloured status line
pub fn report(outcome: &CycleOutcome) {
    let label = match outcome.status {
        CycleStatus::Passed => outcome.status.label().green().bold(),
        CycleStatus::Cancelled => outcome.status.label().yellow().bold(),
        _ => outcome.status.label().red().bold(),
    };

    let coverage = outcome
        .summary
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no coverage data".to_string());

    eprintln!(
        "{} cycle {} at {} in {:.1}s: {}",
        label,
        outcome.cycle,
        outcome.started_at.format("%H:%M:%S"),
        outcome.duration.as_secs_f64(),
        coverage
    );

    match &outcome.status {
        CycleStatus::Passed => info!("Coverage report updated"),
        CycleStatus::Failed { code } => warn!(
            "Test run failed with exit code {:?}; waiting for the next change",
            code
        ),
        CycleStatus::TimedOut => warn!("Test run timed out; waiting for the next change"),
        CycleStatus::Cancelled => debug!("Cycle {} cancelled", outcome.cycle),
        CycleStatus::SpawnFailed { reason } => warn!("Could not run coverage: {}", reason),
        CycleStatus::ReportMissing { reason } => warn!("{}", reason),
    }
}

fn clear_terminal() {
    use crossterm::{cursor::MoveTo, execute, terminal::{Clear, ClearType}};
    if let Err(e) = execute!(std::io::stderr(), Clear(ClearType::All), MoveTo(0, 0)) {
        debug!("Could not clear terminal: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{ChangeKind, FileChange};
    use chrono::Local;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::{mpsc, Semaphore};

    /// Records every cycle; each run waits for a permit or a cancel
    struct FakeRunner {
        started: mpsc::UnboundedSender<u64>,
        gate: Arc<Semaphore>,
        results: Mutex<Vec<CycleStatus>>,
    }

    impl FakeRunner {
        fn new(gate: Arc<Semaphore>, results: Vec<CycleStatus>) -> (Self, mpsc::UnboundedReceiver<u64>) {
            let (started, started_rx) = mpsc::unbounded_channel();
            (
                Self {
                    started,
                    gate,
                    results: Mutex::new(results),
                },
                started_rx,
            )
        }
    }

    #[async_trait::async_trait]
    impl CycleRunner for FakeRunner {
        async fn run(&self, cycle: u64, mut cancel: watch::Receiver<bool>) -> CycleOutcome {
            let _ = self.started.send(cycle);
            let status = tokio::select! {
                permit = self.gate.acquire() => {
                    permit.unwrap().forget();
                    let mut results = self.results.lock().unwrap();
                    if results.is_empty() { CycleStatus::Passed } else { results.remove(0) }
                }
                _ = raised(&mut cancel) => CycleStatus::Cancelled,
            };
            CycleOutcome {
                cycle,
                status,
                started_at: Local::now(),
                duration: Duration::from_millis(1),
                summary: None,
            }
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    fn batch(name: &str) -> ChangeBatch {
        ChangeBatch {
            changes: vec![FileChange {
                path: PathBuf::from(name),
                kind: ChangeKind::Modified,
            }],
        }
    }

    fn settings(initial_run: bool, on_busy: BusyPolicy) -> WatchSettings {
        WatchSettings {
            initial_run,
            on_busy,
            ..WatchSettings::default()
        }
    }

    async fn next_start(started: &mut mpsc::UnboundedReceiver<u64>) -> u64 {
        tokio::time::timeout(Duration::from_secs(2), started.recv())
            .await
            .expect("cycle should start")
            .expect("runner alive")
    }

    #[tokio::test]
    async fn test_initial_run_then_one_cycle_per_batch() {
        let gate = Arc::new(Semaphore::new(10));
        let (runner, mut started) = FakeRunner::new(gate, vec![]);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut session = WatchSession::new(runner, &settings(true, BusyPolicy::Queue), PathBuf::new());
        let handle = tokio::spawn(async move { session.run(batch_rx, shutdown_rx).await });

        assert_eq!(next_start(&mut started).await, 1);
        batch_tx.send(batch("a.rs")).unwrap();
        assert_eq!(next_start(&mut started).await, 2);
        batch_tx.send(batch("b.rs")).unwrap();
        assert_eq!(next_start(&mut started).await, 3);
        drop(batch_tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.passed, 3);
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_stop_the_loop() {
        let gate = Arc::new(Semaphore::new(10));
        let (runner, mut started) = FakeRunner::new(
            gate,
            vec![CycleStatus::Failed { code: Some(101) }, CycleStatus::Passed],
        );
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut session = WatchSession::new(runner, &settings(false, BusyPolicy::Queue), PathBuf::new());
        let handle = tokio::spawn(async move { session.run(batch_rx, shutdown_rx).await });

        batch_tx.send(batch("a.rs")).unwrap();
        assert_eq!(next_start(&mut started).await, 1);
        batch_tx.send(batch("a.rs")).unwrap();
        assert_eq!(next_start(&mut started).await, 2);
        drop(batch_tx);

        let stats = handle.await.unwrap();
        assert_eq!(
            stats,
            SessionStats {
                cycles: 2,
                passed: 1,
                failed: 1,
                cancelled: 0
            }
        );
    }

    #[tokio::test]
    async fn test_queue_policy_coalesces_changes_during_a_run() {
        let gate = Arc::new(Semaphore::new(0));
        let (runner, mut started) = FakeRunner::new(gate.clone(), vec![]);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut session = WatchSession::new(runner, &settings(true, BusyPolicy::Queue), PathBuf::new());
        let handle = tokio::spawn(async move { session.run(batch_rx, shutdown_rx).await });

        assert_eq!(next_start(&mut started).await, 1);
        batch_tx.send(batch("a.rs")).unwrap();
        batch_tx.send(batch("b.rs")).unwrap();
        batch_tx.send(batch("c.rs")).unwrap();
        drop(batch_tx);
        gate.add_permits(2);

        let stats = handle.await.unwrap();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.passed, 2);
        assert_eq!(next_start(&mut started).await, 2);
        assert!(started.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_policy_cancels_in_flight_run() {
        let gate = Arc::new(Semaphore::new(0));
        let (runner, mut started) = FakeRunner::new(gate.clone(), vec![]);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut session = WatchSession::new(runner, &settings(true, BusyPolicy::Restart), PathBuf::new());
        let handle = tokio::spawn(async move { session.run(batch_rx, shutdown_rx).await });

        assert_eq!(next_start(&mut started).await, 1);
        batch_tx.send(batch("a.rs")).unwrap();
        assert_eq!(next_start(&mut started).await, 2);
        drop(batch_tx);
        gate.add_permits(1);

        let stats = handle.await.unwrap();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.passed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_returns() {
        let gate = Arc::new(Semaphore::new(0));
        let (runner, mut started) = FakeRunner::new(gate, vec![]);
        let (_batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut session = WatchSession::new(runner, &settings(true, BusyPolicy::Queue), PathBuf::new());
        let handle = tokio::spawn(async move { session.run(batch_rx, shutdown_rx).await });

        assert_eq!(next_start(&mut started).await, 1);
        shutdown_tx.send(true).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("session should stop")
            .unwrap();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_idle() {
        let gate = Arc::new(Semaphore::new(0));
        let (runner, _started) = FakeRunner::new(gate, vec![]);
        let (_batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut session = WatchSession::new(runner, &settings(false, BusyPolicy::Queue), PathBuf::new());
        let handle = tokio::spawn(async move { session.run(batch_rx, shutdown_rx).await });

        shutdown_tx.send(true).unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("session should stop")
            .unwrap();
        assert_eq!(stats.cycles, 0);
    }
}
