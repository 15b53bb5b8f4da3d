// file: src/runner/mod.rs
// version: 1.0.0
// guid: 0e702cf6-c1d5-4619-951b-f869337e56f4

//! Coverage cycle execution

pub mod process;
pub mod tool;

pub use process::{kill_running, ProcessRunner};
pub use tool::{required_programs, CommandSpec};

use crate::report::LcovSummary;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// How a single cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleStatus {
    Passed,
    /// Test run exited unsuccessfully; `code` is absent when killed by a signal
    Failed { code: Option<i32> },
    TimedOut,
    Cancelled,
    SpawnFailed { reason: String },
    ReportMissing { reason: String },
}

impl CycleStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleStatus::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CycleStatus::Passed => "PASS",
            CycleStatus::Failed { .. } => "FAIL",
            CycleStatus::TimedOut => "TIMEOUT",
            CycleStatus::Cancelled => "CANCELLED",
            CycleStatus::SpawnFailed { .. } => "ERROR",
            CycleStatus::ReportMissing { .. } => "NO REPORT",
        }
    }
}

/// Result of one coverage cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub cycle: u64,
    #[serde(flatten)]
    pub status: CycleStatus,
    pub started_at: DateTime<Local>,
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    pub summary: Option<LcovSummary>,
}

/// Runs one coverage cycle. `cancel` flips to `true` when the cycle should
/// stop early; implementations must reap everything they started before
/// returning.
#[async_trait::async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run(&self, cycle: u64, cancel: watch::Receiver<bool>) -> CycleOutcome;

    /// One-line description for startup logs
    fn describe(&self) -> String;
}

/// Resolve once the flag is raised. Never resolves if the sender is dropped
/// without raising it.
pub async fn raised(flag: &mut watch::Receiver<bool>) {
    loop {
        if *flag.borrow_and_update() {
            return;
        }
        if flag.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_flat_status() {
        let outcome = CycleOutcome {
            cycle: 3,
            status: CycleStatus::Failed { code: Some(101) },
            started_at: Local::now(),
            duration: Duration::from_millis(1500),
            summary: None,
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["cycle"], 3);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["code"], 101);
        assert_eq!(json["duration_ms"], 1500);
    }

    #[test]
    fn test_status_labels() {
        assert!(CycleStatus::Passed.is_success());
        assert!(!CycleStatus::TimedOut.is_success());
        assert_eq!(CycleStatus::Failed { code: None }.label(), "FAIL");
    }

    #[tokio::test]
    async fn test_raised_resolves_after_flag() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move {
            raised(&mut rx).await;
        });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_raised_pends_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let result = tokio::time::timeout(Duration::from_millis(50), raised(&mut rx)).await;
        assert!(result.is_err());
    }
}
