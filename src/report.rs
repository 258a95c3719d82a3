//! Batch counters and the JSON run report.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BatchError;
use crate::state_machine::{Item, ItemRun, ItemState, Transition};

/// Counters for one batch run, owned by the orchestrator.
///
/// `succeeded + failed + skipped == total` once every item has been through
/// the first pass, and the retry pass only moves counts from `failed` to
/// `succeeded`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items that timed out first and then succeeded on retry.
    pub retried: usize,
    pub skipped: usize,
    /// Items whose first attempt timed out, however the retry ended.
    pub timed_out: usize,
    /// Timed-out items still waiting for their retry, in discovery order.
    pub pending_retry: Vec<Item>,
}

impl RunTally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Fold one state transition of `item` into the counters.
    pub fn record(&mut self, item: &Item, transition: Transition) {
        match transition {
            Transition::Next(_) => {}
            Transition::ScheduleRetry => {
                self.failed += 1;
                self.timed_out += 1;
                self.pending_retry.push(item.clone());
            }
            Transition::Complete(ItemState::Skipped) => self.skipped += 1,
            Transition::Complete(ItemState::Succeeded) => self.succeeded += 1,
            Transition::Complete(ItemState::Failed) => self.failed += 1,
            Transition::Complete(ItemState::RetrySucceeded) => {
                debug_assert!(self.failed > 0, "retry success without a prior timeout");
                self.succeeded += 1;
                self.retried += 1;
                self.failed -= 1;
                self.pending_retry.retain(|pending| pending != item);
            }
            Transition::Complete(ItemState::RetryFailed) => {
                self.pending_retry.retain(|pending| pending != item);
            }
            Transition::Complete(_) => {}
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.succeeded + self.failed + self.skipped == self.total
    }
}

impl fmt::Display for RunTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded {}, failed {}, retried {}, skipped {}, timed out {}",
            self.succeeded, self.failed, self.retried, self.skipped, self.timed_out
        )
    }
}

/// Final record of one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub source: PathBuf,
    pub state: ItemState,
    pub state_transitions: Vec<ItemState>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub duration_ms: u64,
}

impl ItemRecord {
    pub fn from_run(run: &ItemRun) -> Self {
        let mut transitions = run.state_history.clone();
        transitions.push(run.state);
        Self {
            id: run.item.id.clone(),
            source: run.item.source.clone(),
            state: run.state,
            state_transitions: transitions,
            attempts: run.attempts,
            diagnostic: run.diagnostic.clone(),
            duration_ms: u64::try_from(run.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Everything known about a finished batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub output_dir: PathBuf,
    pub deadline_secs: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub tally: RunTally,
    pub items: Vec<ItemRecord>,
}

impl BatchReport {
    pub fn new(
        output_dir: &Path,
        deadline_secs: u64,
        started_at: DateTime<Utc>,
        tally: RunTally,
        runs: &[ItemRun],
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            output_dir: output_dir.to_path_buf(),
            deadline_secs,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            tally,
            items: runs.iter().map(ItemRecord::from_run).collect(),
        }
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), BatchError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
