use std::fmt;

use serde::{Deserialize, Serialize};

use super::item::{ItemRun, TaskOutcome};
use crate::error::BatchError;

/// Lifecycle of one archive within a batch.
///
/// ```text
/// Pending -> Skipped
/// Pending -> Running -> Succeeded | Failed | TimedOut
/// TimedOut -> Retrying -> RetrySucceeded | RetryFailed
/// ```
///
/// `Retrying` is only reachable from `TimedOut`, and no state leads back to
/// `TimedOut` from `Retrying`, so an item is retried at most once and only
/// after a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Skipped,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Retrying,
    RetrySucceeded,
    RetryFailed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemState::Skipped
                | ItemState::Succeeded
                | ItemState::Failed
                | ItemState::RetrySucceeded
                | ItemState::RetryFailed
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Pending => write!(f, "PENDING"),
            ItemState::Skipped => write!(f, "SKIPPED"),
            ItemState::Running => write!(f, "RUNNING"),
            ItemState::Succeeded => write!(f, "SUCCEEDED"),
            ItemState::Failed => write!(f, "FAILED"),
            ItemState::TimedOut => write!(f, "TIMED_OUT"),
            ItemState::Retrying => write!(f, "RETRYING"),
            ItemState::RetrySucceeded => write!(f, "RETRY_SUCCEEDED"),
            ItemState::RetryFailed => write!(f, "RETRY_FAILED"),
        }
    }
}

/// Something that happened to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Prior output was found; nothing to do.
    Skip,
    /// The decompiler is about to be launched for this item.
    Start,
    /// The decompiler attempt finished.
    Finish(TaskOutcome),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Skip => write!(f, "skip"),
            Event::Start => write!(f, "start"),
            Event::Finish(outcome) => write!(f, "finish ({outcome})"),
        }
    }
}

/// The result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved to a non-terminal state (`Running` or `Retrying`).
    Next(ItemState),
    /// First attempt timed out; the item waits for the retry pass.
    ScheduleRetry,
    /// The item reached a terminal state.
    Complete(ItemState),
}

/// Drives an [`ItemRun`] through [`ItemState`].
pub struct StateMachine;

impl StateMachine {
    /// Apply `event` to `run`, recording the previous state in its history.
    ///
    /// `Start` bumps the attempt counter. A `Failed` outcome stores its
    /// diagnostic on the run; a later success clears it. Events that do not
    /// fit the current state are rejected and leave the run untouched.
    pub fn next(run: &mut ItemRun, event: Event) -> Result<Transition, BatchError> {
        use ItemState::*;

        let resolved = match (run.state, &event) {
            (Pending, Event::Skip) => Some((Skipped, Transition::Complete(Skipped))),
            (Pending, Event::Start) => Some((Running, Transition::Next(Running))),
            (TimedOut, Event::Start) => Some((Retrying, Transition::Next(Retrying))),
            (Running, Event::Finish(outcome)) => Some(match outcome {
                TaskOutcome::Succeeded => (Succeeded, Transition::Complete(Succeeded)),
                TaskOutcome::Failed { .. } => (Failed, Transition::Complete(Failed)),
                TaskOutcome::TimedOut => (TimedOut, Transition::ScheduleRetry),
            }),
            (Retrying, Event::Finish(outcome)) => Some(match outcome {
                TaskOutcome::Succeeded => (RetrySucceeded, Transition::Complete(RetrySucceeded)),
                TaskOutcome::Failed { .. } | TaskOutcome::TimedOut => {
                    (RetryFailed, Transition::Complete(RetryFailed))
                }
            }),
            _ => None,
        };

        let Some((to, transition)) = resolved else {
            return Err(BatchError::InvalidTransition {
                item: run.item.id.clone(),
                from: run.state,
                event,
            });
        };

        match event {
            Event::Start => run.attempts += 1,
            Event::Finish(TaskOutcome::Failed { diagnostic }) => run.diagnostic = Some(diagnostic),
            Event::Finish(TaskOutcome::Succeeded) => run.diagnostic = None,
            Event::Finish(TaskOutcome::TimedOut) | Event::Skip => {}
        }

        run.state_history.push(run.state);
        run.state = to;
        Ok(transition)
    }
}
