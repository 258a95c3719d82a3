use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::BatchError;
use crate::oracle::CompletionOracle;
use crate::report::{BatchReport, RunTally};
use crate::runner::TaskRunner;
use crate::state_machine::{Event, ItemRun, ItemState, StateMachine, discover};
use crate::ui::BatchConsole;

/// Where a batch reads from and writes to.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub tool_path: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub input_extension: String,
}

/// Runs every archive once, then retries the ones that timed out.
///
/// Items are processed one at a time in identifier order; the retry pass
/// starts only after the first pass has visited every item.
pub struct BatchOrchestrator<R> {
    runner: R,
    oracle: CompletionOracle,
    console: BatchConsole,
}

impl<R: TaskRunner> BatchOrchestrator<R> {
    pub fn new(runner: R, oracle: CompletionOracle, console: BatchConsole) -> Self {
        Self {
            runner,
            oracle,
            console,
        }
    }

    /// Run the whole batch and return its report.
    ///
    /// A missing input directory, a missing or unlaunchable tool, or an input
    /// directory without archives aborts before anything runs. Per-item failures never
    /// abort the batch; they end up in the tally.
    pub async fn run_batch(&self, plan: &BatchPlan) -> Result<BatchReport, BatchError> {
        if !plan.input_dir.is_dir() {
            return Err(BatchError::InputDirNotFound(plan.input_dir.clone()));
        }
        if !plan.tool_path.exists() {
            return Err(BatchError::ToolNotFound(plan.tool_path.clone()));
        }
        self.runner.check_launchable()?;

        std::fs::create_dir_all(&plan.output_dir)?;

        let items = discover(&plan.input_dir, &plan.input_extension)?;
        if items.is_empty() {
            return Err(BatchError::NoInputs {
                dir: plan.input_dir.clone(),
                extension: plan.input_extension.clone(),
            });
        }

        let deadline = self.runner.deadline();
        info!(
            count = items.len(),
            input = %plan.input_dir.display(),
            output = %plan.output_dir.display(),
            deadline_secs = deadline.as_secs(),
            "discovered archives"
        );

        let started_at = Utc::now();
        self.console.header(items.len(), &plan.output_dir, deadline);

        let mut tally = RunTally::new(items.len());
        let mut runs: Vec<ItemRun> = items.into_iter().map(ItemRun::new).collect();

        for run in &mut runs {
            if self.oracle.is_already_done(&run.item, &plan.output_dir) {
                debug!(item = %run.item.id, "prior output found; skipping");
                let t = StateMachine::next(run, Event::Skip)?;
                tally.record(&run.item, t);
                self.console.skipped(&run.item);
                continue;
            }
            self.attempt(run, &mut tally).await?;
        }

        if !tally.pending_retry.is_empty() {
            info!(count = tally.pending_retry.len(), "retrying timed-out archives");
            self.console.retry_pass(tally.pending_retry.len());
            for run in runs.iter_mut().filter(|r| r.state == ItemState::TimedOut) {
                self.attempt(run, &mut tally).await?;
            }
        }

        debug_assert!(runs.iter().all(|r| r.state.is_terminal()));
        debug_assert!(tally.pending_retry.is_empty());
        debug_assert!(tally.is_balanced());

        info!(%tally, "batch finished");
        self.console.summary(&tally, &plan.output_dir);

        Ok(BatchReport::new(
            &plan.output_dir,
            deadline.as_secs(),
            started_at,
            tally,
            &runs,
        ))
    }

    async fn attempt(&self, run: &mut ItemRun, tally: &mut RunTally) -> Result<(), BatchError> {
        let t = StateMachine::next(run, Event::Start)?;
        tally.record(&run.item, t);

        let retry = run.state == ItemState::Retrying;
        let progress = self.console.start(&run.item, retry);
        let clock = Instant::now();
        let outcome = self.runner.run(&run.item).await;
        run.elapsed += clock.elapsed();
        progress.complete(&outcome, self.runner.deadline());

        info!(item = %run.item.id, attempt = run.attempts, %outcome, "attempt finished");
        let t = StateMachine::next(run, Event::Finish(outcome))?;
        tally.record(&run.item, t);
        Ok(())
    }
}
