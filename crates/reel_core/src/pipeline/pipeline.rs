//! Pipeline runner that executes steps in sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::errors::{PipelineError, PipelineResult};
use super::step::PipelineStep;
use super::types::{Context, EpisodeState, StepOutcome};
use crate::checkpoint::CheckpointManager;
use crate::metrics::StepStatus;

/// Pipeline that runs a sequence of steps.
///
/// The pipeline executes steps in order, running validation before
/// and after each step. It handles cancellation, skips stages already
/// done by a resumed run, and checkpoints each completed stage.
pub struct Pipeline {
    /// Steps to execute in order.
    steps: Vec<Box<dyn PipelineStep>>,
    /// Cancellation flag.
    cancel: CancelHandle,
    checkpoints: Option<CheckpointManager>,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cancel: CancelHandle::new(),
            checkpoints: None,
        }
    }

    /// Add a step to the pipeline.
    pub fn add_step<S: PipelineStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Share an existing cancellation flag.
    pub fn with_cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    /// Save a checkpoint after every completed stage and clear it on success.
    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    /// Get a cancellation handle.
    ///
    /// Call `cancel()` on the returned handle to stop the pipeline
    /// at the next step boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the pipeline with the given context and state.
    ///
    /// Executes each step in order:
    /// 1. Check for cancellation
    /// 2. Skip the step if `state.stage` already covers it
    /// 3. Run `validate_input`
    /// 4. Run `execute`
    /// 5. Run `validate_output` (if execute returned Success)
    /// 6. Checkpoint the completed stage
    pub async fn run(
        &self,
        ctx: &Context,
        state: &mut EpisodeState,
    ) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult::default();
        let total_steps = self.steps.len();

        for (i, step) in self.steps.iter().enumerate() {
            if self.is_cancelled() {
                ctx.logger
                    .warn(&format!("Pipeline cancelled before step '{}'", step.name()));
                return Err(PipelineError::cancelled(&ctx.episode_id));
            }

            let step_name = step.name();

            if state.stage.is_some_and(|done| step.stage() <= done) {
                ctx.logger
                    .info(&format!("{} restored from checkpoint", step_name));
                state
                    .metrics
                    .record_step(step_name, StepStatus::Restored, Default::default());
                result.steps_restored.push(step_name.to_string());
                continue;
            }

            ctx.logger.phase(step_name);
            let percent = ((i as f64 / total_steps as f64) * 100.0) as u32;
            ctx.report_progress(step_name, percent, &format!("Starting {}", step_name));
            let started = Instant::now();

            ctx.logger.debug(&format!("Validating input for '{}'", step_name));
            if let Err(e) = step.validate_input(ctx, state) {
                ctx.logger.error(&format!("Input validation failed: {}", e));
                return Err(PipelineError::step_failed(&ctx.episode_id, step_name, e));
            }

            ctx.logger.debug(&format!("Executing '{}'", step_name));
            let outcome = step.execute(ctx, state).await.map_err(|e| {
                ctx.logger.error(&format!("Execution failed: {}", e));
                PipelineError::step_failed(&ctx.episode_id, step_name, e)
            })?;

            match outcome {
                StepOutcome::Success => {
                    ctx.logger
                        .debug(&format!("Validating output for '{}'", step_name));
                    if let Err(e) = step.validate_output(ctx, state) {
                        ctx.logger.error(&format!("Output validation failed: {}", e));
                        return Err(PipelineError::step_failed(&ctx.episode_id, step_name, e));
                    }

                    state
                        .metrics
                        .record_step(step_name, StepStatus::Completed, started.elapsed());
                    ctx.logger.success(&format!("{} completed", step_name));
                    result.steps_completed.push(step_name.to_string());

                    if step.checkpoints() {
                        state.stage = Some(step.stage());
                        self.save_checkpoint(ctx, state)?;
                    }
                }
                StepOutcome::Skipped(reason) => {
                    state
                        .metrics
                        .record_step(step_name, StepStatus::Skipped, started.elapsed());
                    ctx.logger.info(&format!("{} skipped: {}", step_name, reason));
                    result.steps_skipped.push(step_name.to_string());
                }
            }
        }

        if let Some(checkpoints) = &self.checkpoints {
            if let Err(e) = checkpoints.clear(&ctx.episode_id) {
                ctx.logger
                    .warn(&format!("Could not clear checkpoint: {}", e));
            }
        }

        ctx.report_progress("Complete", 100, "Pipeline finished");
        ctx.logger.success("Pipeline completed successfully");

        Ok(result)
    }

    fn save_checkpoint(&self, ctx: &Context, state: &EpisodeState) -> PipelineResult<()> {
        let (Some(checkpoints), Some(stage)) = (&self.checkpoints, state.stage) else {
            return Ok(());
        };
        checkpoints
            .save(&ctx.episode_id, stage, &state.snapshot)
            .map_err(|e| {
                ctx.logger.error(&format!("Checkpoint save failed: {}", e));
                PipelineError::checkpoint(&ctx.episode_id, e)
            })?;
        ctx.logger.info(&format!("Checkpoint saved at stage {}", stage));
        Ok(())
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared stop flag, checked before each step.
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    ///
    /// The step in flight finishes; nothing after it starts.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Which steps did what during one `run`.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunResult {
    /// Ran and passed output validation.
    pub steps_completed: Vec<String>,
    /// Ran but reported nothing to do.
    pub steps_skipped: Vec<String>,
    /// Steps covered by the checkpoint this run resumed from.
    pub steps_restored: Vec<String>,
}

impl PipelineRunResult {
    /// Check if all steps completed (none skipped or restored).
    pub fn all_completed(&self) -> bool {
        self.steps_skipped.is_empty() && self.steps_restored.is_empty()
    }

    /// Completed, skipped and restored together.
    pub fn total_steps(&self) -> usize {
        self.steps_completed.len() + self.steps_skipped.len()
    }
}
