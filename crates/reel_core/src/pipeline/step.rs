//! The unit of work the episode pipeline runs.
//!
//! Every step is checked before and after it runs, so a failure names
//! the step and whether its inputs or its outputs were at fault.

use async_trait::async_trait;

use super::errors::StepResult;
use super::types::{Context, EpisodeState, StepOutcome};
use crate::models::PipelineStage;

/// One stage of an episode.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input`: the state holds what the step needs
/// 2. `execute`: do the work, mutating the state
/// 3. `validate_output`: the state now holds what later steps need
///
/// Each step belongs to a `PipelineStage`. When an episode resumes from a
/// checkpoint, steps whose stage is at or before the checkpointed one are
/// not run again.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Short name used in logs, metrics and errors.
    fn name(&self) -> &str;

    /// The stage this step's work belongs to.
    fn stage(&self) -> PipelineStage;

    /// Whether finishing this step completes its stage and is checkpointed.
    ///
    /// Steps whose output is cheap to recompute return `false`.
    fn checkpoints(&self) -> bool {
        true
    }

    /// Reject the run before any side effects.
    fn validate_input(&self, ctx: &Context, state: &EpisodeState) -> StepResult<()>;

    /// Execute the step's main work and record results in `state`.
    ///
    /// Returns `StepOutcome::Skipped` if the step decided it has nothing
    /// to do (not an error).
    async fn execute(&self, ctx: &Context, state: &mut EpisodeState) -> StepResult<StepOutcome>;

    /// Check what `execute` left behind.
    ///
    /// Called after `execute` returns `Success`.
    fn validate_output(&self, ctx: &Context, state: &EpisodeState) -> StepResult<()>;

    /// Failures of optional steps are logged and the run continues.
    fn is_optional(&self) -> bool {
        false
    }

    /// One line for progress displays.
    fn description(&self) -> &str {
        self.name()
    }
}
