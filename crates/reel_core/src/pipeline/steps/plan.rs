//! Plan step - checks the plan and prepares the episode folders.

use std::fs;

use async_trait::async_trait;

use crate::models::PipelineStage;
use crate::pipeline::errors::{StepError, StepResult};
use crate::pipeline::step::PipelineStep;
use crate::pipeline::types::{Context, EpisodeState, StepOutcome};

pub struct PlanStep;

impl PlanStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlanStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for PlanStep {
    fn name(&self) -> &str {
        "Plan"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::PlanBuilt
    }

    fn description(&self) -> &str {
        "Validate the plan and create output folders"
    }

    fn validate_input(&self, ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        if state.plan().episode_id != ctx.episode_id {
            return Err(StepError::invalid_input(format!(
                "plan is for episode '{}', context for '{}'",
                state.plan().episode_id,
                ctx.episode_id
            )));
        }
        state
            .plan()
            .validate()
            .map_err(|e| StepError::invalid_input(e.to_string()))
    }

    async fn execute(&self, ctx: &Context, state: &mut EpisodeState) -> StepResult<StepOutcome> {
        fs::create_dir_all(&ctx.output_dir)
            .map_err(|e| StepError::io_error("create output folder", e))?;

        let plan = state.plan();
        ctx.logger.info(&format!(
            "'{}': {} scenes, {} spoken lines, {} characters, target {:.1}s, pattern {}",
            plan.title,
            plan.scenes.len(),
            plan.spoken_lines.len(),
            plan.characters.len(),
            plan.target_runtime_secs,
            plan.edit_pattern
        ));
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, _state: &EpisodeState) -> StepResult<()> {
        if !ctx.output_dir.is_dir() {
            return Err(StepError::invalid_output(format!(
                "output folder {} was not created",
                ctx.output_dir.display()
            )));
        }
        Ok(())
    }
}
