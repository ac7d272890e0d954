//! Assets step - produces every asset the plan needs.

use async_trait::async_trait;

use crate::assets::RequestSet;
use crate::models::PipelineStage;
use crate::pipeline::errors::{StepError, StepResult};
use crate::pipeline::step::PipelineStep;
use crate::pipeline::types::{Context, EpisodeState, StepOutcome};

pub struct AssetsStep;

impl AssetsStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AssetsStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for AssetsStep {
    fn name(&self) -> &str {
        "Assets"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::AssetsGenerated
    }

    fn description(&self) -> &str {
        "Generate narration, voices, portraits, talking clips and visuals"
    }

    fn validate_input(&self, ctx: &Context, _state: &EpisodeState) -> StepResult<()> {
        if ctx.orchestrator.producer().store().root().as_os_str().is_empty() {
            return Err(StepError::precondition_failed("asset store has no root"));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, state: &mut EpisodeState) -> StepResult<StepOutcome> {
        let assets = ctx.orchestrator.generate_all(state.plan()).await;

        state.metrics.record_assets(&assets, false);
        ctx.logger.info(&format!(
            "{} assets: {} resolved, {} fallback, {} failed, {} reused",
            assets.len(),
            state.metrics.resolved,
            state.metrics.fallback,
            state.metrics.failed,
            state.metrics.reused
        ));
        state.snapshot.assets = assets;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        let missing: Vec<String> = RequestSet::derive(state.plan())
            .iter()
            .filter(|r| !state.snapshot.assets.contains_key(&r.id))
            .map(|r| r.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(StepError::invalid_output(format!(
                "no result for {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
