//! Compose step - reconciles durations and lays out the timeline.
//!
//! Not checkpointed: it is pure over the plan and the asset map, so a
//! resumed run simply composes again.

use async_trait::async_trait;

use crate::assets::speaking_time;
use crate::models::{AssetKind, AssetMap, PipelineStage, VideoPlan};
use crate::pipeline::errors::{StepError, StepResult};
use crate::pipeline::step::PipelineStep;
use crate::pipeline::types::{Context, EpisodeState, StepOutcome};
use crate::reconcile::{DurationAction, DurationReconciler};
use crate::timeline::TimelineComposer;

pub struct ComposeStep;

impl ComposeStep {
    pub fn new() -> Self {
        Self
    }

    /// Measured narration length, or the speaking-rate estimate when the
    /// narration result carries no duration.
    fn narration_secs(plan: &VideoPlan, assets: &AssetMap) -> f64 {
        assets
            .get(&AssetKind::NarrationAudio.request_id())
            .and_then(|r| r.usable_file())
            .and_then(|f| f.duration_secs)
            .filter(|d| *d > 0.0)
            .unwrap_or_else(|| speaking_time(&plan.narration_text()))
    }
}

impl Default for ComposeStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for ComposeStep {
    fn name(&self) -> &str {
        "Compose"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Rendered
    }

    fn checkpoints(&self) -> bool {
        false
    }

    fn description(&self) -> &str {
        "Fit narration to the target runtime and build the layer timeline"
    }

    fn validate_input(&self, _ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        if !state.has_assets() {
            return Err(StepError::precondition_failed("no assets generated"));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, state: &mut EpisodeState) -> StepResult<StepOutcome> {
        let plan = state.plan();
        let narration = Self::narration_secs(plan, &state.snapshot.assets);

        let reconciliation = DurationReconciler::new(&ctx.settings.timing).reconcile(
            narration,
            plan.target_runtime_secs,
            &plan.scene_weights(),
        )?;
        let action = match reconciliation.action {
            DurationAction::Accept => "accepted".to_string(),
            DurationAction::Extend { mode, by_secs } => {
                format!("extended by {:.2}s ({:?})", by_secs, mode)
            }
            DurationAction::Trim { by_secs } => format!("trimmed by {:.2}s", by_secs),
        };
        ctx.logger.info(&format!(
            "Narration {:.2}s vs target {:.2}s: {}, final {:.2}s",
            reconciliation.narration_secs,
            reconciliation.target_secs,
            action,
            reconciliation.final_secs
        ));
        if reconciliation.even_split {
            ctx.logger
                .warn("Scene floor could not be honoured; scenes split evenly");
        }

        let timeline = TimelineComposer::from_settings(&ctx.settings).compose(
            plan,
            &reconciliation,
            &state.snapshot.assets,
        )?;
        ctx.logger.info(&format!(
            "Timeline: {} layers, {} audio segments, {:.2}s ({})",
            timeline.layers.len(),
            timeline.audio.segments.len(),
            timeline.total_secs(),
            plan.edit_pattern
        ));

        state.metrics.record_timeline(&timeline);
        state.reconciliation = Some(reconciliation);
        state.timeline = Some(timeline);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        match &state.timeline {
            Some(timeline) if !timeline.layers.is_empty() => Ok(()),
            Some(_) => Err(StepError::invalid_output("timeline has no layers")),
            None => Err(StepError::invalid_output("timeline not recorded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::narration_only_plan;
    use crate::models::{AssetFile, AssetOutcome, AssetResult, MediaKind};
    use crate::pipeline::testing::test_context;
    use tempfile::tempdir;

    fn narration(secs: Option<f64>) -> AssetMap {
        let mut file = AssetFile::new("narration.wav", MediaKind::Audio);
        file.duration_secs = secs;
        let result = AssetResult {
            request_id: "narration".into(),
            kind: AssetKind::NarrationAudio,
            outcome: AssetOutcome::Resolved { file },
            attempts: 1,
            quality_score: None,
            elapsed_ms: 1,
            reused: false,
        };
        [(result.request_id.clone(), result)].into_iter().collect()
    }

    #[test]
    fn narration_length_falls_back_to_estimate() {
        let plan = narration_only_plan(2, 30.0);
        assert_eq!(ComposeStep::narration_secs(&plan, &narration(Some(27.5))), 27.5);
        assert_eq!(
            ComposeStep::narration_secs(&plan, &narration(None)),
            speaking_time(&plan.narration_text())
        );
    }

    #[tokio::test]
    async fn composes_with_only_narration_available() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let mut state = EpisodeState::new(narration_only_plan(3, 30.0));
        state.snapshot.assets = narration(Some(30.0));

        ComposeStep.validate_input(&ctx, &state).unwrap();
        ComposeStep.execute(&ctx, &mut state).await.unwrap();
        ComposeStep.validate_output(&ctx, &state).unwrap();

        let timeline = state.timeline.as_ref().unwrap();
        assert!((timeline.total_secs() - 30.0).abs() <= 0.3);
        assert_eq!(state.metrics.layer_count, timeline.layers.len());
        assert_eq!(state.reconciliation.as_ref().unwrap().action, DurationAction::Accept);
    }

    #[tokio::test]
    async fn impossible_reconciliation_is_a_step_error() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let mut plan = narration_only_plan(2, 30.0);
        plan.target_runtime_secs = 0.0;
        let mut state = EpisodeState::new(plan);
        state.snapshot.assets = narration(Some(10.0));

        let err = ComposeStep.execute(&ctx, &mut state).await.unwrap_err();
        assert!(matches!(err, StepError::Reconcile(_)));
    }
}
