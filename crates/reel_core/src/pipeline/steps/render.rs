//! Render step - encodes the composed timeline into the final video.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::logging::sanitize_filename;
use crate::models::PipelineStage;
use crate::pipeline::errors::{StepError, StepResult};
use crate::pipeline::step::PipelineStep;
use crate::pipeline::types::{Context, EpisodeState, StepOutcome};

pub struct RenderStep;

impl RenderStep {
    pub fn new() -> Self {
        Self
    }

    /// `<output_dir>/<episode>.mp4`
    fn output_path(ctx: &Context) -> PathBuf {
        ctx.output_dir
            .join(format!("{}.mp4", sanitize_filename(&ctx.episode_id)))
    }
}

impl Default for RenderStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for RenderStep {
    fn name(&self) -> &str {
        "Render"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Rendered
    }

    fn description(&self) -> &str {
        "Encode the timeline to a 1080x1920 video"
    }

    fn validate_input(&self, _ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        if !state.has_timeline() {
            return Err(StepError::precondition_failed("no timeline composed"));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, state: &mut EpisodeState) -> StepResult<StepOutcome> {
        let timeline = state
            .timeline
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("no timeline composed"))?;
        // A resumed run skips the plan step that normally creates this
        std::fs::create_dir_all(&ctx.output_dir)
            .map_err(|e| StepError::io_error("create output folder", e))?;
        let output = Self::output_path(ctx);

        ctx.logger.info(&format!(
            "Encoding {} layers with {} to {}",
            timeline.layers.len(),
            ctx.encoder.name(),
            output.display()
        ));
        let written = ctx.encoder.encode(timeline, &output).await?;

        state.snapshot.video_path = Some(written);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        match &state.snapshot.video_path {
            Some(path) if path.is_file() => Ok(()),
            Some(path) => Err(StepError::file_not_found(path.display().to_string())),
            None => Err(StepError::invalid_output("video path not recorded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::narration_only_plan;
    use crate::pipeline::testing::{test_context, FakeEncoder};
    use crate::timeline::{AudioSegment, AudioSource, CompositeAudio, Timeline};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn tiny_timeline() -> Timeline {
        Timeline {
            episode_id: "ep-test".into(),
            width: 1080,
            height: 1920,
            final_duration_secs: 1.0,
            layers: Vec::new(),
            audio: CompositeAudio {
                segments: vec![AudioSegment {
                    start_secs: 0.0,
                    duration_secs: 1.0,
                    source: AudioSource::Silence,
                    offset_secs: 0.0,
                    line: None,
                }],
            },
        }
    }

    #[tokio::test]
    async fn records_the_encoded_file() {
        let dir = tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let mut ctx = test_context(dir.path());
        ctx.encoder = encoder.clone();

        let mut state = EpisodeState::new(narration_only_plan(1, 1.0));
        state.timeline = Some(tiny_timeline());

        RenderStep.validate_input(&ctx, &state).unwrap();
        RenderStep.execute(&ctx, &mut state).await.unwrap();
        RenderStep.validate_output(&ctx, &state).unwrap();

        let path = state.snapshot.video_path.unwrap();
        assert!(path.ends_with("ep-test.mp4"));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn needs_a_timeline() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let state = EpisodeState::new(narration_only_plan(1, 1.0));
        assert!(matches!(
            RenderStep.validate_input(&ctx, &state),
            Err(StepError::PreconditionFailed(_))
        ));
    }
}
