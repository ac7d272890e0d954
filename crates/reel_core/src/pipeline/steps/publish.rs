//! Publish step - hands the rendered video to the upload boundary.

use async_trait::async_trait;

use crate::models::PipelineStage;
use crate::pipeline::errors::{StepError, StepResult};
use crate::pipeline::step::PipelineStep;
use crate::pipeline::types::{Context, EpisodeState, StepOutcome};

pub struct PublishStep;

impl PublishStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PublishStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for PublishStep {
    fn name(&self) -> &str {
        "Publish"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Uploaded
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn validate_input(&self, _ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        match &state.snapshot.video_path {
            Some(path) if path.is_file() => Ok(()),
            Some(path) => Err(StepError::file_not_found(path.display().to_string())),
            None => Err(StepError::precondition_failed("no rendered video")),
        }
    }

    async fn execute(&self, ctx: &Context, state: &mut EpisodeState) -> StepResult<StepOutcome> {
        let Some(publisher) = &ctx.publisher else {
            return Ok(StepOutcome::Skipped("no publisher configured".to_string()));
        };
        let Some(video) = state.snapshot.video_path.clone() else {
            return Err(StepError::precondition_failed("no rendered video"));
        };

        let id = publisher
            .publish(&video, state.plan())
            .await
            .map_err(StepError::Publish)?;
        ctx.logger.info(&format!("Published as {}", id));
        state.snapshot.publish_id = Some(id);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &EpisodeState) -> StepResult<()> {
        if state.snapshot.publish_id.as_deref().map_or(true, str::is_empty) {
            return Err(StepError::invalid_output("publisher returned no id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::narration_only_plan;
    use crate::models::VideoPlan;
    use crate::pipeline::testing::test_context;
    use crate::providers::{ProviderError, ProviderResult, Publisher};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FixedPublisher(Option<&'static str>);

    #[async_trait]
    impl Publisher for FixedPublisher {
        async fn publish(&self, _video: &Path, plan: &VideoPlan) -> ProviderResult<String> {
            match self.0 {
                Some(prefix) => Ok(format!("{}-{}", prefix, plan.episode_id)),
                None => Err(ProviderError::Unavailable("quota exhausted".into())),
            }
        }
    }

    fn rendered_state(dir: &Path) -> EpisodeState {
        let video = dir.join("ep-test.mp4");
        std::fs::write(&video, b"video").unwrap();
        let mut state = EpisodeState::new(narration_only_plan(1, 5.0));
        state.snapshot.video_path = Some(video);
        state
    }

    #[tokio::test]
    async fn skipped_without_a_publisher() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let mut state = rendered_state(dir.path());

        let outcome = PublishStep.execute(&ctx, &mut state).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped(_)));
        assert!(state.snapshot.publish_id.is_none());
    }

    #[tokio::test]
    async fn records_the_publish_id() {
        let dir = tempdir().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.publisher = Some(Arc::new(FixedPublisher(Some("yt"))));
        let mut state = rendered_state(dir.path());

        PublishStep.validate_input(&ctx, &state).unwrap();
        PublishStep.execute(&ctx, &mut state).await.unwrap();
        PublishStep.validate_output(&ctx, &state).unwrap();
        assert_eq!(state.snapshot.publish_id.as_deref(), Some("yt-ep-test"));
    }

    #[tokio::test]
    async fn publisher_errors_surface() {
        let dir = tempdir().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.publisher = Some(Arc::new(FixedPublisher(None)));
        let mut state = rendered_state(dir.path());

        let err = PublishStep.execute(&ctx, &mut state).await.unwrap_err();
        assert!(matches!(err, StepError::Publish(_)));
    }
}
