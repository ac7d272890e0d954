//! Staged episode pipeline.
//!
//! An episode runs as a sequence of steps, each belonging to a
//! `PipelineStage`. After every completed stage the episode snapshot is
//! checkpointed, so an interrupted run resumes at the next stage.
//!
//! # Stages
//!
//! ```text
//! Pipeline
//!     ├── Step: Plan      → PlanBuilt
//!     ├── Step: Assets    → AssetsGenerated
//!     ├── Step: Compose   (reconcile + timeline, not checkpointed)
//!     ├── Step: Render    → Rendered
//!     └── Step: Publish   → Uploaded (optional)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use reel_core::pipeline::{create_episode_pipeline, EpisodeState};
//!
//! let pipeline = create_episode_pipeline().with_checkpoints(checkpoints);
//! let mut state = EpisodeState::new(plan);
//! let result = pipeline.run(&ctx, &mut state).await?;
//! assert!(result.all_completed());
//! ```

mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{AssetsStep, ComposeStep, PlanStep, PublishStep, RenderStep};
pub use types::{Context, EpisodeState, ProgressCallback, StepOutcome};

/// Create the standard episode pipeline with all steps in order.
///
/// 1. Plan - validate the plan, create output folders
/// 2. Assets - fan out every generation request
/// 3. Compose - reconcile durations and build the timeline
/// 4. Render - encode the timeline
/// 5. Publish - upload, when a publisher is configured
pub fn create_episode_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(PlanStep::new())
        .with_step(AssetsStep::new())
        .with_step(ComposeStep::new())
        .with_step(RenderStep::new())
        .with_step(PublishStep::new())
}
