//! Core types for the episode pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use crate::assets::AssetOrchestrator;
use crate::checkpoint::EpisodeSnapshot;
use crate::config::Settings;
use crate::logging::EpisodeLogger;
use crate::metrics::RenderMetrics;
use crate::models::{PipelineStage, VideoPlan};
use crate::providers::Publisher;
use crate::reconcile::Reconciliation;
use crate::render::RenderEncoder;
use crate::timeline::Timeline;

/// Receives `(step, percent, message)` as the episode advances.
pub type ProgressCallback = Arc<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Collaborators shared by every step of one episode.
///
/// Steps only read this; anything they produce goes in `EpisodeState`.
pub struct Context {
    pub settings: Settings,
    pub episode_id: String,
    /// Episode working directory; relative configured folders resolve here.
    pub work_dir: PathBuf,
    /// Folder the rendered video is written to.
    pub output_dir: PathBuf,
    /// Per-episode logger.
    pub logger: Arc<EpisodeLogger>,
    pub orchestrator: Arc<AssetOrchestrator>,
    pub encoder: Arc<dyn RenderEncoder>,
    pub publisher: Option<Arc<dyn Publisher>>,
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        episode_id: impl Into<String>,
        work_dir: PathBuf,
        output_dir: PathBuf,
        logger: Arc<EpisodeLogger>,
        orchestrator: Arc<AssetOrchestrator>,
        encoder: Arc<dyn RenderEncoder>,
        publisher: Option<Arc<dyn Publisher>>,
    ) -> Self {
        Self {
            settings,
            episode_id: episode_id.into(),
            work_dir,
            output_dir,
            logger,
            orchestrator,
            encoder,
            publisher,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    /// Forward to the progress callback, if any.
    pub fn report_progress(&self, step_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(step_name, percent, message);
        }
    }
}

/// Mutable episode state that accumulates results from pipeline steps.
///
/// `snapshot` is what gets checkpointed. The reconciliation and timeline
/// are cheap to rebuild and are never persisted.
#[derive(Debug, Clone)]
pub struct EpisodeState {
    pub episode_id: String,
    /// When this run started.
    pub started_at: String,
    pub snapshot: EpisodeSnapshot,
    /// Last stage completed, by this run or the one it resumed.
    pub stage: Option<PipelineStage>,
    pub reconciliation: Option<Reconciliation>,
    pub timeline: Option<Timeline>,
    pub metrics: RenderMetrics,
}

impl EpisodeState {
    /// Fresh state for a plan.
    pub fn new(plan: VideoPlan) -> Self {
        Self {
            episode_id: plan.episode_id.clone(),
            started_at: chrono::Local::now().to_rfc3339(),
            snapshot: EpisodeSnapshot::new(plan),
            stage: None,
            reconciliation: None,
            timeline: None,
            metrics: RenderMetrics::default(),
        }
    }

    /// State restored from a checkpoint taken after `stage`.
    pub fn resumed(plan: VideoPlan, stage: PipelineStage, snapshot: EpisodeSnapshot) -> Self {
        let mut state = Self::new(plan.clone());
        state.snapshot = EpisodeSnapshot { plan, ..snapshot };
        state.stage = Some(stage);
        state.metrics.resumed_from = Some(stage);
        if stage >= PipelineStage::AssetsGenerated {
            state.metrics.record_assets(&state.snapshot.assets, true);
        }
        state
    }

    pub fn plan(&self) -> &VideoPlan {
        &self.snapshot.plan
    }

    pub fn has_assets(&self) -> bool {
        !self.snapshot.assets.is_empty()
    }

    pub fn has_timeline(&self) -> bool {
        self.timeline.is_some()
    }
}

/// Result of a step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step did its work.
    Success,
    /// Step was skipped (with reason).
    Skipped(String),
}
