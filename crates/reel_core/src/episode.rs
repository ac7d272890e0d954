//! Episode runner: the crate's entry point.
//!
//! Wires settings, providers, the rate governor, the asset orchestrator and
//! the encoder into a pipeline run for one plan, with checkpoint-based
//! resume.
//!
//! # Example
//!
//! ```ignore
//! use reel_core::episode::EpisodeRunner;
//! use reel_core::providers::Providers;
//!
//! let runner = EpisodeRunner::new(settings.clone(), Providers::from_settings(&settings.providers));
//! let output = runner.resume_episode(&plan, Path::new("/var/reel/ep-42")).await?;
//! println!("{} ({})", output.video_path.display(), output.metrics.summary());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::assets::{AssetOrchestrator, AssetProducer, AssetStore, FallbackLibrary, RetryPolicy};
use crate::checkpoint::{
    CheckpointManager, CheckpointRecord, CheckpointStore, EpisodeSnapshot, FileCheckpointStore,
};
use crate::config::Settings;
use crate::governor::RateGovernor;
use crate::logging::{EpisodeLogger, LogConfig};
use crate::metrics::RenderMetrics;
use crate::models::{AssetMap, PipelineStage, VideoPlan};
use crate::pipeline::{
    create_episode_pipeline, CancelHandle, Context, EpisodeState, PipelineError, PipelineResult,
    ProgressCallback,
};
use crate::providers::Providers;
use crate::quality::QualityGate;
use crate::render::{FfmpegEncoder, RenderEncoder};
use crate::timeline::Timeline;

/// Where a run picks up: the last completed stage and its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub stage: PipelineStage,
    pub snapshot: EpisodeSnapshot,
}

impl From<CheckpointRecord> for ResumePoint {
    fn from(record: CheckpointRecord) -> Self {
        Self {
            stage: record.stage,
            snapshot: record.snapshot,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EpisodeOutput {
    pub video_path: PathBuf,
    pub metrics: RenderMetrics,
    /// Every request's result, produced or restored.
    pub assets: AssetMap,
    /// None when the run resumed after rendering.
    pub timeline: Option<Timeline>,
    /// Platform id, when a publisher uploaded the video.
    pub publish_id: Option<String>,
}

/// Runs episodes. Runners share no mutable state with each other; the
/// rate governor belongs to the runner and spans all of its runs.
pub struct EpisodeRunner {
    settings: Settings,
    providers: Providers,
    governor: Arc<RateGovernor>,
    encoder: Option<Arc<dyn RenderEncoder>>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    progress: Option<ProgressCallback>,
    cancel: CancelHandle,
}

impl EpisodeRunner {
    pub fn new(settings: Settings, providers: Providers) -> Self {
        let governor = Arc::new(RateGovernor::from_settings(&settings.rate_limits));
        Self {
            settings,
            providers,
            governor,
            encoder: None,
            checkpoint_store: None,
            progress: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Replace the ffmpeg encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn RenderEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Keep checkpoints somewhere other than `<workdir>/<checkpoint_folder>`.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Stops the current run at the next step boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The checkpoint manager used for episodes under `workdir`.
    pub fn checkpoints(&self, workdir: &Path) -> CheckpointManager {
        let store: Arc<dyn CheckpointStore> = match &self.checkpoint_store {
            Some(store) => Arc::clone(store),
            None => Arc::new(FileCheckpointStore::new(resolve(
                workdir,
                &self.settings.paths.checkpoint_folder,
            ))),
        };
        CheckpointManager::new(store)
    }

    /// Resume from the episode's checkpoint if one exists, otherwise start fresh.
    pub async fn resume_episode(
        &self,
        plan: &VideoPlan,
        workdir: &Path,
    ) -> PipelineResult<EpisodeOutput> {
        let record = self
            .checkpoints(workdir)
            .load(&plan.episode_id)
            .map_err(|e| PipelineError::checkpoint(&plan.episode_id, e))?;

        match record {
            Some(record) => {
                tracing::info!(episode = %plan.episode_id, stage = %record.stage, "resuming from checkpoint");
                self.render_episode(plan, workdir, Some(record.into())).await
            }
            None => {
                tracing::info!(episode = %plan.episode_id, "no checkpoint, starting fresh");
                self.render_episode(plan, workdir, None).await
            }
        }
    }

    /// Run the full pipeline for `plan` under `workdir`.
    ///
    /// With a resume point, stages up to and including its stage are not
    /// run again and its asset map is reused as-is.
    pub async fn render_episode(
        &self,
        plan: &VideoPlan,
        workdir: &Path,
        resume: Option<ResumePoint>,
    ) -> PipelineResult<EpisodeOutput> {
        let episode_id = plan.episode_id.clone();

        plan.validate()
            .map_err(|e| PipelineError::validation_failed(&episode_id, e.to_string()))?;

        if let Some(point) = &resume {
            let before = point.snapshot.plan.structure();
            let now = plan.structure();
            if before != now {
                return Err(PipelineError::plan_changed(
                    &episode_id,
                    format!(
                        "plan structure changed since the {} checkpoint (scenes {:?} -> {:?}, roster {:?} -> {:?}, {} -> {} spoken lines)",
                        point.stage,
                        before.scene_ids,
                        now.scene_ids,
                        before.roster,
                        now.roster,
                        before.spoken_lines,
                        now.spoken_lines
                    ),
                ));
            }
        }

        fs::create_dir_all(workdir).map_err(|e| {
            PipelineError::setup_failed(&episode_id, format!("create {}: {}", workdir.display(), e))
        })?;
        let logger = Arc::new(
            EpisodeLogger::new(
                &episode_id,
                resolve(workdir, &self.settings.paths.logs_folder),
                LogConfig::from(&self.settings.logging),
                None,
            )
            .map_err(|e| PipelineError::setup_failed(&episode_id, format!("open log: {}", e)))?,
        );

        let producer = Arc::new(self.producer(workdir, &episode_id));
        let orchestrator = AssetOrchestrator::new(
            Arc::clone(&producer),
            self.settings.orchestrator.workers,
            Duration::from_secs(self.settings.orchestrator.join_ceiling_secs),
        )
        .with_logger(Arc::clone(&logger));

        let encoder: Arc<dyn RenderEncoder> = match &self.encoder {
            Some(encoder) => Arc::clone(encoder),
            None => Arc::new(
                FfmpegEncoder::new(self.settings.render.clone()).with_logger(Arc::clone(&logger)),
            ),
        };

        let ctx = Context::new(
            self.settings.clone(),
            &episode_id,
            workdir.to_path_buf(),
            resolve(workdir, &self.settings.paths.output_folder),
            Arc::clone(&logger),
            Arc::new(orchestrator),
            encoder,
            self.providers.publisher.clone(),
        )
        .with_progress_callback(self.progress.clone());

        let mut state = match resume {
            Some(point) => {
                logger.info(&format!("Resuming after stage {}", point.stage));
                EpisodeState::resumed(plan.clone(), point.stage, point.snapshot)
            }
            None => EpisodeState::new(plan.clone()),
        };

        let pipeline = create_episode_pipeline()
            .with_cancel_handle(self.cancel.clone())
            .with_checkpoints(self.checkpoints(workdir));

        let run = pipeline.run(&ctx, &mut state).await;
        state.metrics.producer_calls = producer.calls();

        if let Err(e) = &run {
            logger.error(&e.to_string());
            logger.show_tail("Recent output");
            logger.close();
        }
        let result = run?;

        let Some(video_path) = state.snapshot.video_path.clone() else {
            logger.close();
            return Err(PipelineError::setup_failed(
                &episode_id,
                "pipeline finished without a rendered video",
            ));
        };

        logger.success(&format!(
            "{} steps run, {} restored: {}",
            result.total_steps(),
            result.steps_restored.len(),
            state.metrics.summary()
        ));
        logger.close();

        Ok(EpisodeOutput {
            video_path,
            metrics: state.metrics,
            assets: state.snapshot.assets,
            timeline: state.timeline,
            publish_id: state.snapshot.publish_id,
        })
    }

    fn producer(&self, workdir: &Path, episode_id: &str) -> AssetProducer {
        let fallback_dir = if self.settings.paths.fallback_folder.is_empty() {
            None
        } else {
            Some(resolve(workdir, &self.settings.paths.fallback_folder))
        };

        AssetProducer::new(
            self.providers.clone(),
            Arc::clone(&self.governor),
            QualityGate::new(self.settings.quality.threshold),
            RetryPolicy::from_settings(&self.settings.quality, &self.settings.orchestrator),
            Duration::from_secs(self.settings.orchestrator.call_timeout_secs),
            AssetStore::new(resolve(workdir, &self.settings.paths.assets_folder), episode_id),
            FallbackLibrary::new(fallback_dir),
        )
        .with_enhancer(self.settings.quality.enhancer())
    }
}

/// Configured folders are relative to the workdir unless absolute.
fn resolve(workdir: &Path, folder: &str) -> PathBuf {
    let path = Path::new(folder);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::testing;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::models::fixtures::{dialogue_plan, narration_only_plan};
    use crate::models::EditPattern;
    use crate::pipeline::testing::FakeEncoder;
    use tempfile::tempdir;

    fn runner(providers: Providers) -> EpisodeRunner {
        let mut settings = Settings::default();
        settings.orchestrator.retry_backoff_ms = 1;
        EpisodeRunner::new(settings, providers).with_encoder(Arc::new(FakeEncoder::default()))
    }

    #[test]
    fn relative_folders_resolve_under_workdir() {
        assert_eq!(resolve(Path::new("/w"), "assets"), PathBuf::from("/w/assets"));
        assert_eq!(resolve(Path::new("/w"), "/srv/assets"), PathBuf::from("/srv/assets"));
    }

    #[tokio::test]
    async fn renders_and_clears_the_checkpoint() {
        let dir = tempdir().unwrap();
        let runner = runner(testing::working());
        let plan = dialogue_plan(2, 20.0, EditPattern::TalkingHeadHeavy);

        let output = runner.render_episode(&plan, dir.path(), None).await.unwrap();

        assert!(output.video_path.is_file());
        assert!(output.metrics.producer_calls > 0);
        assert!(output.metrics.layer_count > 0);
        assert!((output.metrics.final_duration_secs - 20.0).abs() <= 2.0);
        assert!(runner.checkpoints(dir.path()).load("ep-test").unwrap().is_none());
        assert!(output.publish_id.is_none());
    }

    #[tokio::test]
    async fn invalid_plans_fail_validation() {
        let dir = tempdir().unwrap();
        let mut plan = narration_only_plan(1, 10.0);
        plan.target_runtime_secs = -1.0;

        let err = runner(testing::working())
            .render_episode(&plan, dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn changed_structure_refuses_to_resume() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryCheckpointStore::new());
        let runner = runner(testing::working()).with_checkpoint_store(store);
        let old = narration_only_plan(3, 30.0);
        runner
            .checkpoints(dir.path())
            .save("ep-test", PipelineStage::AssetsGenerated, &EpisodeSnapshot::new(old))
            .unwrap();

        let err = runner
            .resume_episode(&narration_only_plan(2, 30.0), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PlanChanged { .. }));
    }

    #[tokio::test]
    async fn cancelled_runner_keeps_nothing_half_done() {
        let dir = tempdir().unwrap();
        let runner = runner(testing::working());
        runner.cancel_handle().cancel();

        let err = runner
            .render_episode(&narration_only_plan(1, 10.0), dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert!(runner.checkpoints(dir.path()).load("ep-test").unwrap().is_none());
    }
}
