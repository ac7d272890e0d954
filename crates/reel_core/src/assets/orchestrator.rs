//! Bounded concurrent fan-out over every asset request of a plan.
//!
//! Requests run in two waves sharing one deadline: everything independent
//! first, then talking clips (which need their line's voice and their
//! speaker's portrait). The returned map always holds one result per
//! request id; per-request failures never escape.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::producer::{AssetProducer, TalkingInputs};
use super::request::RequestSet;
use crate::logging::EpisodeLogger;
use crate::models::{
    AssetKind, AssetMap, AssetOutcome, AssetRequest, AssetResult, RequestId, VideoPlan,
};

#[derive(Error, Debug, PartialEq)]
pub enum SlotError {
    #[error("no request with id '{0}'")]
    Unknown(RequestId),
    #[error("result for '{0}' was already set")]
    AlreadySet(RequestId),
}

/// One write-once slot per request.
#[derive(Debug, Default)]
pub struct ResultSlots {
    slots: BTreeMap<RequestId, Option<AssetResult>>,
}

impl ResultSlots {
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a RequestId>) -> Self {
        Self {
            slots: ids.into_iter().map(|id| (id.clone(), None)).collect(),
        }
    }

    /// Set a slot. A slot can be set once.
    pub fn fill(&mut self, result: AssetResult) -> Result<(), SlotError> {
        match self.slots.get_mut(&result.request_id) {
            None => Err(SlotError::Unknown(result.request_id)),
            Some(Some(_)) => Err(SlotError::AlreadySet(result.request_id)),
            Some(slot) => {
                *slot = Some(result);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&AssetResult> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn is_filled(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn pending(&self) -> Vec<RequestId> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Hand out the complete map. Pending slots are dropped.
    pub fn into_map(self) -> AssetMap {
        self.slots
            .into_iter()
            .filter_map(|(id, slot)| slot.map(|result| (id, result)))
            .collect()
    }
}

pub struct AssetOrchestrator {
    producer: Arc<AssetProducer>,
    workers: usize,
    join_ceiling: Duration,
    logger: Option<Arc<EpisodeLogger>>,
}

impl AssetOrchestrator {
    pub fn new(producer: Arc<AssetProducer>, workers: usize, join_ceiling: Duration) -> Self {
        Self {
            producer,
            workers: workers.max(1),
            join_ceiling,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<EpisodeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn producer(&self) -> &AssetProducer {
        &self.producer
    }

    /// Produce every asset the plan implies.
    pub async fn generate_all(&self, plan: &VideoPlan) -> AssetMap {
        let requests = RequestSet::derive(plan);
        let ids: Vec<RequestId> = requests.iter().map(|r| r.id.clone()).collect();
        let mut slots = ResultSlots::new(&ids);
        let deadline = Instant::now() + self.join_ceiling;

        tracing::info!(
            episode = %plan.episode_id,
            requests = ids.len(),
            workers = self.workers,
            "generating assets"
        );

        let first_wave = requests
            .independent
            .iter()
            .map(|r| (r.clone(), TalkingInputs::default()))
            .collect();
        self.run_wave(plan, first_wave, deadline, &mut slots).await;

        let second_wave = requests
            .talking
            .iter()
            .map(|r| (r.clone(), talking_inputs(r, &slots)))
            .collect();
        self.run_wave(plan, second_wave, deadline, &mut slots).await;

        if let Err(e) = self.producer.store().clear_staging() {
            tracing::debug!("could not clear staging: {}", e);
        }
        slots.into_map()
    }

    async fn run_wave(
        &self,
        plan: &VideoPlan,
        wave: Vec<(AssetRequest, TalkingInputs)>,
        deadline: Instant,
        slots: &mut ResultSlots,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        let mut wave_requests = Vec::with_capacity(wave.len());

        for (request, inputs) in wave {
            wave_requests.push(request.clone());
            let producer = Arc::clone(&self.producer);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                producer.produce(&request, &inputs).await
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(result))) => self.record(plan, result, slots),
                Ok(Some(Err(e))) => {
                    tracing::error!(episode = %plan.episode_id, "asset task aborted: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        episode = %plan.episode_id,
                        still_running = set.len(),
                        "asset deadline reached, detaching remaining tasks"
                    );
                    set.detach_all();
                    break;
                }
            }
        }

        // Anything unfilled timed out or panicked
        for request in wave_requests {
            if slots.is_filled(&request.id) {
                continue;
            }
            let substitute = match self.producer.placeholder(&request, &request.params).await {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::error!(request_id = %request.id, "placeholder failed: {}", e);
                    None
                }
            };
            let result = AssetResult {
                request_id: request.id.clone(),
                kind: request.kind.clone(),
                outcome: AssetOutcome::Failed {
                    reason: "did not finish before the asset deadline".into(),
                    substitute,
                },
                attempts: 0,
                quality_score: None,
                elapsed_ms: self.join_ceiling.as_millis() as u64,
                reused: false,
            };
            self.record(plan, result, slots);
        }
    }

    fn record(&self, plan: &VideoPlan, result: AssetResult, slots: &mut ResultSlots) {
        match &result.outcome {
            AssetOutcome::Resolved { .. } => tracing::info!(
                episode = %plan.episode_id,
                request_id = %result.request_id,
                elapsed_ms = result.elapsed_ms,
                attempts = result.attempts,
                reused = result.reused,
                outcome = "resolved",
                "asset ready"
            ),
            AssetOutcome::Fallback { reason, source, .. } => tracing::warn!(
                episode = %plan.episode_id,
                request_id = %result.request_id,
                kind = result.kind.role(),
                elapsed_ms = result.elapsed_ms,
                attempts = result.attempts,
                outcome = "fallback",
                source = ?source,
                reason = %reason,
                "asset degraded"
            ),
            AssetOutcome::Failed { reason, .. } => tracing::error!(
                episode = %plan.episode_id,
                request_id = %result.request_id,
                kind = result.kind.role(),
                elapsed_ms = result.elapsed_ms,
                attempts = result.attempts,
                outcome = "failed",
                reason = %reason,
                "asset failed"
            ),
        }
        if let Some(logger) = &self.logger {
            logger.asset(&result);
        }

        if let Err(e) = slots.fill(result) {
            tracing::error!(episode = %plan.episode_id, "{}", e);
        }
    }
}

/// Portrait and voice a talking clip is built from.
fn talking_inputs(request: &AssetRequest, slots: &ResultSlots) -> TalkingInputs {
    let AssetKind::CharacterTalkingClip { character_id, line } = &request.kind else {
        return TalkingInputs::default();
    };
    let portrait_id = AssetKind::CharacterPortrait {
        character_id: character_id.clone(),
    }
    .request_id();
    let voice_id = AssetKind::CharacterVoiceAudio { line: *line }.request_id();

    TalkingInputs {
        portrait: slots.get(&portrait_id).and_then(|r| r.usable_file()).cloned(),
        voice: slots.get(&voice_id).and_then(|r| r.genuine_file()).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::fallback::FallbackLibrary;
    use crate::assets::producer::testing;
    use crate::assets::retry::RetryPolicy;
    use crate::assets::store::AssetStore;
    use crate::governor::RateGovernor;
    use crate::models::{fixtures, EditPattern, FallbackSource, SceneVariant};
    use crate::providers::{ProviderResult, Providers, TalkingClipSynthesizer, TimedClip};
    use crate::quality::QualityGate;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::tempdir;

    fn orchestrator(providers: Providers, root: &Path, ceiling: Duration) -> AssetOrchestrator {
        let producer = AssetProducer::new(
            providers,
            Arc::new(RateGovernor::unlimited()),
            QualityGate::new(0.65),
            RetryPolicy {
                max_attempts: 3,
                backoff_step: Duration::from_millis(1),
                prompt_suffixes: Vec::new(),
            },
            Duration::from_secs(30),
            AssetStore::new(root, "ep-test"),
            FallbackLibrary::empty(),
        );
        AssetOrchestrator::new(Arc::new(producer), 5, ceiling)
    }

    #[test]
    fn slots_are_write_once() {
        let ids = vec!["narration".to_string()];
        let mut slots = ResultSlots::new(&ids);
        let result = AssetResult {
            request_id: "narration".into(),
            kind: AssetKind::NarrationAudio,
            outcome: AssetOutcome::Failed {
                reason: "x".into(),
                substitute: None,
            },
            attempts: 1,
            quality_score: None,
            elapsed_ms: 0,
            reused: false,
        };
        assert_eq!(slots.pending(), ids);
        slots.fill(result.clone()).unwrap();
        assert_eq!(
            slots.fill(result.clone()),
            Err(SlotError::AlreadySet("narration".into()))
        );

        let mut stray = result;
        stray.request_id = "voice-9".into();
        assert_eq!(slots.fill(stray), Err(SlotError::Unknown("voice-9".into())));
    }

    #[tokio::test]
    async fn every_request_gets_a_result() {
        let dir = tempdir().unwrap();
        let plan = fixtures::dialogue_plan(3, 60.0, EditPattern::TalkingHeadHeavy);
        let orchestrator = orchestrator(testing::working(), dir.path(), Duration::from_secs(120));

        let assets = orchestrator.generate_all(&plan).await;

        let expected: Vec<String> = RequestSet::derive(&plan).iter().map(|r| r.id.clone()).collect();
        assert_eq!(assets.len(), expected.len());
        for id in &expected {
            assert!(assets.contains_key(id), "missing {}", id);
        }
        assert!(assets.values().all(|r| r.is_resolved()));
        let talking = &assets["talking-0"];
        assert_eq!(talking.usable_file().unwrap().media, crate::models::MediaKind::Video);
    }

    #[tokio::test]
    async fn missing_lipsync_degrades_only_talking_clips() {
        let dir = tempdir().unwrap();
        let plan = fixtures::dialogue_plan(2, 30.0, EditPattern::Default);
        let orchestrator =
            orchestrator(testing::without_lipsync(), dir.path(), Duration::from_secs(120));

        let assets = orchestrator.generate_all(&plan).await;

        for (id, result) in &assets {
            if id.starts_with("talking-") {
                assert!(matches!(
                    result.outcome,
                    AssetOutcome::Fallback {
                        source: FallbackSource::StaticPortrait,
                        ..
                    }
                ));
            } else {
                assert!(result.is_resolved(), "{} was {:?}", id, result.outcome);
            }
        }
        assert!(assets.contains_key(
            &AssetKind::SceneVisual {
                scene_id: 1,
                variant: SceneVariant::Hook
            }
            .request_id()
        ));
    }

    struct StuckTalkingClips;

    #[async_trait]
    impl TalkingClipSynthesizer for StuckTalkingClips {
        async fn synthesize_talking_clip(&self, _: &Path, _: &Path, _: &Path) -> ProviderResult<TimedClip> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn deadline_marks_stragglers_failed_with_substitute() {
        let dir = tempdir().unwrap();
        let plan = fixtures::dialogue_plan(1, 20.0, EditPattern::Default);
        let providers = Providers {
            talking_clips: Arc::new(StuckTalkingClips),
            ..testing::working()
        };
        let orchestrator = orchestrator(providers, dir.path(), Duration::from_secs(5));

        let assets = orchestrator.generate_all(&plan).await;

        let talking = &assets["talking-0"];
        assert!(talking.is_failed());
        assert!(talking.usable_file().is_some());
        assert!(assets["narration"].is_resolved());
    }
}
