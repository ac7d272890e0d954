//! Produces one asset: rate gate, provider call, quality gate, post-processing,
//! retry, fallback.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::fallback::FallbackLibrary;
use super::placeholder;
use super::retry::{AttemptFailure, AttemptOutcome, RetryPolicy};
use super::store::AssetStore;
use super::wav;
use crate::governor::RateGovernor;
use crate::models::{
    AssetFile, AssetKind, AssetOutcome, AssetRequest, AssetResult, FallbackSource,
    GenerationParams, MediaKind,
};
use crate::providers::Providers;
use crate::quality::{Enhancer, QualityGate};

/// Inputs a talking clip is animated from.
#[derive(Debug, Clone, Default)]
pub struct TalkingInputs {
    /// Speaker portrait (genuine or stand-in).
    pub portrait: Option<AssetFile>,
    /// Spoken line audio; None when only a placeholder exists.
    pub voice: Option<AssetFile>,
}

/// What a successful attempt produced.
struct Produced {
    file: AssetFile,
    score: Option<f64>,
}

pub struct AssetProducer {
    providers: Providers,
    governor: Arc<RateGovernor>,
    gate: QualityGate,
    policy: RetryPolicy,
    call_timeout: Duration,
    store: AssetStore,
    fallbacks: FallbackLibrary,
    enhancer: Option<Enhancer>,
    calls: AtomicU64,
}

impl AssetProducer {
    pub fn new(
        providers: Providers,
        governor: Arc<RateGovernor>,
        gate: QualityGate,
        policy: RetryPolicy,
        call_timeout: Duration,
        store: AssetStore,
        fallbacks: FallbackLibrary,
    ) -> Self {
        Self {
            providers,
            governor,
            gate,
            policy,
            call_timeout,
            store,
            fallbacks,
            enhancer: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Post-process accepted visuals and provisioned stills.
    pub fn with_enhancer(mut self, enhancer: Option<Enhancer>) -> Self {
        self.enhancer = enhancer;
        self
    }

    /// Number of external collaborator calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Produce one asset. Never fails: exhausted or unavailable requests
    /// come back as a fallback (or, if even that cannot be written, Failed).
    pub async fn produce(&self, request: &AssetRequest, inputs: &TalkingInputs) -> AssetResult {
        let started = Instant::now();

        if let Some(reused) = self.store.lookup_resolved(&request.id) {
            tracing::debug!(request_id = %request.id, "reusing stored asset");
            return reused;
        }

        let mut params = request.params.clone();
        let mut attempt = 0;
        let mut last_score = None;

        let outcome = loop {
            attempt += 1;
            let result = self.attempt(request, &params, attempt, inputs).await;
            if let Err(AttemptFailure::QualityRejected { score, .. }) = &result {
                last_score = Some(*score);
            }

            match self.policy.decide(attempt, result, &params) {
                AttemptOutcome::Accept(produced) => {
                    last_score = produced.score;
                    break AssetOutcome::Resolved {
                        file: produced.file,
                    };
                }
                AttemptOutcome::Retry(next) => {
                    tracing::debug!(request_id = %request.id, attempt, "retrying");
                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                    params = next;
                }
                AttemptOutcome::Fallback(reason) => {
                    break self.fallback(request, &params, reason, inputs).await;
                }
            }
        };

        let result = AssetResult {
            request_id: request.id.clone(),
            kind: request.kind.clone(),
            outcome,
            attempts: attempt,
            quality_score: last_score,
            elapsed_ms: started.elapsed().as_millis() as u64,
            reused: false,
        };
        if let Err(e) = self.store.record(&result) {
            tracing::warn!(request_id = %request.id, "failed to write asset sidecar: {}", e);
        }
        result
    }

    async fn attempt(
        &self,
        request: &AssetRequest,
        params: &GenerationParams,
        attempt: u32,
        inputs: &TalkingInputs,
    ) -> Result<Produced, AttemptFailure> {
        let media = request.kind.media();
        let staged = self
            .store
            .staging_path(&request.id, attempt, media)
            .map_err(|e| AttemptFailure::Transient(format!("staging: {}", e)))?;

        // Inputs are checked before spending a token or a call
        let talking = match &request.kind {
            AssetKind::CharacterTalkingClip { .. } => {
                let portrait = inputs.portrait.as_ref().ok_or_else(|| {
                    AttemptFailure::Unavailable("speaker portrait missing".into())
                })?;
                let voice = inputs.voice.as_ref().ok_or_else(|| {
                    AttemptFailure::Unavailable("no genuine voice audio for this line".into())
                })?;
                Some((portrait.path.clone(), voice.path.clone()))
            }
            _ => None,
        };

        self.governor.acquire(request.kind.capability()).await;
        self.calls.fetch_add(1, Ordering::Relaxed);

        let call = async {
            match (&request.kind, &talking) {
                (AssetKind::NarrationAudio | AssetKind::CharacterVoiceAudio { .. }, _) => {
                    let voice = params.voice.clone().unwrap_or_default();
                    self.providers
                        .speech
                        .synthesize(&params.prompt, &voice, &staged)
                        .await
                        .map(|clip| Some(clip.duration_secs))
                }
                (AssetKind::CharacterTalkingClip { .. }, Some((portrait, voice))) => self
                    .providers
                    .talking_clips
                    .synthesize_talking_clip(portrait, voice, &staged)
                    .await
                    .map(|clip| Some(clip.duration_secs)),
                _ => self
                    .providers
                    .images
                    .synthesize_image(
                        &params.effective_prompt(),
                        Some(params.seed),
                        &params.style,
                        &staged,
                    )
                    .await
                    .map(|_| None),
            }
        };

        let duration = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(duration)) => duration,
            Ok(Err(e)) => return Err(e.classify()),
            Err(_) => {
                return Err(AttemptFailure::Transient(format!(
                    "call timed out after {:?}",
                    self.call_timeout
                )))
            }
        };

        let score = if request.kind.is_image() {
            let report = self
                .gate
                .score_file_async(staged.clone(), request.kind.is_portrait())
                .await
                .map_err(|e| AttemptFailure::Transient(e.to_string()))?;
            if !self.gate.accepts(&report) {
                let _ = std::fs::remove_file(&staged);
                return Err(AttemptFailure::QualityRejected {
                    score: report.score,
                    threshold: self.gate.threshold(),
                });
            }
            if let Some(enhancer) = self.enhancer {
                self.enhance(enhancer, &request.id, &staged, &staged).await;
            }
            Some(report.score)
        } else {
            None
        };

        let file = self
            .store
            .commit(&request.id, &staged, media, duration)
            .map_err(|e| AttemptFailure::Transient(format!("commit: {}", e)))?;
        Ok(Produced { file, score })
    }

    async fn fallback(
        &self,
        request: &AssetRequest,
        params: &GenerationParams,
        reason: String,
        inputs: &TalkingInputs,
    ) -> AssetOutcome {
        if let AssetKind::CharacterTalkingClip { .. } = request.kind {
            if let Some(portrait) = &inputs.portrait {
                let duration = inputs
                    .voice
                    .as_ref()
                    .and_then(|v| v.duration_secs)
                    .or(params.duration_hint_secs);
                return AssetOutcome::Fallback {
                    file: AssetFile {
                        path: portrait.path.clone(),
                        media: MediaKind::Image,
                        duration_secs: duration,
                    },
                    source: FallbackSource::StaticPortrait,
                    reason,
                };
            }
        }

        if let Some(source) = self.fallbacks.lookup(&request.kind, params) {
            match self.import_provisioned(request, &source).await {
                Ok(file) => {
                    return AssetOutcome::Fallback {
                        file,
                        source: FallbackSource::Provisioned,
                        reason,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %request.id,
                        path = %source.display(),
                        "provisioned fallback unusable: {}",
                        e
                    );
                }
            }
        }

        match self.placeholder(request, params).await {
            Ok(file) => AssetOutcome::Fallback {
                file,
                source: FallbackSource::Placeholder,
                reason,
            },
            Err(e) => AssetOutcome::Failed {
                reason: format!("{}; placeholder failed: {}", reason, e),
                substitute: None,
            },
        }
    }

    /// Run the post-processor; on failure the unprocessed image stands.
    async fn enhance(&self, enhancer: Enhancer, request_id: &str, input: &Path, output: &Path) -> bool {
        match enhancer
            .enhance_file_async(input.to_path_buf(), output.to_path_buf())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(request_id, "post-processing skipped: {}", e);
                false
            }
        }
    }

    /// Copy a provisioned file into the store. Audio must be PCM WAV.
    async fn import_provisioned(
        &self,
        request: &AssetRequest,
        source: &Path,
    ) -> std::io::Result<AssetFile> {
        let media = placeholder_media(&request.kind);
        match media {
            MediaKind::Audio => {
                let duration = wav::read_duration(source)?;
                self.store.import(&request.id, source, media, Some(duration))
            }
            _ => {
                if let Some(enhancer) = self.enhancer {
                    let staged = self.store.staging_path(&request.id, 0, media)?;
                    if self.enhance(enhancer, &request.id, source, &staged).await {
                        return self.store.commit(&request.id, &staged, media, None);
                    }
                }
                self.store.import(&request.id, source, media, None)
            }
        }
    }

    /// Write a synthesized stand-in into the store.
    pub async fn placeholder(
        &self,
        request: &AssetRequest,
        params: &GenerationParams,
    ) -> std::io::Result<AssetFile> {
        let media = placeholder_media(&request.kind);
        let staged = self.store.staging_path(&request.id, 0, media)?;
        let label = request.id.clone();
        let duration = params.duration_hint_secs.unwrap_or(1.0);

        let path = staged.clone();
        tokio::task::spawn_blocking(move || match media {
            MediaKind::Audio => placeholder::write_silence(&path, duration),
            _ => placeholder::write_image(&path, &label),
        })
        .await
        .map_err(std::io::Error::other)??;

        let duration = (media == MediaKind::Audio).then_some(duration);
        self.store.commit(&request.id, &staged, media, duration)
    }
}

/// Stand-ins for talking clips are still frames.
fn placeholder_media(kind: &AssetKind) -> MediaKind {
    match kind.media() {
        MediaKind::Video => MediaKind::Image,
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted providers for producer and orchestrator tests.

    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};
    use parking_lot::Mutex;

    use crate::assets::wav;
    use crate::models::VoiceDescriptor;
    use crate::providers::{
        ImageSynthesizer, ProviderError, ProviderResult, Providers, SpeechSynthesizer,
        TalkingClipSynthesizer, TimedClip, UnavailableTalkingClips,
    };

    /// Speech that writes `words / 2.5` seconds of silence.
    #[derive(Default)]
    pub struct FakeSpeech {
        pub calls: AtomicU64,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(
            &self,
            text: &str,
            _: &VoiceDescriptor,
            output: &Path,
        ) -> ProviderResult<TimedClip> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let secs = crate::assets::request::speaking_time(text);
            wav::write_silence(output, secs, 8_000)?;
            Ok(TimedClip {
                path: output.to_path_buf(),
                duration_secs: secs,
            })
        }
    }

    /// Image provider returning sharp noise, optionally blurry or failing
    /// for the first N calls per prompt.
    #[derive(Default)]
    pub struct FakeImages {
        pub calls: AtomicU64,
        pub blurry_first: u32,
        pub fail_first: u32,
        pub seen: Mutex<HashMap<String, u32>>,
    }

    impl FakeImages {
        pub fn sharp() -> Self {
            Self::default()
        }
    }

    pub fn sharp_image(seed: u64) -> DynamicImage {
        let mut state = (seed as u32) | 1;
        DynamicImage::ImageRgb8(RgbImage::from_fn(320, 568, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let v = 40 + (state % 160) as u8;
            Rgb([v, v, v])
        }))
    }

    #[async_trait]
    impl ImageSynthesizer for FakeImages {
        async fn synthesize_image(
            &self,
            _: &str,
            seed: Option<u64>,
            _: &str,
            output: &Path,
        ) -> ProviderResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Staging names are `<request-id>-<attempt>.png`
            let stem = output
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let key = stem.rsplit_once('-').map(|(id, _)| id.to_string()).unwrap_or(stem);
            let nth = {
                let mut seen = self.seen.lock();
                let n = seen.entry(key).or_insert(0);
                *n += 1;
                *n
            };
            if nth <= self.fail_first {
                return Err(ProviderError::Transient("503 loading".into()));
            }
            let image = if nth <= self.fail_first + self.blurry_first {
                DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([120, 120, 120])))
            } else {
                sharp_image(seed.unwrap_or(1))
            };
            image
                .save_with_format(output, image::ImageFormat::Png)
                .map_err(|e| ProviderError::Io(std::io::Error::other(e)))?;
            Ok(output.to_path_buf())
        }
    }

    /// Talking clips that copy the audio and report its duration.
    #[derive(Default)]
    pub struct FakeTalkingClips {
        pub calls: AtomicU64,
    }

    #[async_trait]
    impl TalkingClipSynthesizer for FakeTalkingClips {
        async fn synthesize_talking_clip(
            &self,
            _: &Path,
            audio: &Path,
            output: &Path,
        ) -> ProviderResult<TimedClip> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let duration_secs = wav::read_duration(audio)?;
            std::fs::copy(audio, output)?;
            Ok(TimedClip {
                path: output.to_path_buf(),
                duration_secs,
            })
        }
    }

    /// Fully working fakes, lip-sync included.
    pub fn working() -> Providers {
        Providers {
            speech: Arc::new(FakeSpeech::default()),
            images: Arc::new(FakeImages::sharp()),
            talking_clips: Arc::new(FakeTalkingClips::default()),
            publisher: None,
        }
    }

    /// Working speech and images, no lip-sync provider.
    pub fn without_lipsync() -> Providers {
        Providers {
            talking_clips: Arc::new(UnavailableTalkingClips),
            ..working()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::assets::hash_file;
    use crate::assets::request::RequestSet;
    use crate::models::{fixtures, EditPattern};
    use crate::providers::{UnavailableImages, UnavailableSpeech};
    use tempfile::tempdir;

    fn producer(providers: Providers, root: &Path, fallback_dir: Option<&Path>) -> AssetProducer {
        AssetProducer::new(
            providers,
            Arc::new(RateGovernor::unlimited()),
            QualityGate::new(0.65),
            RetryPolicy {
                max_attempts: 3,
                backoff_step: Duration::from_millis(1),
                prompt_suffixes: vec!["sharp focus".into()],
            },
            Duration::from_secs(30),
            AssetStore::new(root, "ep"),
            FallbackLibrary::new(fallback_dir.map(Path::to_path_buf)),
        )
    }

    fn request(id: &str) -> AssetRequest {
        let plan = fixtures::dialogue_plan(2, 30.0, EditPattern::Default);
        RequestSet::derive(&plan)
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn resolves_sharp_image_on_first_attempt() {
        let dir = tempdir().unwrap();
        let producer = producer(working(), dir.path(), None);

        let result = producer.produce(&request("scene-1"), &TalkingInputs::default()).await;

        assert!(result.is_resolved(), "{:?}", result.outcome);
        assert_eq!(result.attempts, 1);
        assert!(result.quality_score.unwrap() >= 0.65);
        assert_eq!(producer.calls(), 1);
    }

    #[tokio::test]
    async fn retries_after_quality_rejection() {
        let dir = tempdir().unwrap();
        let images = FakeImages {
            blurry_first: 1,
            ..FakeImages::sharp()
        };
        let providers = Providers {
            images: Arc::new(images),
            ..working()
        };
        let producer = producer(providers, dir.path(), None);

        let result = producer.produce(&request("broll-1-0"), &TalkingInputs::default()).await;

        assert!(result.is_resolved());
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_use_provisioned_fallback() {
        let dir = tempdir().unwrap();
        let provisioned = tempdir().unwrap();
        placeholder::write_image(&provisioned.path().join("scene.png"), "stock").unwrap();

        let images = FakeImages {
            fail_first: 10,
            ..FakeImages::sharp()
        };
        let providers = Providers {
            images: Arc::new(images),
            ..working()
        };
        let producer = producer(providers, dir.path(), Some(provisioned.path()));

        let result = producer.produce(&request("scene-2"), &TalkingInputs::default()).await;

        assert_eq!(result.attempts, 3);
        assert!(matches!(
            result.outcome,
            AssetOutcome::Fallback {
                source: FallbackSource::Provisioned,
                ..
            }
        ));
        assert!(result.usable_file().unwrap().path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn unavailable_capability_falls_back_without_retry() {
        let dir = tempdir().unwrap();
        let providers = Providers {
            images: Arc::new(UnavailableImages),
            ..working()
        };
        let producer = producer(providers, dir.path(), None);

        let result = producer.produce(&request("portrait-judge"), &TalkingInputs::default()).await;

        assert_eq!(result.attempts, 1);
        assert!(matches!(
            result.outcome,
            AssetOutcome::Fallback {
                source: FallbackSource::Placeholder,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn talking_clip_without_lipsync_uses_portrait() {
        let dir = tempdir().unwrap();
        let producer = producer(without_lipsync(), dir.path(), None);
        let portrait = producer.produce(&request("portrait-judge"), &TalkingInputs::default()).await;
        let voice = producer.produce(&request("voice-0"), &TalkingInputs::default()).await;

        let inputs = TalkingInputs {
            portrait: portrait.usable_file().cloned(),
            voice: voice.genuine_file().cloned(),
        };
        let result = producer.produce(&request("talking-0"), &inputs).await;

        let AssetOutcome::Fallback { file, source, .. } = &result.outcome else {
            panic!("expected fallback, got {:?}", result.outcome);
        };
        assert_eq!(*source, FallbackSource::StaticPortrait);
        assert_eq!(file.media, MediaKind::Image);
        assert_eq!(file.path, portrait.usable_file().unwrap().path);
        assert_eq!(file.duration_secs, voice.usable_file().unwrap().duration_secs);
    }

    #[tokio::test]
    async fn accepted_visual_is_post_processed_after_scoring() {
        let plain_dir = tempdir().unwrap();
        let enhanced_dir = tempdir().unwrap();
        let plain = producer(working(), plain_dir.path(), None);
        let enhanced =
            producer(working(), enhanced_dir.path(), None).with_enhancer(Some(Enhancer::default()));

        let raw = plain.produce(&request("scene-1"), &TalkingInputs::default()).await;
        let processed = enhanced.produce(&request("scene-1"), &TalkingInputs::default()).await;

        assert!(processed.is_resolved(), "{:?}", processed.outcome);
        // The gate saw the same raw frame
        assert_eq!(raw.quality_score, processed.quality_score);
        let raw_file = raw.usable_file().unwrap();
        let processed_file = processed.usable_file().unwrap();
        assert_ne!(
            hash_file(&raw_file.path).unwrap(),
            hash_file(&processed_file.path).unwrap()
        );
        let decoded = image::open(&processed_file.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 568));
    }

    #[tokio::test]
    async fn provisioned_still_is_post_processed() {
        let dir = tempdir().unwrap();
        let provisioned = tempdir().unwrap();
        let source = provisioned.path().join("scene.png");
        placeholder::write_image(&source, "stock").unwrap();

        let providers = Providers {
            images: Arc::new(UnavailableImages),
            ..working()
        };
        let producer = producer(providers, dir.path(), Some(provisioned.path()))
            .with_enhancer(Some(Enhancer::default()));

        let result = producer.produce(&request("scene-2"), &TalkingInputs::default()).await;

        assert!(matches!(
            result.outcome,
            AssetOutcome::Fallback {
                source: FallbackSource::Provisioned,
                ..
            }
        ));
        let file = result.usable_file().unwrap();
        assert_ne!(hash_file(&file.path).unwrap(), hash_file(&source).unwrap());
        assert!(image::open(&file.path).is_ok());
    }

    #[tokio::test]
    async fn compressed_narration_file_falls_through_to_silence() {
        crate::logging::init_test_tracing();
        let dir = tempdir().unwrap();
        let provisioned = tempdir().unwrap();
        // MP3 bytes under the WAV name
        let mp3 = b"ID3\x03\x00\x00\x00\x00\x00\x00";
        std::fs::write(provisioned.path().join("narration.wav"), mp3).unwrap();

        let providers = Providers {
            speech: Arc::new(UnavailableSpeech),
            ..working()
        };
        let producer = producer(providers, dir.path(), Some(provisioned.path()));

        let result = producer.produce(&request("narration"), &TalkingInputs::default()).await;

        assert!(matches!(
            result.outcome,
            AssetOutcome::Fallback {
                source: FallbackSource::Placeholder,
                ..
            }
        ));
        assert!(result.usable_file().unwrap().duration_secs.is_some());
    }

    #[tokio::test]
    async fn stored_result_skips_provider() {
        let dir = tempdir().unwrap();
        let first = producer(working(), dir.path(), None);
        first.produce(&request("narration"), &TalkingInputs::default()).await;

        let second = producer(working(), dir.path(), None);
        let result = second.produce(&request("narration"), &TalkingInputs::default()).await;

        assert!(result.reused);
        assert_eq!(second.calls(), 0);
    }
}
