//! External synthesis collaborators.
//!
//! One trait per capability, one adapter per provider. Producers only see
//! the traits; adapters classify their own failures into [`ProviderError`]
//! so retries can tell a flaky call from a missing capability.

mod elevenlabs;
mod hf_image;
mod unavailable;

pub use elevenlabs::ElevenLabsSpeechSynthesizer;
pub use hf_image::HfEndpointImageSynthesizer;
pub use unavailable::{UnavailableImages, UnavailableSpeech, UnavailableTalkingClips};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::assets::AttemptFailure;
use crate::config::ProviderSettings;
use crate::models::{VideoPlan, VoiceDescriptor};

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Worth retrying: timeouts, rate limits, 5xx, malformed payloads.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The capability is not configured or the provider refused it outright.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Map to the retry classification.
    pub fn classify(&self) -> AttemptFailure {
        match self {
            ProviderError::Unavailable(reason) => AttemptFailure::Unavailable(reason.clone()),
            // 401/403/404 will not fix themselves
            ProviderError::Http { status, body } if matches!(status, 401 | 403 | 404) => {
                AttemptFailure::Unavailable(format!("HTTP {}: {}", status, truncate(body, 200)))
            }
            other => AttemptFailure::Transient(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProviderError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => ProviderError::Transient(err.to_string()),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A synthesized audio or video file with its duration.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedClip {
    pub path: PathBuf,
    pub duration_secs: f64,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text` in `voice`, writing a WAV file to `output`.
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceDescriptor,
        output: &Path,
    ) -> ProviderResult<TimedClip>;
}

#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Render `prompt` to an image file at `output`.
    async fn synthesize_image(
        &self,
        prompt: &str,
        seed: Option<u64>,
        style: &str,
        output: &Path,
    ) -> ProviderResult<PathBuf>;
}

#[async_trait]
pub trait TalkingClipSynthesizer: Send + Sync {
    /// Animate `portrait` speaking `audio`, writing a video to `output`.
    async fn synthesize_talking_clip(
        &self,
        portrait: &Path,
        audio: &Path,
        output: &Path,
    ) -> ProviderResult<TimedClip>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload a rendered video. Returns the platform's id for it.
    async fn publish(&self, video: &Path, plan: &VideoPlan) -> ProviderResult<String>;
}

/// The collaborators one runner works with.
#[derive(Clone)]
pub struct Providers {
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub images: Arc<dyn ImageSynthesizer>,
    pub talking_clips: Arc<dyn TalkingClipSynthesizer>,
    pub publisher: Option<Arc<dyn Publisher>>,
}

impl Providers {
    /// Build adapters from settings. Unconfigured capabilities report Unavailable.
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let speech: Arc<dyn SpeechSynthesizer> = if settings.speech_api_key.is_empty() {
            Arc::new(UnavailableSpeech)
        } else {
            Arc::new(ElevenLabsSpeechSynthesizer::new(settings))
        };
        let images: Arc<dyn ImageSynthesizer> = if settings.image_endpoint.is_empty() {
            Arc::new(UnavailableImages)
        } else {
            Arc::new(HfEndpointImageSynthesizer::new(settings))
        };

        Self {
            speech,
            images,
            talking_clips: Arc::new(UnavailableTalkingClips),
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the shared HTTP client used by adapters.
fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}
