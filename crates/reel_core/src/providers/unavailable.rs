//! Adapters for capabilities with no configured provider.
//!
//! Each one reports `Unavailable`, which sends producers straight to their
//! fallback without spending retries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{
    ImageSynthesizer, ProviderError, ProviderResult, SpeechSynthesizer, TalkingClipSynthesizer,
    TimedClip,
};
use crate::models::VoiceDescriptor;

pub struct UnavailableSpeech;

#[async_trait]
impl SpeechSynthesizer for UnavailableSpeech {
    async fn synthesize(&self, _: &str, _: &VoiceDescriptor, _: &Path) -> ProviderResult<TimedClip> {
        Err(ProviderError::Unavailable("no speech provider configured".into()))
    }
}

pub struct UnavailableImages;

#[async_trait]
impl ImageSynthesizer for UnavailableImages {
    async fn synthesize_image(
        &self,
        _: &str,
        _: Option<u64>,
        _: &str,
        _: &Path,
    ) -> ProviderResult<PathBuf> {
        Err(ProviderError::Unavailable("no image provider configured".into()))
    }
}

/// Used when no lip-sync provider is configured.
pub struct UnavailableTalkingClips;

#[async_trait]
impl TalkingClipSynthesizer for UnavailableTalkingClips {
    async fn synthesize_talking_clip(&self, _: &Path, _: &Path, _: &Path) -> ProviderResult<TimedClip> {
        Err(ProviderError::Unavailable("no lip-sync provider configured".into()))
    }
}
