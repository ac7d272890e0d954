//! ElevenLabs text-to-speech adapter.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use super::{http_client, truncate, ProviderError, ProviderResult, SpeechSynthesizer, TimedClip};
use crate::assets::wav;
use crate::config::ProviderSettings;
use crate::models::VoiceDescriptor;

const SAMPLE_RATE: u32 = 22_050;

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Requests raw 22.05 kHz PCM and wraps it in a WAV container, so the
/// duration comes straight from the sample count.
pub struct ElevenLabsSpeechSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    default_voice: String,
}

impl ElevenLabsSpeechSynthesizer {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: http_client(settings.http_timeout_secs),
            base_url: settings.speech_base_url.trim_end_matches('/').to_string(),
            api_key: settings.speech_api_key.clone(),
            model: settings.speech_model.clone(),
            default_voice: settings.default_voice_id.clone(),
        }
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format=pcm_{}",
            self.base_url, voice_id, SAMPLE_RATE
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceDescriptor,
        output: &Path,
    ) -> ProviderResult<TimedClip> {
        let voice_id = voice
            .voice_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(self.default_voice.as_str());
        if voice_id.is_empty() {
            return Err(ProviderError::Unavailable("no voice id configured".into()));
        }
        if text.trim().is_empty() {
            return Err(ProviderError::Unavailable("nothing to speak".into()));
        }

        let body = SpeechRequest {
            text,
            model_id: &self.model,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };

        let response = self
            .client
            .post(self.endpoint(voice_id))
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate(&body, 500).to_string(),
            });
        }

        let pcm = response.bytes().await?;
        if pcm.len() < 2 {
            return Err(ProviderError::Transient("empty audio payload".into()));
        }
        // Odd trailing byte is a truncated sample
        let pcm = &pcm[..pcm.len() & !1];

        wav::write_pcm16_mono(output, pcm, SAMPLE_RATE)?;
        let duration_secs = wav::pcm16_duration(pcm.len(), SAMPLE_RATE);
        tracing::debug!(voice_id, duration_secs, "speech synthesized");

        Ok(TimedClip {
            path: output.to_path_buf(),
            duration_secs,
        })
    }
}
