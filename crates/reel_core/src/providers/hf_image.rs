//! Hugging Face inference endpoint adapter for image synthesis.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use super::{http_client, truncate, ImageSynthesizer, ProviderError, ProviderResult};
use crate::config::ProviderSettings;

#[derive(Serialize)]
struct Parameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct ImageRequest {
    inputs: String,
    parameters: Parameters,
}

/// Posts `{"inputs": prompt}` and expects raw image bytes back.
pub struct HfEndpointImageSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HfEndpointImageSynthesizer {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: http_client(settings.http_timeout_secs),
            endpoint: settings.image_endpoint.clone(),
            token: settings.image_token.clone(),
        }
    }

    fn request(prompt: &str, seed: Option<u64>, style: &str) -> ImageRequest {
        let inputs = if style.is_empty() {
            prompt.to_string()
        } else {
            format!("{}, {}", prompt, style)
        };
        ImageRequest {
            inputs,
            parameters: Parameters {
                seed,
                width: 1080,
                height: 1920,
            },
        }
    }
}

#[async_trait]
impl ImageSynthesizer for HfEndpointImageSynthesizer {
    async fn synthesize_image(
        &self,
        prompt: &str,
        seed: Option<u64>,
        style: &str,
        output: &Path,
    ) -> ProviderResult<PathBuf> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "image/png")
            .json(&Self::request(prompt, seed, style));
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 503 {
            return Err(ProviderError::Transient("endpoint is loading".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate(&body, 500).to_string(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.first() == Some(&b'{') {
            return Err(ProviderError::Transient(format!(
                "endpoint returned JSON instead of an image: {}",
                truncate(&String::from_utf8_lossy(&bytes), 200)
            )));
        }

        // Re-encode so every stored image is a PNG regardless of what came back
        let image = image::load_from_memory(&bytes)
            .map_err(|e| ProviderError::Transient(format!("undecodable image: {}", e)))?;
        let out = output.to_path_buf();
        tokio::task::spawn_blocking(move || {
            image
                .save_with_format(&out, image::ImageFormat::Png)
                .map_err(|e| ProviderError::Io(std::io::Error::other(e)))
        })
        .await
        .map_err(|e| ProviderError::Transient(e.to_string()))??;

        Ok(output.to_path_buf())
    }
}
