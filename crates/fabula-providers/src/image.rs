//! Image-synthesis provider client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Default generation parameters for the FLUX schnell model.
pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;
pub const DEFAULT_STEPS: u32 = 4;
pub const DEFAULT_MODEL: &str = "black-forest-labs/FLUX.1-schnell";

const MAX_PROMPT_CHARS: usize = 1000;
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// A service that turns a text prompt into a local image file.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one image for `prompt` and persist it at `output_path`.
    async fn generate(&self, prompt: &str, output_path: &Path) -> ProviderResult<PathBuf>;
}

/// Configuration for the image client.
#[derive(Debug, Clone)]
pub struct ImageClientConfig {
    /// Base URL of the generation API
    pub base_url: String,
    /// API key (bearer token)
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Output dimensions
    pub width: u32,
    pub height: u32,
    /// Diffusion steps
    pub steps: u32,
    /// Request timeout
    pub timeout: Duration,
}

impl ImageClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("IMAGE_API_KEY")
            .map_err(|_| ProviderError::MissingConfig("IMAGE_API_KEY".to_string()))?;

        Ok(Self {
            base_url: std::env::var("IMAGE_API_URL")
                .unwrap_or_else(|_| "https://api.together.xyz/v1".to_string()),
            api_key,
            model: std::env::var("IMAGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            steps: DEFAULT_STEPS,
            timeout: Duration::from_secs(
                std::env::var("IMAGE_API_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: String,
}

/// HTTP client for a FLUX-style image generation API. The API returns
/// a short-lived URL; the client downloads it into the workspace.
pub struct FluxImageClient {
    http: Client,
    config: ImageClientConfig,
}

impl FluxImageClient {
    pub fn new(config: ImageClientConfig) -> ProviderResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ImageClientConfig::from_env()?)
    }

    async fn request_image_url(&self, prompt: &str) -> ProviderResult<String> {
        let url = format!("{}/images/generations", self.config.base_url);
        let request = GenerationRequest {
            model: &self.config.model,
            prompt,
            width: self.config.width,
            height: self.config.height,
            steps: self.config.steps,
            n: 1,
        };

        debug!(model = %self.config.model, "requesting image generation");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_failure(status, &body));
        }

        let generated: GenerationResponse = response.json().await?;
        generated
            .data
            .into_iter()
            .next()
            .map(|img| img.url)
            .ok_or_else(|| ProviderError::EmptyResponse("no image data returned".to_string()))
    }

    /// Stream the generated image from its URL to `output_path`.
    async fn download(&self, url: &str, output_path: &Path) -> ProviderResult<()> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .send()
            .await?
            .error_for_status()?;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ImageProvider for FluxImageClient {
    async fn generate(&self, prompt: &str, output_path: &Path) -> ProviderResult<PathBuf> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ProviderError::EmptyInput);
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(ProviderError::TextTooLong {
                len: prompt.chars().count(),
                max: MAX_PROMPT_CHARS,
            });
        }

        let image_url = self.request_image_url(prompt).await?;
        self.download(&image_url, output_path).await?;

        debug!(path = %output_path.display(), "image persisted");
        Ok(output_path.to_path_buf())
    }
}

/// Map an API error status to the retry taxonomy.
fn classify_api_failure(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited(format!("{status}: {body}"));
    }
    let lowered = body.to_lowercase();
    if status.is_client_error() && lowered.contains("prompt") {
        return ProviderError::InvalidPrompt(body.to_string());
    }
    ProviderError::transient(format!("{status}: {body}"))
}
