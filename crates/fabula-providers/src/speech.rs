//! Text-to-speech provider client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Languages the speech service accepts.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "en", "es", "fr", "de", "it", "pt", "ru", "ja", "ko", "zh-CN",
];

/// Hard ceiling on one synthesis call.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Average speaking rate used for duration estimates.
pub const DEFAULT_WORDS_PER_MINUTE: u32 = 150;

/// A service that turns text into a local narration file.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize `text` in `lang` and persist the audio at `output_path`.
    async fn synthesize(&self, text: &str, lang: &str, output_path: &Path) -> ProviderResult<PathBuf>;
}

/// Estimate narration length in seconds from the word count.
pub fn estimate_duration(text: &str, words_per_minute: u32) -> f64 {
    let words = text.split_whitespace().count();
    words as f64 / words_per_minute as f64 * 60.0
}

/// Validate synthesis input against the service limits.
pub fn validate_input(text: &str, lang: &str) -> ProviderResult<()> {
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyInput);
    }
    let len = text.chars().count();
    if len > MAX_TEXT_CHARS {
        return Err(ProviderError::TextTooLong {
            len,
            max: MAX_TEXT_CHARS,
        });
    }
    if !SUPPORTED_LANGUAGES.contains(&lang) {
        return Err(ProviderError::UnsupportedLanguage(lang.to_string()));
    }
    Ok(())
}

/// Configuration for the speech client.
#[derive(Debug, Clone)]
pub struct SpeechClientConfig {
    /// Base URL of the TTS service
    pub base_url: String,
    /// Language code
    pub language: String,
    /// Slow speech rate
    pub slow: bool,
    /// Request timeout
    pub timeout: Duration,
}

impl SpeechClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("TTS_API_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            language: std::env::var("TTS_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            slow: false,
            timeout: Duration::from_secs(
                std::env::var("TTS_API_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    lang: &'a str,
    slow: bool,
}

/// HTTP client for a TTS service that returns encoded audio bytes.
pub struct SpeechClient {
    http: Client,
    config: SpeechClientConfig,
}

impl SpeechClient {
    pub fn new(config: SpeechClientConfig) -> ProviderResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(SpeechClientConfig::from_env())
    }
}

#[async_trait]
impl SpeechProvider for SpeechClient {
    async fn synthesize(&self, text: &str, lang: &str, output_path: &Path) -> ProviderResult<PathBuf> {
        let text = text.trim();
        validate_input(text, lang)?;

        // Narration files are always mp3
        let output_path = if output_path.extension().is_some_and(|e| e == "mp3") {
            output_path.to_path_buf()
        } else {
            output_path.with_extension("mp3")
        };

        let url = format!("{}/synthesize", self.config.base_url);
        debug!(lang, chars = text.chars().count(), "requesting narration");

        let response = self
            .http
            .post(&url)
            .json(&SynthesisRequest {
                text,
                lang,
                slow: self.config.slow,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited(format!("{status}: {body}")));
            }
            return Err(ProviderError::transient(format!("{status}: {body}")));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::EmptyResponse("synthesis produced no audio".to_string()));
        }

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&output_path, &audio).await?;

        debug!(path = %output_path.display(), bytes = audio.len(), "narration persisted");
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_validate_rejects_empty_text() {
        assert!(matches!(validate_input("  ", "en"), Err(ProviderError::EmptyInput)));
    }

    #[test]
    fn test_validate_rejects_overlong_text() {
        let text = "x".repeat(MAX_TEXT_CHARS + 1);
        assert!(matches!(
            validate_input(&text, "en"),
            Err(ProviderError::TextTooLong { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_language() {
        assert!(matches!(
            validate_input("hello there", "xx"),
            Err(ProviderError::UnsupportedLanguage(_))
        ));
        assert!(validate_input("hello there", "zh-CN").is_ok());
    }

    #[test]
    fn test_estimate_duration() {
        // 150 words at 150 wpm is one minute
        let text = "word ".repeat(150);
        let secs = estimate_duration(&text, DEFAULT_WORDS_PER_MINUTE);
        assert!((secs - 60.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_synthesize_writes_mp3() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3-bytes".to_vec()))
            .mount(&server)
            .await;

        let client = SpeechClient::new(SpeechClientConfig {
            base_url: server.uri(),
            language: "en".to_string(),
            slow: false,
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        // extension gets normalized to .mp3
        let out = client
            .synthesize("a keeper finds a map", "en", &dir.path().join("narration.wav"))
            .await
            .unwrap();

        assert_eq!(out.extension().unwrap(), "mp3");
        assert_eq!(std::fs::read(&out).unwrap(), b"mp3-bytes");
    }

    #[tokio::test]
    async fn test_synthesize_failure_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = SpeechClient::new(SpeechClientConfig {
            base_url: server.uri(),
            language: "en".to_string(),
            slow: false,
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = client
            .synthesize("a keeper finds a map", "en", &dir.path().join("n.mp3"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
