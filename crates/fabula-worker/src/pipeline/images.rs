//! Scene image generation with retry.
//!
//! Each scene is attempted independently. A scene that exhausts its
//! retries is skipped; the run only fails when no scene produced an
//! image at all.

use std::path::PathBuf;
use std::time::Duration;

use fabula_models::Scene;
use fabula_providers::{ImageProvider, ProviderError};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::workspace::JobWorkspace;

/// Attempts per scene, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// A generated image together with the scene it illustrates.
#[derive(Debug, Clone)]
pub struct SceneImage {
    /// 1-based index of the source scene
    pub scene_index: usize,
    /// Local path of the rendered image
    pub path: PathBuf,
}

/// Delay before the next attempt, or `None` when the failure should
/// not be retried. Rate limiting backs off harder than other
/// transient failures.
pub fn backoff_delay(error: &ProviderError, attempt: u32) -> Option<Duration> {
    if attempt >= MAX_ATTEMPTS || !error.is_retryable() {
        return None;
    }
    let base = if error.is_rate_limited() { 2 } else { 1 };
    Some(Duration::from_secs(base * 2u64.pow(attempt - 1)))
}

/// Generate one image per scene, preserving scene order among the
/// successes. Fails only when every scene failed.
pub async fn generate_scene_images(
    provider: &dyn ImageProvider,
    scenes: &[Scene],
    workspace: &JobWorkspace,
    logger: &JobLogger,
) -> WorkerResult<Vec<SceneImage>> {
    let mut images = Vec::with_capacity(scenes.len());

    for scene in scenes {
        let prompt = scene.image_prompt();
        let output_path = workspace.image_path(scene.index);

        match generate_with_retry(provider, &prompt, &output_path, scene.index, logger).await {
            Some(path) => {
                logger.log_progress(&format!(
                    "Generated image {}/{}",
                    scene.index,
                    scenes.len()
                ));
                images.push(SceneImage {
                    scene_index: scene.index,
                    path,
                });
            }
            None => {
                logger.log_warning(&format!("Skipping scene {} after image failures", scene.index));
            }
        }
    }

    if images.is_empty() {
        return Err(WorkerError::processing_failed(
            "failed to generate any images",
        ));
    }

    Ok(images)
}

async fn generate_with_retry(
    provider: &dyn ImageProvider,
    prompt: &str,
    output_path: &std::path::Path,
    scene_index: usize,
    logger: &JobLogger,
) -> Option<PathBuf> {
    for attempt in 1..=MAX_ATTEMPTS {
        match provider.generate(prompt, output_path).await {
            Ok(path) => return Some(path),
            Err(e) => match backoff_delay(&e, attempt) {
                Some(delay) => {
                    logger.log_warning(&format!(
                        "Image attempt {}/{} for scene {} failed ({}), retrying in {}s",
                        attempt,
                        MAX_ATTEMPTS,
                        scene_index,
                        e,
                        delay.as_secs()
                    ));
                    tokio::time::sleep(delay).await;
                }
                None => {
                    logger.log_warning(&format!(
                        "Image attempt {}/{} for scene {} failed permanently: {}",
                        attempt, MAX_ATTEMPTS, scene_index, e
                    ));
                    return None;
                }
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingProvider {
        fail_scenes: Vec<usize>,
        error: fn() -> ProviderError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ImageProvider for FailingProvider {
        async fn generate(
            &self,
            _prompt: &str,
            output_path: &Path,
        ) -> fabula_providers::ProviderResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = output_path.file_name().and_then(|n| n.to_str()).unwrap();
            let failing = self
                .fail_scenes
                .iter()
                .any(|i| name == format!("scene_{:03}.png", i));
            if failing {
                Err((self.error)())
            } else {
                Ok(output_path.to_path_buf())
            }
        }
    }

    fn scenes(n: usize) -> Vec<Scene> {
        (1..=n).map(|i| Scene::new(i, format!("Scene {i}."))).collect()
    }

    fn workspace() -> (tempfile::TempDir, JobWorkspace) {
        let base = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(base.path().to_str().unwrap(), "s", "j").unwrap();
        (base, ws)
    }

    #[test]
    fn test_backoff_schedule_for_rate_limits() {
        let e = ProviderError::RateLimited("429".to_string());
        assert_eq!(backoff_delay(&e, 1), Some(Duration::from_secs(2)));
        assert_eq!(backoff_delay(&e, 2), Some(Duration::from_secs(4)));
        assert_eq!(backoff_delay(&e, 3), None);
    }

    #[test]
    fn test_backoff_schedule_for_transient_failures() {
        let e = ProviderError::transient("boom");
        assert_eq!(backoff_delay(&e, 1), Some(Duration::from_secs(1)));
        assert_eq!(backoff_delay(&e, 2), Some(Duration::from_secs(2)));
        assert_eq!(backoff_delay(&e, 3), None);
    }

    #[test]
    fn test_invalid_prompt_is_not_retried() {
        let e = ProviderError::InvalidPrompt("bad".to_string());
        assert_eq!(backoff_delay(&e, 1), None);
    }

    #[tokio::test]
    async fn test_failed_scenes_are_skipped_in_order() {
        let (_base, ws) = workspace();
        let provider = FailingProvider {
            fail_scenes: vec![2, 4],
            error: || ProviderError::InvalidPrompt("rejected".to_string()),
            calls: AtomicU32::new(0),
        };
        let logger = JobLogger::new("j", "images");

        let images = generate_scene_images(&provider, &scenes(5), &ws, &logger)
            .await
            .unwrap();

        let indices: Vec<usize> = images.iter().map(|i| i.scene_index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
        // InvalidPrompt does not retry, so one call per scene
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_three_times() {
        let (_base, ws) = workspace();
        let provider = FailingProvider {
            fail_scenes: vec![1],
            error: || ProviderError::transient("timeout"),
            calls: AtomicU32::new(0),
        };
        let logger = JobLogger::new("j", "images");

        let result = generate_scene_images(&provider, &scenes(1), &ws, &logger).await;

        assert!(result.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_all_scenes_failing_is_fatal() {
        let (_base, ws) = workspace();
        let provider = FailingProvider {
            fail_scenes: vec![1, 2, 3],
            error: || ProviderError::InvalidPrompt("rejected".to_string()),
            calls: AtomicU32::new(0),
        };
        let logger = JobLogger::new("j", "images");

        let result = generate_scene_images(&provider, &scenes(3), &ws, &logger).await;

        assert!(matches!(result, Err(WorkerError::ProcessingFailed(_))));
    }
}
