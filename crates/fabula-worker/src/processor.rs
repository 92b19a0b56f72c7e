//! Story generation orchestration.
//!
//! Drives one job through segmentation, image generation, narration,
//! video assembly and publishing, then records the terminal state in
//! the job store. Scratch space is cleaned up on every exit path.

use std::sync::Arc;

use fabula_media::AssemblyOptions;
use fabula_models::StoryRequest;
use fabula_providers::{FluxImageClient, ImageProvider, SpeechClient, SpeechProvider};
use fabula_queue::GenerateStoryJob;
use fabula_storage::{AssetStore, S3AssetStore};
use tracing::Instrument;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::pipeline::{
    assemble_video, generate_scene_images, publish_assets, split_into_scenes,
    synthesize_narration, FfmpegAssembler, PublishedAssets, VideoAssembler,
};
use crate::store::{FirestoreStoryStore, StoryStore};
use crate::workspace::JobWorkspace;

/// Shared collaborators for story processing.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn StoryStore>,
    pub images: Arc<dyn ImageProvider>,
    pub speech: Arc<dyn SpeechProvider>,
    pub assets: Arc<dyn AssetStore>,
    pub assembler: Arc<dyn VideoAssembler>,
}

impl ProcessingContext {
    /// Create a context wired to the real providers and stores.
    pub async fn new(config: WorkerConfig) -> WorkerResult<Self> {
        fabula_media::check_ffmpeg()?;
        fabula_media::check_ffprobe()?;

        let firestore = fabula_firestore::FirestoreClient::from_env().await?;
        let store = Arc::new(FirestoreStoryStore::new(firestore));
        let images = Arc::new(FluxImageClient::from_env()?);
        let speech = Arc::new(SpeechClient::from_env()?);
        let assets = Arc::new(S3AssetStore::from_env().await?);
        let assembler = Arc::new(FfmpegAssembler::new(AssemblyOptions::default()));

        Ok(Self {
            config,
            store,
            images,
            speech,
            assets,
            assembler,
        })
    }

    /// Create a context from explicit collaborators.
    pub fn with_components(
        config: WorkerConfig,
        store: Arc<dyn StoryStore>,
        images: Arc<dyn ImageProvider>,
        speech: Arc<dyn SpeechProvider>,
        assets: Arc<dyn AssetStore>,
        assembler: Arc<dyn VideoAssembler>,
    ) -> Self {
        Self {
            config,
            store,
            images,
            speech,
            assets,
            assembler,
        }
    }
}

/// Process one generation job end to end.
///
/// The story record always reaches a terminal state: `completed` with
/// whatever assets were published, or `failed` with an error message.
pub async fn process_story(ctx: &ProcessingContext, job: &GenerateStoryJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, "story_generation");
    logger.log_start(&format!("story {} ({})", job.story_id, job.title));

    let record = ctx
        .store
        .get(&job.story_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed(format!("story record {} not found", job.story_id)))?;

    // A re-run over an existing story supersedes its prior outputs:
    // remove the old assets from the store and clear the record's URLs
    // before the new run publishes anything.
    let record = if record.asset_handles.is_empty() {
        record
    } else {
        let prior = record.asset_handles.all();
        match ctx.assets.delete_assets(&prior).await {
            Ok(n) => logger.log_progress(&format!("Removed {n} superseded assets")),
            Err(e) => logger.log_warning(&format!("Failed to remove superseded assets: {e}")),
        }
        let cleared = record.supersede(Some(job.title.clone()), job.prompt_text.clone());
        ctx.store.save(&cleared).await?;
        cleared
    };

    let workspace = JobWorkspace::create(&ctx.config.work_dir, job.story_id.as_str(), &job.job_id)?;

    let outcome = match tokio::time::timeout(
        ctx.config.job_timeout,
        run_pipeline(ctx, job, &workspace, &logger).instrument(logger.create_span()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(WorkerError::job_failed(format!(
            "timed out after {}s",
            ctx.config.job_timeout.as_secs()
        ))),
    };

    match outcome {
        Ok(published) => {
            let updated = record.complete(
                published.image_urls,
                published.audio_url,
                published.video_url,
                published.handles,
            );
            ctx.store.save(&updated).await?;
            logger.log_completion(&format!(
                "story {} with {} images",
                job.story_id,
                updated.image_urls.len()
            ));
            Ok(())
        }
        Err(e) => {
            logger.log_error(&format!("story {} failed: {}", job.story_id, e));
            let updated = record.fail(e.to_string());
            if let Err(save_err) = ctx.store.save(&updated).await {
                logger.log_error(&format!("failed to record failure state: {save_err}"));
            }
            Err(e)
        }
    }
}

async fn run_pipeline(
    ctx: &ProcessingContext,
    job: &GenerateStoryJob,
    workspace: &JobWorkspace,
    logger: &JobLogger,
) -> WorkerResult<PublishedAssets> {
    // Queue payloads come from outside this process; re-check them so a
    // malformed prompt never reaches the providers
    let request = StoryRequest {
        title: job.title.clone(),
        prompt_text: job.prompt_text.clone(),
    }
    .into_validated()
    .map_err(|e| WorkerError::job_failed(e.to_string()))?;

    let scenes = split_into_scenes(&request.prompt_text, ctx.config.max_scenes);
    if scenes.is_empty() {
        return Err(WorkerError::processing_failed("prompt produced no scenes"));
    }
    logger.log_progress(&format!("Split prompt into {} scenes", scenes.len()));

    let images = generate_scene_images(ctx.images.as_ref(), &scenes, workspace, logger).await?;

    let narration = synthesize_narration(
        ctx.speech.as_ref(),
        &request.prompt_text,
        &ctx.config.narration_language,
        workspace,
        logger,
    )
    .await;

    let video = assemble_video(
        ctx.assembler.as_ref(),
        &images,
        narration.as_deref(),
        workspace,
        logger,
    )
    .await;

    Ok(publish_assets(
        ctx.assets.as_ref(),
        &job.story_id,
        &images,
        narration.as_deref(),
        video.as_deref(),
        logger,
    )
    .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fabula_media::{AssembledVideo, AssemblyOutcome, MediaResult};
    use fabula_models::{StoryId, StoryRecord, StoryStatus};
    use fabula_providers::{ProviderError, ProviderResult};
    use fabula_storage::{StorageResult, UploadedAsset};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MemoryStore {
        record: Mutex<Option<StoryRecord>>,
    }

    impl MemoryStore {
        fn with_record(record: StoryRecord) -> Self {
            Self {
                record: Mutex::new(Some(record)),
            }
        }

        fn current(&self) -> StoryRecord {
            self.record.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl StoryStore for MemoryStore {
        async fn get(&self, id: &StoryId) -> WorkerResult<Option<StoryRecord>> {
            let guard = self.record.lock().unwrap();
            Ok(guard.clone().filter(|r| &r.id == id))
        }

        async fn save(&self, record: &StoryRecord) -> WorkerResult<()> {
            *self.record.lock().unwrap() = Some(record.clone());
            Ok(())
        }
    }

    struct StubImages {
        fail_scenes: Vec<usize>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ImageProvider for StubImages {
        async fn generate(&self, _prompt: &str, output_path: &Path) -> ProviderResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = output_path.file_name().and_then(|n| n.to_str()).unwrap();
            let failing = self
                .fail_scenes
                .iter()
                .any(|i| name == format!("scene_{:03}.png", i));
            if failing {
                Err(ProviderError::InvalidPrompt("rejected".to_string()))
            } else {
                Ok(output_path.to_path_buf())
            }
        }
    }

    struct StubSpeech {
        fail: bool,
    }

    #[async_trait]
    impl SpeechProvider for StubSpeech {
        async fn synthesize(
            &self,
            _text: &str,
            _lang: &str,
            output_path: &Path,
        ) -> ProviderResult<PathBuf> {
            if self.fail {
                Err(ProviderError::transient("tts down"))
            } else {
                Ok(output_path.to_path_buf())
            }
        }
    }

    #[derive(Default)]
    struct StubAssets {
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AssetStore for StubAssets {
        async fn upload(
            &self,
            local_path: &Path,
            folder: &str,
            _story_id: &str,
        ) -> StorageResult<UploadedAsset> {
            let name = local_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let key = format!("{folder}/{name}");
            Ok(UploadedAsset {
                url: format!("https://cdn.test/{key}"),
                handle: key,
            })
        }

        async fn delete_assets(&self, handles: &[String]) -> StorageResult<u32> {
            self.deleted.lock().unwrap().extend_from_slice(handles);
            Ok(handles.len() as u32)
        }
    }

    struct StubAssembler;

    #[async_trait]
    impl VideoAssembler for StubAssembler {
        async fn assemble(
            &self,
            _image_paths: &[PathBuf],
            _audio_path: &Path,
            output_path: &Path,
        ) -> MediaResult<AssembledVideo> {
            Ok(AssembledVideo {
                path: output_path.to_path_buf(),
                outcome: AssemblyOutcome::Transitioned,
            })
        }
    }

    struct Fixture {
        _work_dir: tempfile::TempDir,
        work_root: PathBuf,
        store: Arc<MemoryStore>,
        images: Arc<StubImages>,
        assets: Arc<StubAssets>,
        job: GenerateStoryJob,
    }

    fn fixture(
        prompt: &str,
        fail_scenes: Vec<usize>,
        speech_fails: bool,
    ) -> (Fixture, ProcessingContext) {
        let mut record = StoryRecord::new("user-1", "Title", prompt);
        record.id = StoryId::from_string("story-1");
        fixture_with_record(record, prompt, fail_scenes, speech_fails)
    }

    fn fixture_with_record(
        record: StoryRecord,
        prompt: &str,
        fail_scenes: Vec<usize>,
        speech_fails: bool,
    ) -> (Fixture, ProcessingContext) {
        let work_dir = tempfile::tempdir().unwrap();
        let work_root = work_dir.path().to_path_buf();

        let story_id = record.id.clone();
        let store = Arc::new(MemoryStore::with_record(record));
        let images = Arc::new(StubImages {
            fail_scenes,
            calls: AtomicU32::new(0),
        });
        let assets = Arc::new(StubAssets::default());

        let job = GenerateStoryJob::new(story_id, "user-1", "Title", prompt);

        let config = WorkerConfig {
            work_dir: work_root.to_str().unwrap().to_string(),
            ..WorkerConfig::default()
        };

        let ctx = ProcessingContext::with_components(
            config,
            store.clone(),
            images.clone(),
            Arc::new(StubSpeech {
                fail: speech_fails,
            }),
            assets.clone(),
            Arc::new(StubAssembler),
        );

        (
            Fixture {
                _work_dir: work_dir,
                work_root,
                store,
                images,
                assets,
                job,
            },
            ctx,
        )
    }

    const PROMPT: &str = "One. Two. Three. Four. Five.";

    #[tokio::test]
    async fn test_full_run_completes_story() {
        let (fx, ctx) = fixture(PROMPT, vec![], false);

        process_story(&ctx, &fx.job).await.unwrap();

        let record = fx.store.current();
        assert_eq!(record.status, StoryStatus::Completed);
        assert_eq!(record.image_urls.len(), 5);
        assert!(record.audio_url.is_some());
        assert!(record.video_url.is_some());
        assert!(record.error_message.is_none());
        assert_eq!(record.asset_handles.all().len(), 7);
    }

    #[tokio::test]
    async fn test_partial_image_failure_keeps_survivors_in_order() {
        let (fx, ctx) = fixture(PROMPT, vec![2, 4], false);

        process_story(&ctx, &fx.job).await.unwrap();

        let record = fx.store.current();
        assert_eq!(record.status, StoryStatus::Completed);
        assert_eq!(record.image_urls.len(), 3);
        assert!(record.image_urls[0].contains("scene_001"));
        assert!(record.image_urls[1].contains("scene_003"));
        assert!(record.image_urls[2].contains("scene_005"));
    }

    #[tokio::test]
    async fn test_all_images_failing_marks_story_failed() {
        let (fx, ctx) = fixture(PROMPT, vec![1, 2, 3, 4, 5], false);

        let result = process_story(&ctx, &fx.job).await;

        assert!(result.is_err());
        let record = fx.store.current();
        assert_eq!(record.status, StoryStatus::Failed);
        assert!(record
            .error_message
            .as_deref()
            .is_some_and(|m| !m.is_empty()));
        assert!(record.image_urls.is_empty());
    }

    #[tokio::test]
    async fn test_narration_failure_degrades_gracefully() {
        let (fx, ctx) = fixture(PROMPT, vec![], true);

        process_story(&ctx, &fx.job).await.unwrap();

        let record = fx.store.current();
        assert_eq!(record.status, StoryStatus::Completed);
        assert_eq!(record.image_urls.len(), 5);
        assert!(record.audio_url.is_none());
        // No narration means no video either
        assert!(record.video_url.is_none());
    }

    #[tokio::test]
    async fn test_workspace_is_removed_on_success_and_failure() {
        let (fx, ctx) = fixture(PROMPT, vec![], false);
        process_story(&ctx, &fx.job).await.unwrap();
        assert!(std::fs::read_dir(&fx.work_root).unwrap().next().is_none());

        let (fx, ctx) = fixture(PROMPT, vec![1, 2, 3, 4, 5], false);
        let _ = process_story(&ctx, &fx.job).await;
        assert!(std::fs::read_dir(&fx.work_root).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_before_providers() {
        // fewer than five words fails request validation
        let (fx, ctx) = fixture("Too short.", vec![], false);

        let result = process_story(&ctx, &fx.job).await;

        assert!(matches!(result, Err(WorkerError::JobFailed(_))));
        assert_eq!(fx.images.calls.load(Ordering::SeqCst), 0);
        let record = fx.store.current();
        assert_eq!(record.status, StoryStatus::Failed);
        assert!(record
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("invalid request")));
    }

    #[tokio::test]
    async fn test_rerun_deletes_superseded_assets() {
        let mut record = StoryRecord::new("user-1", "Old title", "Old prompt.");
        record.id = StoryId::from_string("story-1");
        record = record.complete(
            vec!["https://cdn.test/old/scene_001.png".to_string()],
            None,
            None,
            fabula_models::AssetHandles {
                images: vec!["old/scene_001.png".to_string()],
                audio: None,
                video: None,
            },
        );
        let (fx, ctx) = fixture_with_record(record, PROMPT, vec![], false);

        process_story(&ctx, &fx.job).await.unwrap();

        assert_eq!(
            *fx.assets.deleted.lock().unwrap(),
            vec!["old/scene_001.png".to_string()]
        );
        let record = fx.store.current();
        assert_eq!(record.status, StoryStatus::Completed);
        assert!(record.image_urls.iter().all(|u| !u.contains("/old/")));
        assert_eq!(record.image_urls.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_record_fails_without_touching_store() {
        let (fx, ctx) = fixture(PROMPT, vec![], false);
        let other = GenerateStoryJob::new(
            StoryId::from_string("other-story"),
            "user-1",
            "Title",
            PROMPT,
        );

        let result = process_story(&ctx, &other).await;

        assert!(matches!(result, Err(WorkerError::JobFailed(_))));
        assert_eq!(fx.store.current().status, StoryStatus::Processing);
    }
}
