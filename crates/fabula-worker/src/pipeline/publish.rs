//! Asset publishing.
//!
//! Uploads each produced asset independently and collects the public
//! URLs and deletion handles that survive. An individual upload
//! failure costs that asset, not the run.

use std::path::Path;

use fabula_models::{AssetHandles, StoryId};
use fabula_storage::AssetStore;

use crate::logging::JobLogger;
use crate::pipeline::images::SceneImage;

/// URLs and handles of everything that made it to the asset store.
#[derive(Debug, Default)]
pub struct PublishedAssets {
    pub image_urls: Vec<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub handles: AssetHandles,
}

/// Publish the run's assets under `stories/{story_id}/...`.
pub async fn publish_assets(
    store: &dyn AssetStore,
    story_id: &StoryId,
    images: &[SceneImage],
    audio_path: Option<&Path>,
    video_path: Option<&Path>,
    logger: &JobLogger,
) -> PublishedAssets {
    let mut published = PublishedAssets::default();

    let image_folder = format!("stories/{}/images", story_id);
    for image in images {
        match store.upload(&image.path, &image_folder, story_id.as_str()).await {
            Ok(asset) => {
                published.image_urls.push(asset.url);
                published.handles.images.push(asset.handle);
            }
            Err(e) => {
                logger.log_warning(&format!(
                    "Failed to publish image for scene {}: {}",
                    image.scene_index, e
                ));
            }
        }
    }

    if let Some(path) = audio_path {
        let folder = format!("stories/{}/audio", story_id);
        match store.upload(path, &folder, story_id.as_str()).await {
            Ok(asset) => {
                published.audio_url = Some(asset.url);
                published.handles.audio = Some(asset.handle);
            }
            Err(e) => {
                logger.log_warning(&format!("Failed to publish narration: {e}"));
            }
        }
    }

    if let Some(path) = video_path {
        let folder = format!("stories/{}/video", story_id);
        match store.upload(path, &folder, story_id.as_str()).await {
            Ok(asset) => {
                published.video_url = Some(asset.url);
                published.handles.video = Some(asset.handle);
            }
            Err(e) => {
                logger.log_warning(&format!("Failed to publish video: {e}"));
            }
        }
    }

    logger.log_progress(&format!(
        "Published {} images, audio: {}, video: {}",
        published.image_urls.len(),
        published.audio_url.is_some(),
        published.video_url.is_some()
    ));

    published
}
