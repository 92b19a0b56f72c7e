//! Video assembly stage.
//!
//! Runs only when at least one image and a narration track exist.
//! Assembly failures degrade the story to images plus audio.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fabula_media::{AssembledVideo, AssemblyOptions, MediaResult};

use crate::logging::JobLogger;
use crate::pipeline::images::SceneImage;
use crate::workspace::JobWorkspace;

/// Video assembly capability, seam for the FFmpeg-backed implementation.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    async fn assemble(
        &self,
        image_paths: &[PathBuf],
        audio_path: &Path,
        output_path: &Path,
    ) -> MediaResult<AssembledVideo>;
}

/// FFmpeg-backed assembler.
pub struct FfmpegAssembler {
    options: AssemblyOptions,
}

impl FfmpegAssembler {
    pub fn new(options: AssemblyOptions) -> Self {
        Self { options }
    }
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new(AssemblyOptions::default())
    }
}

#[async_trait]
impl VideoAssembler for FfmpegAssembler {
    async fn assemble(
        &self,
        image_paths: &[PathBuf],
        audio_path: &Path,
        output_path: &Path,
    ) -> MediaResult<AssembledVideo> {
        fabula_media::assemble(image_paths, audio_path, output_path, &self.options).await
    }
}

/// Assemble the story video when its inputs exist. Returns `None`
/// when assembly was skipped or failed.
pub async fn assemble_video(
    assembler: &dyn VideoAssembler,
    images: &[SceneImage],
    audio_path: Option<&Path>,
    workspace: &JobWorkspace,
    logger: &JobLogger,
) -> Option<PathBuf> {
    let audio_path = match audio_path {
        Some(p) if !images.is_empty() => p,
        _ => {
            logger.log_progress("Skipping video assembly: missing images or narration");
            return None;
        }
    };

    let image_paths: Vec<PathBuf> = images.iter().map(|i| i.path.clone()).collect();
    let output_path = workspace.video_path();

    match assembler
        .assemble(&image_paths, audio_path, &output_path)
        .await
    {
        Ok(video) => {
            logger.log_progress(&format!("Assembled video ({})", video.outcome.as_str()));
            Some(video.path)
        }
        Err(e) => {
            logger.log_warning(&format!("Video assembly failed, continuing without video: {e}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_media::{AssemblyOutcome, MediaError};

    struct StubAssembler {
        fail: bool,
    }

    #[async_trait]
    impl VideoAssembler for StubAssembler {
        async fn assemble(
            &self,
            _image_paths: &[PathBuf],
            _audio_path: &Path,
            output_path: &Path,
        ) -> MediaResult<AssembledVideo> {
            if self.fail {
                Err(MediaError::internal("render failed"))
            } else {
                Ok(AssembledVideo {
                    path: output_path.to_path_buf(),
                    outcome: AssemblyOutcome::Transitioned,
                })
            }
        }
    }

    fn workspace() -> (tempfile::TempDir, JobWorkspace) {
        let base = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(base.path().to_str().unwrap(), "s", "j").unwrap();
        (base, ws)
    }

    fn one_image(ws: &JobWorkspace) -> Vec<SceneImage> {
        vec![SceneImage {
            scene_index: 1,
            path: ws.image_path(1),
        }]
    }

    #[tokio::test]
    async fn test_assembles_when_inputs_present() {
        let (_base, ws) = workspace();
        let logger = JobLogger::new("j", "video");
        let audio = ws.narration_path();

        let video = assemble_video(
            &StubAssembler { fail: false },
            &one_image(&ws),
            Some(&audio),
            &ws,
            &logger,
        )
        .await;

        assert_eq!(video, Some(ws.video_path()));
    }

    #[tokio::test]
    async fn test_skipped_without_narration() {
        let (_base, ws) = workspace();
        let logger = JobLogger::new("j", "video");

        let video =
            assemble_video(&StubAssembler { fail: false }, &one_image(&ws), None, &ws, &logger)
                .await;

        assert!(video.is_none());
    }

    #[tokio::test]
    async fn test_failure_degrades_to_none() {
        let (_base, ws) = workspace();
        let logger = JobLogger::new("j", "video");
        let audio = ws.narration_path();

        let video = assemble_video(
            &StubAssembler { fail: true },
            &one_image(&ws),
            Some(&audio),
            &ws,
            &logger,
        )
        .await;

        assert!(video.is_none());
    }
}
