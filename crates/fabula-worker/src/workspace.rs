//! Per-job scratch space.
//!
//! Every pipeline run gets its own directory under the worker's work
//! dir. The directory is removed when the guard drops, so scratch
//! files cannot outlive the run regardless of how it ended.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::WorkerResult;

/// Owned scratch directory for one pipeline run.
///
/// Dropping the guard deletes the directory and everything in it.
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Create the scratch directory for a job.
    pub fn create(work_dir: &str, story_id: &str, job_id: &str) -> WorkerResult<Self> {
        let root = Path::new(work_dir).join(format!("{}-{}", story_id, job_id));
        std::fs::create_dir_all(&root)?;
        debug!("Created job workspace: {}", root.display());
        Ok(Self { root })
    }

    /// Root of the scratch directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path for the image of a 1-based scene index.
    pub fn image_path(&self, scene_index: usize) -> PathBuf {
        self.root.join(format!("scene_{:03}.png", scene_index))
    }

    /// Path for the narration track.
    pub fn narration_path(&self) -> PathBuf {
        self.root.join("narration.mp3")
    }

    /// Path for the assembled video.
    pub fn video_path(&self) -> PathBuf {
        self.root.join("story.mp4")
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove job workspace {}: {}", self.root.display(), e);
            }
        } else {
            debug!("Removed job workspace: {}", self.root.display());
        }
    }
}
