//! Job types for the queue.

use chrono::{DateTime, Utc};
use fabula_models::StoryId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job to run the full generation pipeline for one story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateStoryJob {
    /// Unique job ID (one per dispatch, not per story)
    pub job_id: String,
    /// Story the pipeline writes to
    pub story_id: StoryId,
    /// Owning user ID
    pub user_id: String,
    /// Story title
    pub title: String,
    /// Prompt text the pipeline consumes
    pub prompt_text: String,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl GenerateStoryJob {
    /// Create a new generation job.
    pub fn new(
        story_id: StoryId,
        user_id: impl Into<String>,
        title: impl Into<String>,
        prompt_text: impl Into<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            story_id,
            user_id: user_id.into(),
            title: title.into(),
            prompt_text: prompt_text.into(),
            created_at: Utc::now(),
        }
    }

    /// Idempotency key for deduplication. Keyed by story ID so that at
    /// most one run per story is live at a time; the worker clears the
    /// key when the run reaches a terminal state.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}", self.story_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_uses_story_id() {
        let story_id = StoryId::from_string("abc-123");
        let job = GenerateStoryJob::new(story_id, "user1", "Title", "Prompt text.");
        assert_eq!(job.idempotency_key(), "generate:abc-123");
    }

    #[test]
    fn test_jobs_for_same_story_share_key() {
        let a = GenerateStoryJob::new(StoryId::from_string("s1"), "u", "T", "P");
        let b = GenerateStoryJob::new(StoryId::from_string("s1"), "u", "T2", "P2");
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn test_job_serialization_round_trip() {
        let job = GenerateStoryJob::new(StoryId::from_string("s1"), "u", "Title", "Prompt.");
        let json = serde_json::to_string(&job).unwrap();
        let back: GenerateStoryJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, job.job_id);
        assert_eq!(back.story_id, job.story_id);
        assert_eq!(back.prompt_text, job.prompt_text);
    }
}
