//! Story record definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a story.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct StoryId(pub String);

impl StoryId {
    /// Generate a new random story ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline status of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    /// Generation pipeline is running (set at creation, before dispatch)
    #[default]
    Processing,
    /// Pipeline finished; whatever assets exist are published
    Completed,
    /// Pipeline aborted; `error_message` explains why
    Failed,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Processing => "processing",
            StoryStatus::Completed => "completed",
            StoryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StoryStatus::Completed | StoryStatus::Failed)
    }

    /// Parse from the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(StoryStatus::Processing),
            "completed" => Some(StoryStatus::Completed),
            "failed" => Some(StoryStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-side handles for published assets, kept so a re-run or a
/// deletion can remove superseded objects from the durable store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssetHandles {
    /// Handles for published scene images, in scene order
    #[serde(default)]
    pub images: Vec<String>,
    /// Handle for the narration track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Handle for the compiled video
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
}

impl AssetHandles {
    /// All handles as a flat list.
    pub fn all(&self) -> Vec<String> {
        let mut out = self.images.clone();
        out.extend(self.audio.iter().cloned());
        out.extend(self.video.iter().cloned());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.audio.is_none() && self.video.is_none()
    }
}

/// A story generation request and its published outputs.
///
/// One document per story in the job store. Asset fields are
/// write-once per pipeline run: a re-run clears them before the new
/// run's publish step repopulates them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoryRecord {
    /// Unique story ID
    pub id: StoryId,

    /// Owning user ID
    pub user_id: String,

    /// Story title
    pub title: String,

    /// Full prompt text the pipeline consumes
    pub prompt_text: String,

    /// Pipeline status
    #[serde(default)]
    pub status: StoryStatus,

    /// Published image URLs, in scene order
    #[serde(default)]
    pub image_urls: Vec<String>,

    /// Published narration URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    /// Published video URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Store-side handles for the published assets
    #[serde(default)]
    pub asset_handles: AssetHandles,

    /// Error message (set only when status is `failed`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp, refreshed on every persisted mutation
    pub updated_at: DateTime<Utc>,
}

impl StoryRecord {
    /// Create a new record in the `processing` state.
    pub fn new(user_id: impl Into<String>, title: impl Into<String>, prompt_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: StoryId::new(),
            user_id: user_id.into(),
            title: title.into(),
            prompt_text: prompt_text.into(),
            status: StoryStatus::Processing,
            image_urls: Vec::new(),
            audio_url: None,
            video_url: None,
            asset_handles: AssetHandles::default(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Begin a fresh run over the same story ID, superseding prior outputs.
    pub fn supersede(mut self, title: Option<String>, prompt_text: impl Into<String>) -> Self {
        if let Some(t) = title {
            self.title = t;
        }
        self.prompt_text = prompt_text.into();
        self.status = StoryStatus::Processing;
        self.image_urls.clear();
        self.audio_url = None;
        self.video_url = None;
        self.asset_handles = AssetHandles::default();
        self.error_message = None;
        self.updated_at = Utc::now();
        self
    }

    /// Mark the record completed with whatever assets were published.
    pub fn complete(
        mut self,
        image_urls: Vec<String>,
        audio_url: Option<String>,
        video_url: Option<String>,
        handles: AssetHandles,
    ) -> Self {
        self.status = StoryStatus::Completed;
        self.image_urls = image_urls;
        self.audio_url = audio_url;
        self.video_url = video_url;
        self.asset_handles = handles;
        self.error_message = None;
        self.updated_at = Utc::now();
        self
    }

    /// Mark the record failed.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = StoryStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let record = StoryRecord::new("user123", "The Lighthouse", "A keeper finds a map.");
        assert_eq!(record.status, StoryStatus::Processing);
        assert!(record.image_urls.is_empty());
        assert!(record.audio_url.is_none());
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_record_completion() {
        let record = StoryRecord::new("user123", "Title", "Prompt text here.");
        let handles = AssetHandles {
            images: vec!["img/1".into()],
            audio: Some("aud/1".into()),
            video: None,
        };
        let done = record.complete(vec!["https://cdn/1.png".into()], Some("https://cdn/n.mp3".into()), None, handles);

        assert_eq!(done.status, StoryStatus::Completed);
        assert!(done.status.is_terminal());
        assert_eq!(done.image_urls.len(), 1);
        assert!(done.video_url.is_none());
        assert_eq!(done.asset_handles.all().len(), 2);
    }

    #[test]
    fn test_record_failure() {
        let record = StoryRecord::new("user123", "Title", "Prompt text here.");
        let failed = record.fail("no images produced");
        assert_eq!(failed.status, StoryStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("no images produced"));
    }

    #[test]
    fn test_supersede_clears_assets() {
        let record = StoryRecord::new("user123", "Title", "Old prompt.");
        let done = record.complete(
            vec!["https://cdn/1.png".into()],
            Some("https://cdn/n.mp3".into()),
            Some("https://cdn/v.mp4".into()),
            AssetHandles::default(),
        );
        let rerun = done.supersede(Some("New title".into()), "New prompt.");

        assert_eq!(rerun.status, StoryStatus::Processing);
        assert_eq!(rerun.title, "New title");
        assert_eq!(rerun.prompt_text, "New prompt.");
        assert!(rerun.image_urls.is_empty());
        assert!(rerun.audio_url.is_none());
        assert!(rerun.video_url.is_none());
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [StoryStatus::Processing, StoryStatus::Completed, StoryStatus::Failed] {
            assert_eq!(StoryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StoryStatus::parse("queued"), None);
    }
}
