//! Job store seam.
//!
//! The orchestrator persists story state through this trait so tests
//! can run against an in-memory store.

use async_trait::async_trait;
use fabula_firestore::{FirestoreClient, StoryRepository};
use fabula_models::{StoryId, StoryRecord, StoryStatus};

use crate::error::WorkerResult;

/// Persistence for story records.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Fetch a record by ID.
    async fn get(&self, id: &StoryId) -> WorkerResult<Option<StoryRecord>>;

    /// Persist the record's current state.
    async fn save(&self, record: &StoryRecord) -> WorkerResult<()>;
}

/// Firestore-backed job store.
pub struct FirestoreStoryStore {
    repo: StoryRepository,
}

impl FirestoreStoryStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            repo: StoryRepository::new(client),
        }
    }
}

#[async_trait]
impl StoryStore for FirestoreStoryStore {
    async fn get(&self, id: &StoryId) -> WorkerResult<Option<StoryRecord>> {
        Ok(self.repo.get(id).await?)
    }

    async fn save(&self, record: &StoryRecord) -> WorkerResult<()> {
        match record.status {
            StoryStatus::Completed => self.repo.mark_completed(record).await?,
            StoryStatus::Failed => self.repo.mark_failed(record).await?,
            StoryStatus::Processing => self.repo.update(record).await?,
        }
        Ok(())
    }
}
