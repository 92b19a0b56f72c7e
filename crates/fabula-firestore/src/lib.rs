//! Firestore REST client and the story document repository.

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod story_repo;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::{with_retry, RetryConfig};
pub use story_repo::StoryRepository;
