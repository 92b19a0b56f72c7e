//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Provider error: {0}")]
    Provider(#[from] fabula_providers::ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] fabula_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] fabula_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] fabula_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] fabula_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Provider(e) => e.is_retryable(),
            WorkerError::Firestore(e) => e.is_retryable(),
            WorkerError::Storage(_) | WorkerError::Queue(_) => true,
            _ => false,
        }
    }
}
