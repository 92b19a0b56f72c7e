//! Story generation worker.
//!
//! This crate provides:
//! - Job executor consuming generation jobs from the queue
//! - The scene/image/narration/video pipeline stages
//! - Terminal-state bookkeeping in the job store
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod store;
pub mod workspace;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{process_story, ProcessingContext};
pub use store::{FirestoreStoryStore, StoryStore};
pub use workspace::JobWorkspace;
