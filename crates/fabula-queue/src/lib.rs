//! Redis Streams work queue for story generation jobs.

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::GenerateStoryJob;
pub use queue::{JobQueue, QueueConfig};
