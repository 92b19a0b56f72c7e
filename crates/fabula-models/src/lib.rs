//! Shared data models for the Fabula backend.
//!
//! These types are serialized into the job store, onto the work queue,
//! and across crate boundaries, so they live in one dependency-free crate.

pub mod request;
pub mod scene;
pub mod story;

pub use request::{StoryRequest, ValidationError};
pub use scene::Scene;
pub use story::{AssetHandles, StoryId, StoryRecord, StoryStatus};
