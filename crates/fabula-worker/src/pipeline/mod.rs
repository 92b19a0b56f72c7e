//! Story generation pipeline stages.

pub mod images;
pub mod narration;
pub mod publish;
pub mod segment;
pub mod video;

pub use images::{generate_scene_images, SceneImage};
pub use narration::synthesize_narration;
pub use publish::{publish_assets, PublishedAssets};
pub use segment::split_into_scenes;
pub use video::{assemble_video, FfmpegAssembler, VideoAssembler};
