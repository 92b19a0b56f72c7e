//! Media-generation provider clients for the Fabula backend.
//!
//! Each provider is modeled as a narrow capability trait so the worker
//! can substitute stubs in tests.

pub mod error;
pub mod image;
pub mod speech;

pub use error::{ProviderError, ProviderResult};
pub use image::{FluxImageClient, ImageClientConfig, ImageProvider};
pub use speech::{
    estimate_duration, SpeechClient, SpeechClientConfig, SpeechProvider,
    DEFAULT_WORDS_PER_MINUTE,
};
