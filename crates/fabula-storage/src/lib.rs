//! Durable asset storage for the Fabula backend.

pub mod client;
pub mod error;

pub use client::{AssetStore, S3AssetStore, StoreConfig, UploadedAsset};
pub use error::{StorageError, StorageResult};
