//! FFmpeg-based media processing for the Fabula backend.
//!
//! Wraps the `ffmpeg`/`ffprobe` binaries behind a typed command
//! builder, a prober, and the video assembly pipeline.

pub mod assemble;
pub mod command;
pub mod error;
pub mod probe;

pub use assemble::{
    assemble, AssembledVideo, AssemblyOptions, AssemblyOutcome, DEFAULT_FPS, DEFAULT_RESOLUTION,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_media, MediaInfo};
