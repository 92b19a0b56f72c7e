//! Video assembly: images + narration track → encoded video.
//!
//! The assembly pipeline renders a silent video from the ordered
//! images (crossfaded clips when possible, a plain slideshow
//! otherwise), then muxes it with the narration, stretching the video
//! timestamps when its length drifts from the audio's.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;

/// Default output resolution (width, height).
pub const DEFAULT_RESOLUTION: (u32, u32) = (1920, 1080);

/// Default output frame rate.
pub const DEFAULT_FPS: u32 = 30;

/// Durations closer than this are treated as matching (seconds).
const DURATION_TOLERANCE_SECS: f64 = 0.5;

const VIDEO_BITRATE: &str = "2M";
const AUDIO_BITRATE: &str = "192k";

/// How the silent video was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// Crossfade transitions between clips succeeded
    Transitioned,
    /// Transitions were skipped or failed; plain slideshow used
    Fallback,
}

impl AssemblyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyOutcome::Transitioned => "transitioned",
            AssemblyOutcome::Fallback => "fallback",
        }
    }
}

/// A finished assembly: the output path and which strategy produced it.
#[derive(Debug)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub outcome: AssemblyOutcome,
}

/// Options for [`assemble`].
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Crossfade between clips when more than one image is present
    pub transitions: bool,
    /// Output resolution (width, height)
    pub resolution: (u32, u32),
    /// Output frame rate
    pub fps: u32,
    /// Per-FFmpeg-invocation timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            transitions: true,
            resolution: DEFAULT_RESOLUTION,
            fps: DEFAULT_FPS,
            timeout_secs: 600,
        }
    }
}

/// Per-image display time derived from the narration length.
pub fn duration_per_image(audio_duration: f64, image_count: usize) -> f64 {
    audio_duration / image_count as f64
}

/// Crossfade length: 1s or a third of the per-image time, whichever is smaller.
pub fn transition_duration(per_image: f64) -> f64 {
    (per_image / 3.0).min(1.0)
}

/// Slideshow fade length: 0.5s or a quarter of the per-image time, whichever is smaller.
pub fn fade_duration(per_image: f64) -> f64 {
    (per_image / 4.0).min(0.5)
}

/// Speed scale to apply to the video stream so playback matches the
/// narration, or `None` when the durations already agree.
pub fn speed_factor(video_duration: f64, audio_duration: f64) -> Option<f64> {
    if (video_duration - audio_duration).abs() > DURATION_TOLERANCE_SECS {
        Some(video_duration / audio_duration)
    } else {
        None
    }
}

/// Assemble the ordered images and the narration track into a video at
/// `output_path`.
///
/// The caller guarantees at least one image and an existing audio
/// file; transition failures degrade to the slideshow path instead of
/// aborting.
pub async fn assemble(
    image_paths: &[PathBuf],
    audio_path: &Path,
    output_path: &Path,
    options: &AssemblyOptions,
) -> MediaResult<AssembledVideo> {
    if image_paths.is_empty() {
        return Err(MediaError::internal("at least one image is required"));
    }
    for path in image_paths {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.clone()));
        }
    }
    if !audio_path.exists() {
        return Err(MediaError::FileNotFound(audio_path.to_path_buf()));
    }

    let audio_duration = get_duration(audio_path).await?;
    let per_image = duration_per_image(audio_duration, image_paths.len());
    info!(
        images = image_paths.len(),
        audio_duration_secs = format!("{audio_duration:.2}"),
        per_image_secs = format!("{per_image:.2}"),
        "assembling video"
    );

    // Scratch space for intermediate clips and the silent video
    let scratch = TempDir::new()?;
    let silent_path = scratch.path().join("silent.mp4");

    let outcome = if options.transitions && image_paths.len() > 1 {
        match render_transitioned(image_paths, per_image, &silent_path, scratch.path(), options).await {
            Ok(()) => AssemblyOutcome::Transitioned,
            Err(err) => {
                warn!(error = %err, "transition assembly failed, falling back to slideshow");
                render_slideshow(image_paths, per_image, &silent_path, scratch.path(), options).await?;
                AssemblyOutcome::Fallback
            }
        }
    } else {
        render_slideshow(image_paths, per_image, &silent_path, scratch.path(), options).await?;
        AssemblyOutcome::Fallback
    };

    mux(&silent_path, audio_path, audio_duration, output_path, options).await?;

    Ok(AssembledVideo {
        path: output_path.to_path_buf(),
        outcome,
    })
}

/// Letterboxing filter for the target resolution.
fn scale_pad_filter(resolution: (u32, u32)) -> String {
    let (w, h) = resolution;
    format!("scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:-1:-1:color=black")
}

/// Build the xfade chain filter graph over `count` inputs. Each link
/// blends for `transition` seconds, offset `per_image - transition`
/// into the preceding clip.
fn xfade_filter_graph(count: usize, per_image: f64, transition: f64) -> String {
    let offset = per_image - transition;
    let mut graph = String::new();
    for i in 1..count {
        let src = if i == 1 {
            "[0]".to_string()
        } else {
            format!("[v{}]", i - 1)
        };
        graph.push_str(&format!(
            "{src}[{i}]xfade=transition=fade:duration={transition:.3}:offset={offset:.3}[v{i}];"
        ));
    }
    graph.pop(); // trailing semicolon
    graph
}

/// Render each image into a fixed-length clip, then chain them with
/// crossfades into a single silent video.
async fn render_transitioned(
    image_paths: &[PathBuf],
    per_image: f64,
    output: &Path,
    scratch: &Path,
    options: &AssemblyOptions,
) -> MediaResult<()> {
    let transition = transition_duration(per_image);
    let runner = FfmpegRunner::new().with_timeout(options.timeout_secs);

    let mut clips = Vec::with_capacity(image_paths.len());
    for (i, image) in image_paths.iter().enumerate() {
        let clip = scratch.join(format!("clip_{i}.mp4"));
        let cmd = FfmpegCommand::new(&clip)
            .input_with_args(
                image,
                [
                    "-loop".to_string(),
                    "1".to_string(),
                    "-t".to_string(),
                    format!("{per_image:.3}"),
                    "-framerate".to_string(),
                    options.fps.to_string(),
                ],
            )
            .video_filter(scale_pad_filter(options.resolution))
            .video_codec("libx264")
            .pixel_format("yuv420p")
            .duration(per_image);
        runner.run(&cmd).await?;
        clips.push(clip);
    }

    debug!(
        clips = clips.len(),
        transition_secs = format!("{transition:.2}"),
        "chaining clips with crossfades"
    );

    let mut cmd = FfmpegCommand::new(output);
    for clip in &clips {
        cmd = cmd.input(clip);
    }
    let cmd = cmd
        .filter_complex(xfade_filter_graph(clips.len(), per_image, transition))
        .map(format!("[v{}]", clips.len() - 1))
        .video_codec("libx264")
        .pixel_format("yuv420p");

    runner.run(&cmd).await
}

/// Render a plain slideshow via the concat demuxer.
async fn render_slideshow(
    image_paths: &[PathBuf],
    per_image: f64,
    output: &Path,
    scratch: &Path,
    options: &AssemblyOptions,
) -> MediaResult<()> {
    let filelist_path = scratch.join("slideshow.txt");
    tokio::fs::write(&filelist_path, concat_filelist(image_paths, per_image)).await?;

    let mut filter = scale_pad_filter(options.resolution);
    if image_paths.len() > 1 {
        let fade = fade_duration(per_image);
        filter.push_str(&format!(
            ",fade=t=in:d={fade:.3},fade=t=out:st={:.3}:d={fade:.3}",
            per_image - fade
        ));
    }

    let cmd = FfmpegCommand::new(output)
        .input_with_args(&filelist_path, ["-f", "concat", "-safe", "0"])
        .video_filter(filter)
        .video_codec("libx264")
        .pixel_format("yuv420p")
        .frame_rate(options.fps)
        .video_bitrate(VIDEO_BITRATE);

    FfmpegRunner::new()
        .with_timeout(options.timeout_secs)
        .run(&cmd)
        .await
}

/// Concat-demuxer file list: each image with its display duration, the
/// last image repeated so the final duration entry takes effect.
fn concat_filelist(image_paths: &[PathBuf], per_image: f64) -> String {
    let mut list = String::new();
    for path in image_paths {
        list.push_str(&format!("file '{}'\n", path.display()));
        list.push_str(&format!("duration {per_image:.3}\n"));
    }
    if let Some(last) = image_paths.last() {
        list.push_str(&format!("file '{}'\n", last.display()));
    }
    list
}

/// Mux the silent video with the narration, reconciling durations when
/// they drift by more than the tolerance.
async fn mux(
    video_path: &Path,
    audio_path: &Path,
    audio_duration: f64,
    output_path: &Path,
    options: &AssemblyOptions,
) -> MediaResult<()> {
    let video_duration = get_duration(video_path).await?;
    debug!(
        video_duration_secs = format!("{video_duration:.2}"),
        audio_duration_secs = format!("{audio_duration:.2}"),
        "muxing video with narration"
    );

    let mut cmd = FfmpegCommand::new(output_path).input(video_path).input(audio_path);

    if let Some(factor) = speed_factor(video_duration, audio_duration) {
        info!(speed_factor = format!("{factor:.4}"), "reconciling video duration to narration");
        cmd = cmd
            .filter_complex(format!("[0:v]setpts={factor:.6}*PTS[v]"))
            .map("[v]")
            .map("1:a");
    } else {
        cmd = cmd.map("0:v").map("1:a");
    }

    let cmd = cmd
        .video_codec("libx264")
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .video_bitrate(VIDEO_BITRATE)
        .output_args(["-shortest"]);

    FfmpegRunner::new()
        .with_timeout(options.timeout_secs)
        .run(&cmd)
        .await
}
