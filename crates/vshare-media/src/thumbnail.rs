//! Single-frame thumbnail extraction.

use std::path::Path;
use std::time::Duration;

use crate::command::{run_tool, FfmpegCommand, Tool};
use crate::error::{MediaError, MediaResult};

/// Default maximum thumbnail width in pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 1280;

/// Default `-q:v` value for the JPEG encoder.
pub const DEFAULT_JPEG_QUALITY: u8 = 2;

/// Output settings for extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOptions {
    /// Frames wider than this are scaled down, keeping aspect ratio
    pub max_width: u32,
    /// JPEG quality scale, 2..=31
    pub jpeg_quality: u8,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FrameOptions {
    /// Scale filter bounding the width; `-2` keeps height even.
    pub fn scale_filter(&self) -> String {
        format!("scale='min({},iw)':-2", self.max_width)
    }
}

/// Build the extraction command for one frame at `timecode_sec`.
pub fn frame_command(
    input: &Path,
    output: &Path,
    timecode_sec: u32,
    options: &FrameOptions,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(f64::from(timecode_sec))
        .single_frame()
        .video_filter(options.scale_filter())
        .jpeg_quality(options.jpeg_quality.clamp(2, 31))
        .log_level("error")
}

/// Extract a single JPEG frame from `input` at `timecode_sec` into `output`.
pub async fn extract_frame(
    ffmpeg: &Path,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    timecode_sec: u32,
    options: &FrameOptions,
    timeout: Duration,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let cmd = frame_command(input, output, timecode_sec, options);
    run_tool(Tool::Ffmpeg, ffmpeg, &cmd.build_args(), timeout).await?;

    // ffmpeg exits 0 without writing anything when seeking past the end
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(MediaError::tool_failed(
            Tool::Ffmpeg,
            format!("no frame written at {}s", timecode_sec),
            None,
            Some(0),
        )),
    }
}
