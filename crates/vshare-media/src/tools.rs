//! Media tool seam used by the thumbnail pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::MediaResult;
use crate::probe::probe_duration;
use crate::thumbnail::{extract_frame, FrameOptions};

/// Layer-provided binaries, checked before `PATH`.
pub const DEFAULT_FFMPEG_PATH: &str = "/opt/bin/ffmpeg";
pub const DEFAULT_FFPROBE_PATH: &str = "/opt/bin/ffprobe";

/// Resolved locations of the external binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    /// Resolve from `FFMPEG_PATH` / `FFPROBE_PATH`, the layer defaults, then `PATH`.
    pub fn from_env() -> Self {
        let ffmpeg = std::env::var("FFMPEG_PATH").ok();
        let ffprobe = std::env::var("FFPROBE_PATH").ok();
        Self {
            ffmpeg: resolve_tool(ffmpeg.as_deref(), DEFAULT_FFMPEG_PATH, "ffmpeg"),
            ffprobe: resolve_tool(ffprobe.as_deref(), DEFAULT_FFPROBE_PATH, "ffprobe"),
        }
    }
}

/// Pick a binary path: an override that exists, else the layer default if it
/// exists, else whatever `which` finds, else the bare program name.
pub fn resolve_tool(override_path: Option<&str>, layer_default: &str, program: &str) -> PathBuf {
    if let Some(p) = override_path.filter(|p| !p.is_empty()) {
        if Path::new(p).exists() {
            return PathBuf::from(p);
        }
        debug!("Ignoring {} override {}: file does not exist", program, p);
    }

    if Path::new(layer_default).exists() {
        return PathBuf::from(layer_default);
    }

    which::which(program).unwrap_or_else(|_| PathBuf::from(program))
}

/// Probe and frame-extraction operations the pipeline depends on.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Container duration of `input`, in seconds.
    async fn probe_duration(&self, input: &Path) -> MediaResult<f64>;

    /// Write one JPEG frame taken at `timecode_sec` to `output`.
    async fn extract_frame(&self, input: &Path, output: &Path, timecode_sec: u32) -> MediaResult<()>;
}

/// [`MediaTools`] backed by the ffmpeg/ffprobe command-line tools.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    paths: ToolPaths,
    frame: FrameOptions,
    probe_timeout: Duration,
    extract_timeout: Duration,
}

impl FfmpegTools {
    pub fn new(paths: ToolPaths) -> Self {
        Self {
            paths,
            frame: FrameOptions::default(),
            probe_timeout: Duration::from_secs(30),
            extract_timeout: Duration::from_secs(30),
        }
    }

    /// Set frame output options.
    pub fn with_frame_options(mut self, frame: FrameOptions) -> Self {
        self.frame = frame;
        self
    }

    /// Set probe and per-frame extraction timeouts.
    pub fn with_timeouts(mut self, probe: Duration, extract: Duration) -> Self {
        self.probe_timeout = probe;
        self.extract_timeout = extract;
        self
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe_duration(&self, input: &Path) -> MediaResult<f64> {
        probe_duration(&self.paths.ffprobe, input, self.probe_timeout).await
    }

    async fn extract_frame(&self, input: &Path, output: &Path, timecode_sec: u32) -> MediaResult<()> {
        extract_frame(
            &self.paths.ffmpeg,
            input,
            output,
            timecode_sec,
            &self.frame,
            self.extract_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_override_wins() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("ffmpeg");
        std::fs::write(&bin, b"").unwrap();

        let resolved = resolve_tool(bin.to_str(), "/no/layer/ffmpeg", "ffmpeg");
        assert_eq!(resolved, bin);
    }

    #[test]
    fn test_missing_override_falls_back() {
        let resolved = resolve_tool(
            Some("/no/such/ffmpeg"),
            "/no/layer/ffmpeg",
            "vshare-no-such-program",
        );
        assert_eq!(resolved, PathBuf::from("vshare-no-such-program"));
    }
}
