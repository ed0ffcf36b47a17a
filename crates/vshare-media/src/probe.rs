//! FFprobe duration lookup.

use std::path::Path;
use std::time::Duration;

use crate::command::{run_tool, Tool};
use crate::error::{MediaError, MediaResult};

/// Probe the container-level duration of `input`, in seconds.
///
/// Only `format=duration` is requested, printed bare (`nw=1:nk=1`), so stdout
/// is a single number.
pub async fn probe_duration(
    ffprobe: &Path,
    input: impl AsRef<Path>,
    timeout: Duration,
) -> MediaResult<f64> {
    let input = input.as_ref();

    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=nw=1:nk=1".to_string(),
        input.to_string_lossy().to_string(),
    ];

    let stdout = run_tool(Tool::Ffprobe, ffprobe, &args, timeout).await?;
    parse_duration(&String::from_utf8_lossy(&stdout))
}

/// Parse ffprobe's bare duration output.
fn parse_duration(raw: &str) -> MediaResult<f64> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(d) if d.is_finite() && d >= 0.0 => Ok(d),
        _ => Err(MediaError::InvalidDuration(trimmed.to_string())),
    }
}
