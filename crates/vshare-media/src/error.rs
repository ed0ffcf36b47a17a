//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::command::Tool;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running the external media tools.
///
/// A missing binary (`ToolNotFound`), a failure on this input (`ToolFailed`)
/// and an expired deadline (`Timeout`) are separate variants.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} not found at {}", path.display())]
    ToolNotFound { tool: Tool, path: PathBuf },

    #[error("{tool} failed: {message}")]
    ToolFailed {
        tool: Tool,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: Tool, secs: u64 },

    #[error("Invalid duration reported by ffprobe: {0:?}")]
    InvalidDuration(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid scratch file extension: {0:?}")]
    InvalidExtension(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn tool_not_found(tool: Tool, path: impl Into<PathBuf>) -> Self {
        Self::ToolNotFound {
            tool,
            path: path.into(),
        }
    }

    pub fn tool_failed(
        tool: Tool,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ToolFailed {
            tool,
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// True when the binary itself is missing rather than failing on an input.
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, MediaError::ToolNotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MediaError::Timeout { .. })
    }
}
