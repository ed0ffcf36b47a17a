//! FFmpeg CLI wrappers for thumbnail extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Bounded, non-leaking subprocess execution with captured stderr
//! - Duration probing via FFprobe
//! - Single-frame JPEG extraction
//! - Scratch file management for per-attempt temporary files

pub mod command;
pub mod error;
pub mod probe;
pub mod scratch;
pub mod thumbnail;
pub mod tools;

pub use command::{run_tool, FfmpegCommand, Tool};
pub use error::{MediaError, MediaResult};
pub use probe::probe_duration;
pub use scratch::{remove_quietly, scratch_path, ScratchSpace};
pub use thumbnail::{extract_frame, FrameOptions, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_WIDTH};
pub use tools::{FfmpegTools, MediaTools, ToolPaths};
