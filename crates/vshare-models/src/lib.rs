//! Shared data models for the VShare thumbnail worker.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their lifecycle status
//! - Thumbnail records produced by the pipeline
//! - Status change events published for dashboards
//! - Thumbnail timecode selection

pub mod event;
pub mod thumbnail;
pub mod timecode;
pub mod video;

// Re-export common types
pub use event::VideoStatusEvent;
pub use thumbnail::{NewThumbnail, ThumbnailId, ThumbnailRecord};
pub use timecode::{pick_timecodes, THUMBNAIL_POSITIONS};
pub use video::{StatusParseError, VideoId, VideoRecord, VideoStatus};
