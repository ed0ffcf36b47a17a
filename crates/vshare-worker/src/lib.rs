//! Queue-driven thumbnail worker.
//!
//! This crate provides:
//! - The thumbnail pipeline (download, probe, extract, upload, commit)
//! - Envelope handling and message settlement
//! - Job executor with bounded concurrency and stale-message recovery
//! - Background status event dispatch
//! - Graceful shutdown

pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use config::{ProbeFailurePolicy, WorkerConfig};
pub use consumer::{
    handle_batch, handle_message, Acknowledger, BatchSummary, Disposition, GroupConsumer, Handled,
};
pub use error::{WorkerError, WorkerResult};
pub use events::{EventDispatcher, StatusPublisher};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{thumbnail_object_path, PipelineSettings, ProcessOutcome, ThumbnailPipeline};
