//! Job envelopes, Redis Streams delivery and status Pub/Sub.
//!
//! This crate provides:
//! - The versioned job envelope codec
//! - An at-least-once job queue over a Redis Streams consumer group
//! - Per-user status event channels

pub mod envelope;
pub mod error;
pub mod queue;
pub mod status;

pub use envelope::{
    decode_envelope, DecodedJob, GenerateThumbsJob, JobEnvelope, ENVELOPE_VERSION, GENERATE_THUMBS,
};
pub use error::{EnvelopeError, QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig, QueueMessage, ReleaseOutcome};
pub use status::StatusChannel;
