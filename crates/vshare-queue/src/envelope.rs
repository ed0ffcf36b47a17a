//! Versioned job envelopes.
//!
//! Wire format (UTF-8 JSON):
//!
//! ```json
//! { "type": "generate-thumbs", "version": 1, "data": { "videoId": "..." } }
//! ```

use serde::{Deserialize, Serialize};
use validator::Validate;

use vshare_models::VideoId;

use crate::error::EnvelopeError;

/// Job type tag for thumbnail generation.
pub const GENERATE_THUMBS: &str = "generate-thumbs";

/// Only envelope version this worker understands.
pub const ENVELOPE_VERSION: u64 = 1;

/// Payload of a `generate-thumbs` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateThumbsJob {
    #[validate(length(min = 1, message = "videoId must not be empty"))]
    pub video_id: String,
}

impl GenerateThumbsJob {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
        }
    }

    pub fn video_id(&self) -> VideoId {
        VideoId::from_string(self.video_id.clone())
    }

    /// Key under which identical enqueues are suppressed.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", GENERATE_THUMBS, self.video_id)
    }
}

/// Outer message shape shared by every job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl JobEnvelope {
    /// Build a v1 `generate-thumbs` envelope.
    pub fn generate_thumbs(job: &GenerateThumbsJob) -> Self {
        Self {
            job_type: GENERATE_THUMBS.to_string(),
            version: Some(ENVELOPE_VERSION),
            data: serde_json::json!({ "videoId": job.video_id }),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedJob {
    GenerateThumbs(GenerateThumbsJob),
    /// Well-formed envelope of a type this worker does not handle.
    Unknown(String),
}

/// Parse and validate a raw message body.
pub fn decode_envelope(body: &[u8]) -> Result<DecodedJob, EnvelopeError> {
    let envelope: JobEnvelope =
        serde_json::from_slice(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    if envelope.job_type != GENERATE_THUMBS {
        return Ok(DecodedJob::Unknown(envelope.job_type));
    }

    if envelope.version != Some(ENVELOPE_VERSION) {
        return Err(EnvelopeError::UnsupportedVersion {
            job_type: envelope.job_type,
            version: envelope.version,
        });
    }

    let job: GenerateThumbsJob =
        serde_json::from_value(envelope.data).map_err(|e| EnvelopeError::InvalidPayload {
            job_type: GENERATE_THUMBS.to_string(),
            reason: e.to_string(),
        })?;

    job.validate().map_err(|e| EnvelopeError::InvalidPayload {
        job_type: GENERATE_THUMBS.to_string(),
        reason: e.to_string(),
    })?;

    Ok(DecodedJob::GenerateThumbs(job))
}
