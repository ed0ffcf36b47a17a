//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Consumer
    pub const JOBS_RECEIVED_TOTAL: &str = "vshare_jobs_received_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vshare_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vshare_jobs_failed_total";
    pub const JOBS_SKIPPED_TOTAL: &str = "vshare_jobs_skipped_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "vshare_jobs_dead_lettered_total";
    pub const ENVELOPES_REJECTED_TOTAL: &str = "vshare_envelopes_rejected_total";

    // Pipeline
    pub const PIPELINE_DURATION_SECONDS: &str = "vshare_pipeline_duration_seconds";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "vshare_download_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "vshare_upload_duration_seconds";
    pub const PROBE_FALLBACKS_TOTAL: &str = "vshare_probe_fallbacks_total";

    // Status events
    pub const EVENTS_DROPPED_TOTAL: &str = "vshare_status_events_dropped_total";
    pub const EVENTS_FAILED_TOTAL: &str = "vshare_status_events_failed_total";
}

pub fn record_job_received(source: &'static str) {
    counter!(names::JOBS_RECEIVED_TOTAL, "source" => source).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::PIPELINE_DURATION_SECONDS).record(duration_secs);
}

pub fn record_job_failed(kind: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_job_skipped(reason: &'static str) {
    counter!(names::JOBS_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_dead_lettered() {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL).increment(1);
}

pub fn record_envelope_rejected(reason: &'static str) {
    counter!(names::ENVELOPES_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_download(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_upload(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_probe_fallback() {
    counter!(names::PROBE_FALLBACKS_TOTAL).increment(1);
}

pub fn record_event_dropped() {
    counter!(names::EVENTS_DROPPED_TOTAL).increment(1);
}

pub fn record_event_failed() {
    counter!(names::EVENTS_FAILED_TOTAL).increment(1);
}
