//! S3-compatible object store client.
//!
//! This crate provides:
//! - Presigned GET/PUT URL generation per bucket
//! - Overwriting uploads of in-memory payloads
//! - Streaming download of a signed URL to a local file

pub mod client;
pub mod download;
pub mod error;

pub use client::{ObjectStore, ObjectStoreClient, ObjectStoreConfig, DEFAULT_UPLOAD_TIMEOUT};
pub use download::{HttpDownloader, SourceDownloader};
pub use error::{StorageError, StorageResult};
