//! Video and thumbnail persistence.
//!
//! This crate provides:
//! - The [`VideoStore`] interface with compare-and-set status transitions
//! - A Postgres implementation sharing the web application's schema
//! - An in-memory implementation for tests

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod pg;
pub mod queries;
pub mod store;

pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use memory::InMemoryVideoStore;
pub use pg::PgVideoStore;
pub use store::{CommitOutcome, VideoStore};
