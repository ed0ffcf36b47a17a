//! Scratch files for a single processing attempt.
//!
//! Every path handed out by a [`ScratchSpace`] is tracked and removed by
//! [`ScratchSpace::cleanup`], or on drop if the attempt was abandoned.
//! Removal is best effort: failures are logged, never returned.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

/// Build a collision-resistant scratch file path inside `dir`.
///
/// `ext` is required and may be given with or without the leading dot.
pub fn scratch_path(dir: &Path, prefix: &str, ext: &str) -> MediaResult<PathBuf> {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(MediaError::InvalidExtension(ext.to_string()));
    }

    Ok(dir.join(format!("{}-{}.{}", prefix, Uuid::new_v4().simple(), ext)))
}

/// Remove a file, logging instead of failing.
pub async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed scratch file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove scratch file {}: {}", path.display(), e),
    }
}

/// Tracks the scratch files created during one attempt.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl ScratchSpace {
    /// Scratch space rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    /// Scratch space in the platform temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a new tracked path. The directory is created if needed; the
    /// file itself is not.
    pub async fn file(&mut self, prefix: &str, ext: &str) -> MediaResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = scratch_path(&self.dir, prefix, ext)?;
        self.files.push(path.clone());
        Ok(path)
    }

    /// Paths reserved so far.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove every tracked file.
    pub async fn cleanup(&mut self) {
        for path in self.files.drain(..) {
            remove_quietly(&path).await;
        }
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        for path in self.files.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove scratch file {}: {}", path.display(), e);
                }
            }
        }
    }
}
