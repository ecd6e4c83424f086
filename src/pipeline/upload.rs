//! Uploaded survey images: acceptance policy and scoped cleanup.
//!
//! The upload transport stores the file and hands the pipeline an
//! [`UploadedImage`]. The pipeline owns it for the rest of the request and
//! deletes it on every exit path. Deletion failures are logged and swallowed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::PipelineError;

/// Default upload size limit (5 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// Size and content-type rules for survey image uploads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: ALLOWED_IMAGE_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    /// Check an upload against the policy.
    ///
    /// When the declared content type is missing it is guessed from the file
    /// extension.
    pub fn check(&self, image: &UploadedImage) -> Result<(), PipelineError> {
        if image.size_bytes > self.max_bytes {
            return Err(PipelineError::Upload(format!(
                "File is {} bytes, limit is {} bytes",
                image.size_bytes, self.max_bytes
            )));
        }

        let content_type = match &image.content_type {
            Some(declared) => declared.to_lowercase(),
            None => mime_guess::from_path(&image.path)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string(),
        };

        if !self.allowed_types.iter().any(|t| *t == content_type) {
            return Err(PipelineError::Upload(format!(
                "Invalid file type {content_type}. Only JPEG, JPG, and PNG are allowed."
            )));
        }
        Ok(())
    }
}

/// A survey image stored by the upload transport, owned by one request.
///
/// Call [`UploadedImage::release`] once processing is over. If the owning
/// future is dropped first, `Drop` makes a synchronous best-effort deletion.
#[derive(Debug)]
pub struct UploadedImage {
    path: PathBuf,
    content_type: Option<String>,
    size_bytes: u64,
    released: bool,
}

impl UploadedImage {
    pub fn new(path: impl Into<PathBuf>, content_type: Option<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            content_type,
            size_bytes,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Delete the stored file. Never fails; problems are logged.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to delete temp upload"
            );
        } else {
            tracing::debug!(path = %self.path.display(), "Temp upload deleted");
        }
    }
}

impl Drop for UploadedImage {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to delete abandoned temp upload"
                );
            }
        }
    }
}
