//! Local-disk blob storage.
//!
//! Mirrors a bucket layout on disk: `<root>/<bucket>/<directory>/<filename>`.
//! Useful for development and for deployments that sync a directory to
//! object storage out of band.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::PreprocessError;
use crate::pipeline::options::UploadOptions;
use crate::pipeline::types::BlobUploader;

/// [`BlobUploader`] that writes objects under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobUploader {
    root: PathBuf,
}

impl FsBlobUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Target path for an upload. Keys that climb out of the bucket are rejected.
    fn object_path(&self, options: &UploadOptions) -> Result<PathBuf, PreprocessError> {
        let key = options.object_key();
        let relative = Path::new(&options.bucket).join(&key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(PreprocessError::Upload {
                filename: options.filename.clone(),
                reason: format!("object key escapes bucket: {key}"),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobUploader for FsBlobUploader {
    async fn upload(&self, options: &UploadOptions) -> Result<(), PreprocessError> {
        let path = self.object_path(options)?;
        let to_upload_error = |e: std::io::Error| PreprocessError::Upload {
            filename: options.filename.clone(),
            reason: format!("{}: {e}", path.display()),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(to_upload_error)?;
        }
        fs::write(&path, &options.file).await.map_err(to_upload_error)?;

        tracing::debug!(path = %path.display(), bytes = options.file.len(), "Stored object");
        Ok(())
    }

    fn object_url(&self, options: &UploadOptions) -> String {
        let path = self
            .root
            .join(&options.bucket)
            .join(options.object_key());
        format!("file://{}", path.display())
    }
}
