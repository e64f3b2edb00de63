//! Photo upload storage.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};
use tryon_models::UploadResponse;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// URL prefix the upload directory is served under.
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Validates and stores uploaded photos on local disk.
pub struct UploadService {
    dir: PathBuf,
    max_size: usize,
    allowed_extensions: Vec<String>,
}

impl UploadService {
    pub fn new(dir: impl Into<PathBuf>, max_size: usize, allowed_extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            max_size,
            allowed_extensions,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(
            config.upload_dir.clone(),
            config.max_upload_size,
            config.allowed_extensions.clone(),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and persist one photo.
    ///
    /// The stored extension comes from the sniffed content, never from the
    /// client filename.
    pub async fn store(&self, file_name: Option<&str>, bytes: &[u8]) -> ApiResult<UploadResponse> {
        if bytes.is_empty() {
            return Err(ApiError::bad_request("No file uploaded"));
        }
        if bytes.len() > self.max_size {
            return Err(ApiError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.max_size
            )));
        }

        if let Some(ext) = file_name.and_then(|n| Path::new(n).extension()).and_then(|e| e.to_str()) {
            if !self.is_allowed(ext) {
                return Err(ApiError::bad_request("Only image files are allowed"));
            }
        }

        let ext = image::guess_format(bytes)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .filter(|ext| self.is_allowed(ext))
            .ok_or_else(|| ApiError::bad_request("Only image files are allowed"))?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let stored = format!("{}-{}.{}", Utc::now().timestamp_millis(), Uuid::new_v4(), ext);
        let path = self.dir.join(&stored);
        debug!(path = %path.display(), size = bytes.len(), "Writing upload");
        tokio::fs::write(&path, bytes).await?;

        info!(file = %stored, size = bytes.len(), "Upload stored");
        Ok(UploadResponse {
            path: format!("{}/{}", UPLOADS_PREFIX, stored),
        })
    }

    fn is_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| *e == ext)
    }
}
