//! Error types for rendering operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Why a placement could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("No face detected")]
    NoFaceDetected,

    #[error("Insufficient landmarks: need {required}, got {found}")]
    InsufficientLandmarks { required: usize, found: usize },

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Errors that can occur while detecting, placing or compositing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("No face detected")]
    NoFaceDetected,

    #[error("Insufficient landmarks: need {required}, got {found}")]
    InsufficientLandmarks { required: usize, found: usize },

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Overlay asset failed to load: {0}")]
    AssetLoadFailure(String),

    #[error("Landmark detection failed: {0}")]
    DetectionFailed(String),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] tryon_models::ModelError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an asset load failure error.
    pub fn asset_load_failure(message: impl Into<String>) -> Self {
        Self::AssetLoadFailure(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error leaves the previous frame on the canvas untouched.
    pub fn keeps_last_frame(&self) -> bool {
        matches!(
            self,
            MediaError::NoFaceDetected
                | MediaError::InsufficientLandmarks { .. }
                | MediaError::InvalidDimensions { .. }
                | MediaError::DetectionFailed(_)
        )
    }
}

impl From<PlacementError> for MediaError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::NoFaceDetected => MediaError::NoFaceDetected,
            PlacementError::InsufficientLandmarks { required, found } => {
                MediaError::InsufficientLandmarks { required, found }
            }
            PlacementError::InvalidDimensions { width, height } => {
                MediaError::InvalidDimensions { width, height }
            }
        }
    }
}
