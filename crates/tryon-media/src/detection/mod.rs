//! Landmark sources.
//!
//! A [`LandmarkSource`] turns an image into at most one face's landmarks.
//! Sources are awaited; the session decides what to do with the result.

#[cfg(feature = "face-mesh")]
pub mod face_mesh;

use std::path::Path;

use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;
use tracing::debug;
use tryon_models::{DetectorOptions, FaceLandmarks};

use crate::error::{MediaError, MediaResult};

/// Outcome of one detection call.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Landmarks of the first detected face.
    Detected(FaceLandmarks),
    /// The image contains no face.
    NoFace,
    /// The source failed; the reason is for logging only.
    Error(String),
}

impl Detection {
    pub fn is_face(&self) -> bool {
        matches!(self, Detection::Detected(_))
    }

    pub fn landmarks(&self) -> Option<&FaceLandmarks> {
        match self {
            Detection::Detected(landmarks) => Some(landmarks),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Detection::Detected(_) => "face",
            Detection::NoFace => "no_face",
            Detection::Error(_) => "error",
        }
    }
}

impl From<MediaResult<Option<FaceLandmarks>>> for Detection {
    fn from(result: MediaResult<Option<FaceLandmarks>>) -> Self {
        match result {
            Ok(Some(landmarks)) if !landmarks.is_empty() => Detection::Detected(landmarks),
            Ok(_) => Detection::NoFace,
            Err(e) => Detection::Error(e.to_string()),
        }
    }
}

/// Produces face landmarks for a still image.
#[async_trait]
pub trait LandmarkSource: Send + Sync {
    /// Detect the first face in `image`.
    async fn detect(&self, image: &DynamicImage) -> Detection;

    /// Source name for logs.
    fn name(&self) -> &'static str {
        "landmark_source"
    }
}

/// Landmark file layouts accepted by [`StaticLandmarkSource`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LandmarkFile {
    Faces { faces: Vec<FaceLandmarks> },
    Single(FaceLandmarks),
}

/// Replays precomputed landmarks regardless of the image.
#[derive(Debug, Clone, Default)]
pub struct StaticLandmarkSource {
    faces: Vec<FaceLandmarks>,
    options: DetectorOptions,
}

impl StaticLandmarkSource {
    /// A source that always returns `landmarks`.
    pub fn new(landmarks: FaceLandmarks) -> Self {
        Self {
            faces: vec![landmarks],
            options: DetectorOptions::default(),
        }
    }

    /// A source that never finds a face.
    pub fn no_face() -> Self {
        Self::default()
    }

    /// Parse either a bare landmark array or `{"faces": [[...], ...]}`.
    pub fn from_json(json: &str) -> MediaResult<Self> {
        let faces = match serde_json::from_str::<LandmarkFile>(json)? {
            LandmarkFile::Faces { faces } => faces,
            LandmarkFile::Single(face) => vec![face],
        };
        let faces: Vec<FaceLandmarks> = faces.into_iter().filter(|f| !f.is_empty()).collect();
        for face in &faces {
            face.validate()?;
        }
        Ok(Self {
            faces,
            options: DetectorOptions::default(),
        })
    }

    /// Read a landmark file from disk.
    pub fn load(path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let source = Self::from_json(&json)?;
        debug!(path = %path.display(), faces = source.faces.len(), "Loaded landmark file");
        Ok(source)
    }

    pub fn with_options(mut self, options: DetectorOptions) -> Self {
        self.options = options;
        self
    }

    /// Faces in the file, before the max-faces cut.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

#[async_trait]
impl LandmarkSource for StaticLandmarkSource {
    async fn detect(&self, _image: &DynamicImage) -> Detection {
        // Only the first face is ever placed
        let limit = self.options.max_faces.max(1);
        match self.faces.iter().take(limit).next() {
            Some(face) => Detection::Detected(self.options.shape(face.clone())),
            None => Detection::NoFace,
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
