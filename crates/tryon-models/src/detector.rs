//! Landmark detector options.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::landmarks::FaceLandmarks;

/// Options passed to a landmark source.
///
/// Every source honors `max_faces` and `refine_landmarks`. Only the Face
/// Mesh model produces a presence score, so `min_detection_confidence` is
/// inert for file-backed landmarks. `min_tracking_confidence` applies to
/// frame-to-frame tracking and no still-image source reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectorOptions {
    /// Maximum faces to return; only the first is used for placement
    pub max_faces: usize,
    /// Keep the iris points (478 instead of 468)
    pub refine_landmarks: bool,
    /// Minimum face presence score to report a detection
    pub min_detection_confidence: f32,
    /// Minimum tracking score for video sources
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.5,
        }
    }
}

impl DetectorOptions {
    /// Trim a detected face to the requested refinement.
    pub fn shape(&self, landmarks: FaceLandmarks) -> FaceLandmarks {
        if self.refine_landmarks {
            landmarks
        } else {
            landmarks.without_iris()
        }
    }

    /// Create options from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_faces: std::env::var("DETECTOR_MAX_FACES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_faces),
            refine_landmarks: std::env::var("DETECTOR_REFINE_LANDMARKS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.refine_landmarks),
            min_detection_confidence: std::env::var("DETECTOR_MIN_DETECTION_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_detection_confidence),
            min_tracking_confidence: std::env::var("DETECTOR_MIN_TRACKING_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_tracking_confidence),
        }
    }
}
