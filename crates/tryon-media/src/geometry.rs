//! Geometry engine: face landmarks to overlay placement.
//!
//! The overlay is centered on the midpoint of the inner eye corners (the
//! nose bridge), sized from the outer eye corner distance and rotated to the
//! eye line. Only in-plane tilt is modeled; pitch and yaw are not.

use tryon_models::{AdjustmentParameters, FaceLandmarks, LandmarkRole, PlacementTransform};

use crate::config::OverlayCalibration;
use crate::error::PlacementError;

/// The four eye corners in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeCorners {
    pub left_inner: (f64, f64),
    pub right_inner: (f64, f64),
    pub left_outer: (f64, f64),
    pub right_outer: (f64, f64),
}

impl EyeCorners {
    /// Look up and denormalize the eye corners of a face.
    pub fn from_landmarks(
        landmarks: &FaceLandmarks,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, PlacementError> {
        if landmarks.is_empty() {
            return Err(PlacementError::NoFaceDetected);
        }
        if !landmarks.has_required_roles() {
            return Err(PlacementError::InsufficientLandmarks {
                required: LandmarkRole::required_len(),
                found: landmarks.len(),
            });
        }
        if image_width == 0 || image_height == 0 {
            return Err(PlacementError::InvalidDimensions {
                width: image_width,
                height: image_height,
            });
        }

        let (w, h) = (image_width as f64, image_height as f64);
        let pixel = |role: LandmarkRole| {
            landmarks
                .get(role)
                .map(|p| p.to_pixels(w, h))
                .ok_or(PlacementError::InsufficientLandmarks {
                    required: LandmarkRole::required_len(),
                    found: landmarks.len(),
                })
        };

        Ok(Self {
            left_inner: pixel(LandmarkRole::LeftEyeInner)?,
            right_inner: pixel(LandmarkRole::RightEyeInner)?,
            left_outer: pixel(LandmarkRole::LeftEyeOuter)?,
            right_outer: pixel(LandmarkRole::RightEyeOuter)?,
        })
    }

    /// Midpoint of the inner corners.
    pub fn bridge(&self) -> (f64, f64) {
        (
            (self.left_inner.0 + self.right_inner.0) / 2.0,
            (self.left_inner.1 + self.right_inner.1) / 2.0,
        )
    }

    /// Distance between the outer corners.
    pub fn outer_distance(&self) -> f64 {
        (self.right_outer.0 - self.left_outer.0).hypot(self.right_outer.1 - self.left_outer.1)
    }

    /// Angle of the outer-corner line. Positive when the right corner is lower.
    pub fn tilt(&self) -> f64 {
        (self.right_outer.1 - self.left_outer.1).atan2(self.right_outer.0 - self.left_outer.0)
    }
}

/// Compute where the overlay goes for one face.
///
/// `image_width`/`image_height` are the pixel dimensions the normalized
/// landmarks are scaled by. The result is relative to that image's origin.
pub fn compute_placement(
    landmarks: &FaceLandmarks,
    image_width: u32,
    image_height: u32,
    params: &AdjustmentParameters,
    calibration: &OverlayCalibration,
) -> Result<PlacementTransform, PlacementError> {
    let corners = EyeCorners::from_landmarks(landmarks, image_width, image_height)?;

    let (center_x, bridge_y) = corners.bridge();
    let width = corners.outer_distance() * calibration.width_factor * params.scale();
    let height = width * calibration.height_ratio;

    Ok(PlacementTransform {
        center_x,
        center_y: bridge_y + params.vertical_offset_px() as f64,
        width,
        height,
        angle_radians: corners.tilt(),
    })
}
