//! Face landmark models.
//!
//! Landmarks use the MediaPipe Face Mesh numbering: 468 points, or 478 when
//! iris refinement is enabled. Coordinates are normalized to the source image
//! (0.0 = left/top, 1.0 = right/bottom).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Number of points in a Face Mesh result without iris refinement.
pub const FACE_MESH_LANDMARK_COUNT: usize = 468;

/// Number of points in a Face Mesh result with iris refinement.
pub const REFINED_FACE_MESH_LANDMARK_COUNT: usize = 478;

/// A landmark position normalized to image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedPoint {
    /// Horizontal position (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Vertical position (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Relative depth, unused by the 2D placement
    #[serde(default)]
    pub z: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Convert to pixel coordinates for an image of the given size.
    pub fn to_pixels(&self, width: f64, height: f64) -> (f64, f64) {
        (self.x * width, self.y * height)
    }
}

/// Semantic landmark roles used by the glasses placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkRole {
    NoseBridgeTop,
    LeftEyeInner,
    RightEyeInner,
    LeftEyeOuter,
    RightEyeOuter,
}

impl LandmarkRole {
    /// All roles, in index-table order.
    pub const ALL: [LandmarkRole; 5] = [
        LandmarkRole::NoseBridgeTop,
        LandmarkRole::LeftEyeInner,
        LandmarkRole::RightEyeInner,
        LandmarkRole::LeftEyeOuter,
        LandmarkRole::RightEyeOuter,
    ];

    /// Fixed Face Mesh index for this role.
    pub const fn index(self) -> usize {
        match self {
            LandmarkRole::NoseBridgeTop => 6,
            LandmarkRole::LeftEyeInner => 133,
            LandmarkRole::RightEyeInner => 362,
            LandmarkRole::LeftEyeOuter => 33,
            LandmarkRole::RightEyeOuter => 263,
        }
    }

    /// Minimum landmark count for every role lookup to be valid.
    pub fn required_len() -> usize {
        Self::ALL.iter().map(|r| r.index()).max().unwrap_or(0) + 1
    }
}

/// Landmarks of a single detected face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FaceLandmarks {
    points: Vec<NormalizedPoint>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<NormalizedPoint>) -> Self {
        Self { points }
    }

    /// Build from raw `(x, y)` pairs.
    pub fn from_xy(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|(x, y)| NormalizedPoint::new(x, y))
                .collect(),
        }
    }

    /// Build a set of `len` points where only the given roles carry data.
    ///
    /// Useful for synthetic faces; unset points sit at the origin.
    pub fn from_roles(
        len: usize,
        roles: impl IntoIterator<Item = (LandmarkRole, NormalizedPoint)>,
    ) -> Self {
        let mut points = vec![NormalizedPoint::default(); len];
        for (role, point) in roles {
            if let Some(slot) = points.get_mut(role.index()) {
                *slot = point;
            }
        }
        Self { points }
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Look up a point by semantic role.
    pub fn get(&self, role: LandmarkRole) -> Option<NormalizedPoint> {
        self.points.get(role.index()).copied()
    }

    /// Whether every role in the index table resolves.
    pub fn has_required_roles(&self) -> bool {
        self.points.len() >= LandmarkRole::required_len()
    }

    /// Drop the iris points that follow the base mesh.
    pub fn without_iris(mut self) -> Self {
        self.points.truncate(FACE_MESH_LANDMARK_COUNT);
        self
    }

    /// Reject coordinates that are not finite numbers.
    pub fn validate(&self) -> ModelResult<()> {
        if let Some((i, _)) = self
            .points
            .iter()
            .enumerate()
            .find(|(_, p)| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(ModelError::InvalidLandmarks(format!(
                "landmark {} has a non-finite coordinate",
                i
            )));
        }
        Ok(())
    }
}

impl From<Vec<NormalizedPoint>> for FaceLandmarks {
    fn from(points: Vec<NormalizedPoint>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_len_covers_highest_index() {
        assert_eq!(LandmarkRole::required_len(), 363);
    }

    #[test]
    fn test_role_lookup() {
        let mut points = vec![NormalizedPoint::default(); FACE_MESH_LANDMARK_COUNT];
        points[133] = NormalizedPoint::new(0.25, 0.5);
        let landmarks = FaceLandmarks::new(points);

        assert!(landmarks.has_required_roles());
        assert_eq!(
            landmarks.get(LandmarkRole::LeftEyeInner),
            Some(NormalizedPoint::new(0.25, 0.5))
        );
    }

    #[test]
    fn test_short_set_misses_roles() {
        let landmarks = FaceLandmarks::from_xy((0..300).map(|_| (0.5, 0.5)));
        assert!(!landmarks.has_required_roles());
        assert_eq!(landmarks.get(LandmarkRole::RightEyeInner), None);
        assert!(landmarks.get(LandmarkRole::LeftEyeOuter).is_some());
    }

    #[test]
    fn test_deserialize_without_z() {
        let landmarks: FaceLandmarks =
            serde_json::from_str(r#"[{"x":0.1,"y":0.2},{"x":0.3,"y":0.4,"z":-0.01}]"#).unwrap();
        assert_eq!(landmarks.len(), 2);
        assert_eq!(landmarks.points()[0].z, 0.0);
    }

    #[test]
    fn test_validate_rejects_nan() {
        let landmarks = FaceLandmarks::from_xy([(0.1, f64::NAN)]);
        assert!(landmarks.validate().is_err());
    }
}
