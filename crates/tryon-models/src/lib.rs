//! Shared data models for the glasses try-on workspace.
//!
//! This crate provides Serde-serializable types for:
//! - Face landmarks and the fixed landmark index table
//! - Placement transforms and user adjustment parameters
//! - Landmark detector options
//! - HTTP request/response bodies shared by the API and its client

pub mod adjustment;
pub mod api;
pub mod detector;
pub mod error;
pub mod landmarks;
pub mod placement;

// Re-export common types
pub use adjustment::AdjustmentParameters;
pub use api::{AuthResponse, Credentials, ErrorBody, UploadResponse, UserProfile};
pub use detector::DetectorOptions;
pub use error::{ModelError, ModelResult};
pub use landmarks::{
    FaceLandmarks, LandmarkRole, NormalizedPoint, FACE_MESH_LANDMARK_COUNT,
    REFINED_FACE_MESH_LANDMARK_COUNT,
};
pub use placement::PlacementTransform;
