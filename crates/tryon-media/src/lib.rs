#![deny(unreachable_patterns)]
//! Glasses try-on rendering core.
//!
//! This crate provides:
//! - The geometry engine turning face landmarks into an overlay placement
//! - A raster compositor drawing the base photo, drop shadow and overlay
//! - Overlay asset loading with deferred (awaited) availability
//! - Landmark sources behind an async trait
//! - The try-on session: adjustment controller, landmark cache and
//!   generation tokens discarding stale results

pub mod canvas;
pub mod compositor;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod overlay;
pub mod session;

pub use canvas::{BaseFit, Canvas, FitRect};
pub use compositor::{Compositor, RasterCompositor};
pub use config::{OverlayCalibration, RenderConfig, ShadowStyle};
pub use detection::{Detection, LandmarkSource, StaticLandmarkSource};
pub use error::{MediaError, MediaResult, PlacementError};
pub use geometry::{compute_placement, EyeCorners};
pub use overlay::{OverlayAsset, OverlayLoader};
pub use session::{RenderOutcome, SessionState, TryOnSession};

#[cfg(feature = "face-mesh")]
pub use detection::face_mesh::FaceMeshSource;
