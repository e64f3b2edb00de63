//! Render configuration.
//!
//! The calibration constants belong to a specific overlay asset: they map the
//! outer-eye-corner distance onto the frame width of the bundled glasses
//! image and its aspect ratio. A different asset needs its own values.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::canvas::BaseFit;
use crate::error::{MediaError, MediaResult};

/// Default canvas width in pixels.
pub const DEFAULT_CANVAS_WIDTH: u32 = 640;
/// Default canvas height in pixels.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 480;

/// Default overlay asset path in the production container.
pub const DEFAULT_OVERLAY_PATH: &str = "/app/assets/glasses.png";

/// Development fallback paths to check.
const DEV_OVERLAY_PATHS: &[&str] = &[
    "./assets/glasses.png",
    "../assets/glasses.png",
    "public/glasses.png",
];

/// Drop shadow drawn beneath the overlay only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowStyle {
    /// RGBA shadow color; alpha scales the overlay's own alpha
    pub color: [u8; 4],
    /// Blur radius in pixels (Gaussian sigma is half of this)
    pub blur: f32,
    /// Horizontal shadow offset
    pub offset_x: i64,
    /// Vertical shadow offset
    pub offset_y: i64,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            // rgba(0, 0, 0, 0.3)
            color: [0, 0, 0, 77],
            blur: 4.0,
            offset_x: 2,
            offset_y: 2,
        }
    }
}

impl ShadowStyle {
    /// A style that draws nothing.
    pub fn none() -> Self {
        Self {
            color: [0, 0, 0, 0],
            blur: 0.0,
            offset_x: 0,
            offset_y: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.color[3] > 0
    }
}

/// Asset-specific sizing constants for the overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayCalibration {
    /// Overlay width as a multiple of the outer-eye-corner distance
    pub width_factor: f64,
    /// Overlay height as a fraction of its width
    pub height_ratio: f64,
    /// Drop shadow style
    pub shadow: ShadowStyle,
}

impl Default for OverlayCalibration {
    fn default() -> Self {
        Self {
            width_factor: 1.3,
            height_ratio: 0.35,
            shadow: ShadowStyle::default(),
        }
    }
}

impl OverlayCalibration {
    pub fn validate(&self) -> MediaResult<()> {
        if !(self.width_factor.is_finite() && self.width_factor > 0.0) {
            return Err(MediaError::InvalidConfig(format!(
                "width factor must be positive, got {}",
                self.width_factor
            )));
        }
        if !(self.height_ratio.is_finite() && self.height_ratio > 0.0) {
            return Err(MediaError::InvalidConfig(format!(
                "height ratio must be positive, got {}",
                self.height_ratio
            )));
        }
        if !(self.shadow.blur.is_finite() && self.shadow.blur >= 0.0) {
            return Err(MediaError::InvalidConfig(format!(
                "shadow blur must be non-negative, got {}",
                self.shadow.blur
            )));
        }
        Ok(())
    }
}

/// Rendering configuration for a try-on session.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Canvas width
    pub canvas_width: u32,
    /// Canvas height
    pub canvas_height: u32,
    /// How the base photo is fitted into the canvas
    pub base_fit: BaseFit,
    /// Overlay image path (PNG with transparency)
    pub overlay_path: PathBuf,
    /// Calibration of the overlay asset
    pub calibration: OverlayCalibration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            base_fit: BaseFit::default(),
            overlay_path: resolve_overlay_path(),
            calibration: OverlayCalibration::default(),
        }
    }
}

impl RenderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = OverlayCalibration::default();
        Self {
            canvas_width: std::env::var("CANVAS_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CANVAS_WIDTH),
            canvas_height: std::env::var("CANVAS_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CANVAS_HEIGHT),
            base_fit: std::env::var("BASE_FIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            overlay_path: std::env::var("OVERLAY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| resolve_overlay_path()),
            calibration: OverlayCalibration {
                width_factor: std::env::var("OVERLAY_WIDTH_FACTOR")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.width_factor),
                height_ratio: std::env::var("OVERLAY_HEIGHT_RATIO")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.height_ratio),
                shadow: defaults.shadow,
            },
        }
    }

    pub fn with_overlay_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlay_path = path.into();
        self
    }

    pub fn with_canvas_size(mut self, width: u32, height: u32) -> Self {
        self.canvas_width = width;
        self.canvas_height = height;
        self
    }

    pub fn with_base_fit(mut self, fit: BaseFit) -> Self {
        self.base_fit = fit;
        self
    }

    pub fn with_calibration(mut self, calibration: OverlayCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> MediaResult<()> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(MediaError::InvalidConfig(format!(
                "canvas must be non-empty, got {}x{}",
                self.canvas_width, self.canvas_height
            )));
        }
        self.calibration.validate()
    }
}

/// Resolve the overlay path, checking dev fallbacks if the production path is missing.
fn resolve_overlay_path() -> PathBuf {
    if Path::new(DEFAULT_OVERLAY_PATH).exists() {
        return PathBuf::from(DEFAULT_OVERLAY_PATH);
    }

    for path in DEV_OVERLAY_PATHS {
        if Path::new(path).exists() {
            debug!(path = path, "Found overlay at dev fallback path");
            return PathBuf::from(path);
        }
    }

    // Missing asset surfaces as AssetLoadFailure at first render
    PathBuf::from(DEFAULT_OVERLAY_PATH)
}
