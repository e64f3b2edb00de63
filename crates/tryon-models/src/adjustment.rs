//! User-tunable overlay adjustments.

use serde::{Deserialize, Serialize};

/// Smallest allowed overlay scale.
pub const SCALE_MIN: f64 = 0.7;
/// Largest allowed overlay scale.
pub const SCALE_MAX: f64 = 1.5;
/// Default overlay scale.
pub const SCALE_DEFAULT: f64 = 1.0;

/// Smallest allowed vertical offset in pixels.
pub const VERTICAL_OFFSET_MIN: i32 = -30;
/// Largest allowed vertical offset in pixels.
pub const VERTICAL_OFFSET_MAX: i32 = 30;

/// Size and vertical-offset adjustment for the overlay.
///
/// Values are always within range; setters and deserialization clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAdjustment")]
pub struct AdjustmentParameters {
    scale: f64,
    vertical_offset_px: i32,
}

#[derive(Deserialize)]
struct RawAdjustment {
    #[serde(default = "default_scale")]
    scale: f64,
    #[serde(default)]
    vertical_offset_px: i32,
}

fn default_scale() -> f64 {
    SCALE_DEFAULT
}

impl From<RawAdjustment> for AdjustmentParameters {
    fn from(raw: RawAdjustment) -> Self {
        Self::new(raw.scale, raw.vertical_offset_px)
    }
}

impl Default for AdjustmentParameters {
    fn default() -> Self {
        Self {
            scale: SCALE_DEFAULT,
            vertical_offset_px: 0,
        }
    }
}

impl AdjustmentParameters {
    /// Create clamped parameters.
    pub fn new(scale: f64, vertical_offset_px: i32) -> Self {
        let mut params = Self::default();
        params.set_scale(scale);
        params.set_vertical_offset(vertical_offset_px);
        params
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn vertical_offset_px(&self) -> i32 {
        self.vertical_offset_px
    }

    /// Set the scale, clamped to [0.7, 1.5]. Non-finite input resets to the default.
    pub fn set_scale(&mut self, scale: f64) -> f64 {
        self.scale = if scale.is_finite() {
            scale.clamp(SCALE_MIN, SCALE_MAX)
        } else {
            SCALE_DEFAULT
        };
        self.scale
    }

    /// Set the vertical offset, clamped to [-30, 30].
    pub fn set_vertical_offset(&mut self, offset_px: i32) -> i32 {
        self.vertical_offset_px = offset_px.clamp(VERTICAL_OFFSET_MIN, VERTICAL_OFFSET_MAX);
        self.vertical_offset_px
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.set_scale(scale);
        self
    }

    pub fn with_vertical_offset(mut self, offset_px: i32) -> Self {
        self.set_vertical_offset(offset_px);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = AdjustmentParameters::default();
        assert_eq!(params.scale(), 1.0);
        assert_eq!(params.vertical_offset_px(), 0);
    }

    #[test]
    fn test_scale_clamping() {
        let mut params = AdjustmentParameters::default();
        assert_eq!(params.set_scale(2.0), 1.5);
        assert_eq!(params.set_scale(0.1), 0.7);
        assert_eq!(params.set_scale(1.2), 1.2);
        assert_eq!(params.set_scale(f64::NAN), 1.0);
    }

    #[test]
    fn test_offset_clamping() {
        let mut params = AdjustmentParameters::default();
        assert_eq!(params.set_vertical_offset(100), 30);
        assert_eq!(params.set_vertical_offset(-100), -30);
        assert_eq!(params.set_vertical_offset(-12), -12);
    }

    #[test]
    fn test_deserialize_clamps() {
        let params: AdjustmentParameters =
            serde_json::from_str(r#"{"scale":3.0,"vertical_offset_px":-45}"#).unwrap();
        assert_eq!(params.scale(), 1.5);
        assert_eq!(params.vertical_offset_px(), -30);
    }

    #[test]
    fn test_new_clamps_both() {
        let params = AdjustmentParameters::new(9.0, -99);
        assert_eq!(params, AdjustmentParameters::new(1.5, -30));
    }
}
