//! Overlay placement transform.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where and how to draw the overlay on the canvas, in canvas pixels.
///
/// Derived fresh for every render and consumed once by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlacementTransform {
    /// Overlay center, x
    pub center_x: f64,
    /// Overlay center, y
    pub center_y: f64,
    /// Drawn overlay width
    pub width: f64,
    /// Drawn overlay height
    pub height: f64,
    /// In-plane rotation; positive values turn clockwise on screen (y grows downward)
    pub angle_radians: f64,
}

impl PlacementTransform {
    /// Shift the center by a pixel offset.
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            center_x: self.center_x + dx,
            center_y: self.center_y + dy,
            ..self
        }
    }

    pub fn angle_degrees(&self) -> f64 {
        self.angle_radians.to_degrees()
    }

    /// Top-left corner of the unrotated overlay box.
    pub fn origin(&self) -> (f64, f64) {
        (
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translated_keeps_size_and_angle() {
        let t = PlacementTransform {
            center_x: 10.0,
            center_y: 20.0,
            width: 100.0,
            height: 35.0,
            angle_radians: 0.1,
        };
        let moved = t.translated(5.0, -5.0);
        assert_eq!(moved.center_x, 15.0);
        assert_eq!(moved.center_y, 15.0);
        assert_eq!(moved.width, t.width);
        assert_eq!(moved.angle_radians, t.angle_radians);
        assert_eq!(moved.origin(), (-35.0, -2.5));
    }
}
