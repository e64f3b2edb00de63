//! Fixed-size RGBA render target.

use std::path::Path;
use std::str::FromStr;

use image::{Rgba, RgbaImage};

use crate::error::{MediaError, MediaResult};

/// How the base photo is placed on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseFit {
    /// Stretch to the full canvas, ignoring aspect ratio.
    Stretch,
    /// Scale to fit inside the canvas, centered, preserving aspect ratio.
    #[default]
    Contain,
}

impl FromStr for BaseFit {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stretch" => Ok(BaseFit::Stretch),
            "contain" => Ok(BaseFit::Contain),
            other => Err(MediaError::InvalidConfig(format!(
                "unknown base fit '{}', expected 'stretch' or 'contain'",
                other
            ))),
        }
    }
}

/// Pixel rectangle the base photo occupies on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FitRect {
    /// Compute where an image of `image_width x image_height` lands on a
    /// `canvas_width x canvas_height` canvas.
    pub fn compute(
        fit: BaseFit,
        image_width: u32,
        image_height: u32,
        canvas_width: u32,
        canvas_height: u32,
    ) -> Self {
        match fit {
            BaseFit::Stretch => Self {
                x: 0,
                y: 0,
                width: canvas_width,
                height: canvas_height,
            },
            BaseFit::Contain => {
                if image_width == 0 || image_height == 0 {
                    return Self {
                        x: canvas_width / 2,
                        y: canvas_height / 2,
                        width: 0,
                        height: 0,
                    };
                }
                let scale = (canvas_width as f64 / image_width as f64)
                    .min(canvas_height as f64 / image_height as f64);
                let width = ((image_width as f64 * scale).round() as u32).min(canvas_width);
                let height = ((image_height as f64 * scale).round() as u32).min(canvas_height);
                Self {
                    x: (canvas_width - width) / 2,
                    y: (canvas_height - height) / 2,
                    width,
                    height,
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The render target. Every render clears and fully redraws it.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    frame: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    /// Reset every pixel to transparent black.
    pub fn clear(&mut self) {
        for pixel in self.frame.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut RgbaImage {
        &mut self.frame
    }

    /// Placement of an image of the given size under `fit`.
    pub fn fit_rect(&self, fit: BaseFit, image_width: u32, image_height: u32) -> FitRect {
        FitRect::compute(fit, image_width, image_height, self.width(), self.height())
    }

    /// Write the current frame to disk; the format follows the extension.
    pub fn save(&self, path: &Path) -> MediaResult<()> {
        self.frame.save(path)?;
        Ok(())
    }
}
