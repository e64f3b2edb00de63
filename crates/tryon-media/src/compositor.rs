//! Raster compositing of the base photo, drop shadow and overlay.
//!
//! Drawing order per frame: clear, base photo, overlay shadow, overlay.
//! The shadow is computed from the overlay's alpha only, so it never
//! darkens the base photo outside the overlay footprint plus its blur.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::trace;
use tryon_models::PlacementTransform;

use crate::canvas::{Canvas, FitRect};
use crate::config::ShadowStyle;
use crate::overlay::OverlayAsset;

/// Draws frames onto a [`Canvas`].
///
/// Implementations must not keep drawing state between calls: each
/// `draw_overlay` applies its shadow to that overlay only.
pub trait Compositor: Send {
    /// Clear the canvas and draw the base photo into `target`.
    fn draw_base(&mut self, base: &RgbaImage, target: FitRect, canvas: &mut Canvas);

    /// Draw the overlay (and its shadow) at `transform`, in canvas pixels.
    fn draw_overlay(
        &mut self,
        overlay: &OverlayAsset,
        transform: &PlacementTransform,
        canvas: &mut Canvas,
    );

    /// Full redraw: base photo, then the overlay.
    fn composite(
        &mut self,
        base: &RgbaImage,
        target: FitRect,
        overlay: &OverlayAsset,
        transform: &PlacementTransform,
        canvas: &mut Canvas,
    ) {
        self.draw_base(base, target, canvas);
        self.draw_overlay(overlay, transform, canvas);
    }
}

/// CPU compositor built on `image`/`imageproc`.
#[derive(Debug, Clone, Default)]
pub struct RasterCompositor {
    shadow: ShadowStyle,
}

impl RasterCompositor {
    pub fn new(shadow: ShadowStyle) -> Self {
        Self { shadow }
    }

    pub fn shadow(&self) -> &ShadowStyle {
        &self.shadow
    }

    /// Maps overlay pixel space onto the canvas: scale to the target size,
    /// center on the origin, rotate, then move to the placement center.
    fn projection(overlay: &OverlayAsset, t: &PlacementTransform) -> Option<Projection> {
        let (ow, oh) = overlay.dimensions();
        if ow == 0 || oh == 0 || !(t.width > 0.0) || !(t.height > 0.0) {
            return None;
        }
        let projection = Projection::translate(t.center_x as f32, t.center_y as f32)
            * Projection::rotate(t.angle_radians as f32)
            * Projection::translate(-(t.width as f32) / 2.0, -(t.height as f32) / 2.0)
            * Projection::scale(t.width as f32 / ow as f32, t.height as f32 / oh as f32);
        Some(projection)
    }

    fn shadow_layer(&self, layer: &RgbaImage) -> RgbaImage {
        let [r, g, b, a] = self.shadow.color;
        let mut shadow = RgbaImage::from_fn(layer.width(), layer.height(), |x, y| {
            let alpha = layer.get_pixel(x, y)[3] as u32 * a as u32 / 255;
            Rgba([r, g, b, alpha as u8])
        });
        if self.shadow.blur > 0.0 {
            shadow = gaussian_blur_f32(&shadow, self.shadow.blur / 2.0);
        }
        shadow
    }
}

impl Compositor for RasterCompositor {
    fn draw_base(&mut self, base: &RgbaImage, target: FitRect, canvas: &mut Canvas) {
        canvas.clear();
        if target.is_empty() || base.width() == 0 || base.height() == 0 {
            return;
        }
        let fitted;
        let drawn = if base.dimensions() == (target.width, target.height) {
            base
        } else {
            fitted = imageops::resize(base, target.width, target.height, FilterType::Triangle);
            &fitted
        };
        imageops::overlay(canvas.frame_mut(), drawn, target.x as i64, target.y as i64);
    }

    fn draw_overlay(
        &mut self,
        overlay: &OverlayAsset,
        transform: &PlacementTransform,
        canvas: &mut Canvas,
    ) {
        let Some(projection) = Self::projection(overlay, transform) else {
            trace!(?transform, "Skipping degenerate overlay placement");
            return;
        };

        let mut layer = RgbaImage::new(canvas.width(), canvas.height());
        warp_into(
            overlay.image(),
            &projection,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
            &mut layer,
        );

        if self.shadow.is_visible() {
            let shadow = self.shadow_layer(&layer);
            imageops::overlay(
                canvas.frame_mut(),
                &shadow,
                self.shadow.offset_x,
                self.shadow.offset_y,
            );
        }
        imageops::overlay(canvas.frame_mut(), &layer, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BaseFit;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn is_blue(p: &Rgba<u8>) -> bool {
        p[0] < 16 && p[2] > 240 && p[3] > 240
    }

    fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    fn placement(cx: f64, cy: f64, w: f64, h: f64, angle: f64) -> PlacementTransform {
        PlacementTransform {
            center_x: cx,
            center_y: cy,
            width: w,
            height: h,
            angle_radians: angle,
        }
    }

    #[test]
    fn test_stretch_covers_canvas() {
        let mut canvas = Canvas::new(8, 8);
        let base = solid(2, 2, RED);
        let rect = canvas.fit_rect(BaseFit::Stretch, 2, 2);
        RasterCompositor::default().draw_base(&base, rect, &mut canvas);
        assert!(canvas.frame().pixels().all(|p| *p == RED));
    }

    #[test]
    fn test_contain_leaves_letterbox_clear() {
        let mut canvas = Canvas::new(8, 8);
        canvas.frame_mut().put_pixel(0, 0, BLUE);
        let base = solid(4, 2, RED);
        let rect = canvas.fit_rect(BaseFit::Contain, 4, 2);
        assert_eq!(rect, FitRect { x: 0, y: 2, width: 8, height: 4 });

        RasterCompositor::default().draw_base(&base, rect, &mut canvas);
        assert_eq!(canvas.frame().get_pixel(0, 0)[3], 0);
        assert_eq!(*canvas.frame().get_pixel(4, 4), RED);
        assert_eq!(canvas.frame().get_pixel(4, 7)[3], 0);
    }

    #[test]
    fn test_overlay_drawn_at_center() {
        let mut canvas = Canvas::new(40, 40);
        let overlay = OverlayAsset::from_image(solid(10, 10, BLUE)).unwrap();
        let mut compositor = RasterCompositor::new(ShadowStyle::none());

        compositor.draw_overlay(&overlay, &placement(20.0, 20.0, 10.0, 10.0, 0.0), &mut canvas);

        assert!(is_blue(canvas.frame().get_pixel(20, 20)));
        assert_eq!(canvas.frame().get_pixel(5, 5)[3], 0);
        assert_eq!(canvas.frame().get_pixel(30, 20)[3], 0);
    }

    #[test]
    fn test_overlay_rotation() {
        let mut canvas = Canvas::new(40, 40);
        let overlay = OverlayAsset::from_image(solid(20, 4, BLUE)).unwrap();
        let mut compositor = RasterCompositor::new(ShadowStyle::none());

        let t = placement(20.0, 20.0, 20.0, 4.0, std::f64::consts::FRAC_PI_2);
        compositor.draw_overlay(&overlay, &t, &mut canvas);

        // A horizontal bar turned a quarter is vertical
        assert!(is_blue(canvas.frame().get_pixel(20, 27)));
        assert_eq!(canvas.frame().get_pixel(27, 20)[3], 0);
    }

    #[test]
    fn test_shadow_falls_below_right() {
        let mut canvas = Canvas::new(40, 40);
        canvas.frame_mut().pixels_mut().for_each(|p| *p = WHITE);
        let overlay = OverlayAsset::from_image(solid(10, 10, BLUE)).unwrap();
        let mut compositor = RasterCompositor::default();

        compositor.draw_overlay(&overlay, &placement(20.0, 20.0, 10.0, 10.0, 0.0), &mut canvas);

        // Just past the overlay's bottom-right corner, inside the offset shadow
        let shaded = canvas.frame().get_pixel(26, 26);
        assert!(shaded[0] < 255);
        assert_eq!(shaded[0], shaded[2]);
        // Far away nothing changes
        assert_eq!(*canvas.frame().get_pixel(2, 2), WHITE);
    }

    #[test]
    fn test_degenerate_placement_draws_nothing() {
        let mut canvas = Canvas::new(10, 10);
        let overlay = OverlayAsset::from_image(solid(4, 4, BLUE)).unwrap();
        RasterCompositor::default().draw_overlay(
            &overlay,
            &placement(5.0, 5.0, 0.0, 0.0, 0.0),
            &mut canvas,
        );
        assert!(canvas.frame().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_composite_redraws_from_scratch() {
        let mut canvas = Canvas::new(20, 20);
        let base = solid(20, 20, RED);
        let overlay = OverlayAsset::from_image(solid(4, 4, BLUE)).unwrap();
        let rect = canvas.fit_rect(BaseFit::Stretch, 20, 20);
        let mut compositor = RasterCompositor::new(ShadowStyle::none());

        compositor.composite(&base, rect, &overlay, &placement(5.0, 5.0, 4.0, 4.0, 0.0), &mut canvas);
        compositor.composite(&base, rect, &overlay, &placement(15.0, 15.0, 4.0, 4.0, 0.0), &mut canvas);

        // The first overlay position is gone
        assert_eq!(*canvas.frame().get_pixel(5, 5), RED);
        assert!(is_blue(canvas.frame().get_pixel(15, 15)));
    }
}
