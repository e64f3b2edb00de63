//! Overlay asset loading.
//!
//! The compositor never draws a partially loaded asset: callers await
//! [`OverlayLoader::get`], which resolves once the image is fully decoded.
//! A failed load is not cached, so the next render retries it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_ellipse_mut};
use imageproc::rect::Rect;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// A decoded overlay image (RGBA with transparency).
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayAsset {
    image: RgbaImage,
}

impl OverlayAsset {
    pub fn from_image(image: RgbaImage) -> MediaResult<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(MediaError::asset_load_failure("overlay image is empty"));
        }
        Ok(Self { image })
    }

    /// Read and decode an overlay from disk.
    pub async fn load(path: &Path) -> MediaResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            MediaError::asset_load_failure(format!("{}: {}", path.display(), e))
        })?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| MediaError::asset_load_failure(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        Self::from_image(image)
    }

    /// A simple pair of dark round frames, used when no asset file is configured.
    pub fn builtin_glasses() -> Self {
        const WIDTH: u32 = 400;
        const HEIGHT: u32 = 140;
        let frame = Rgba([20, 20, 24, 255]);
        let lens = Rgba([60, 70, 90, 90]);

        let mut image = RgbaImage::new(WIDTH, HEIGHT);
        for (cx, cy) in [(105, 70), (295, 70)] {
            // Tinted lens, then a frame a few pixels thick
            for ry in 1..56 {
                let rx = (ry as f64 * 85.0 / 56.0).round() as i32;
                draw_hollow_ellipse_mut(&mut image, (cx, cy), rx, ry, lens);
            }
            for t in 0..6 {
                draw_hollow_ellipse_mut(&mut image, (cx, cy), 90 - t, 62 - t, frame);
            }
        }
        // Bridge and temples
        draw_filled_rect_mut(&mut image, Rect::at(190, 52).of_size(20, 6), frame);
        draw_filled_rect_mut(&mut image, Rect::at(0, 40).of_size(16, 6), frame);
        draw_filled_rect_mut(&mut image, Rect::at(WIDTH as i32 - 16, 40).of_size(16, 6), frame);

        Self { image }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Lazily loads the overlay once and hands out shared references.
#[derive(Debug)]
pub struct OverlayLoader {
    path: Option<PathBuf>,
    cell: OnceCell<Arc<OverlayAsset>>,
}

impl OverlayLoader {
    /// Load from `path` on first use.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cell: OnceCell::new(),
        }
    }

    /// Use an already decoded asset.
    pub fn preloaded(asset: OverlayAsset) -> Self {
        Self {
            path: None,
            cell: OnceCell::new_with(Some(Arc::new(asset))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Wait until the asset is decoded.
    pub async fn get(&self) -> MediaResult<Arc<OverlayAsset>> {
        let asset = self
            .cell
            .get_or_try_init(|| async {
                let path = self
                    .path
                    .as_deref()
                    .ok_or_else(|| MediaError::asset_load_failure("no overlay path configured"))?;
                debug!(path = %path.display(), "Loading overlay asset");
                match OverlayAsset::load(path).await {
                    Ok(asset) => {
                        let (w, h) = asset.dimensions();
                        info!(path = %path.display(), width = w, height = h, "Overlay asset loaded");
                        Ok(Arc::new(asset))
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Overlay asset failed to load");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(asset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_glasses_has_transparent_background() {
        let asset = OverlayAsset::builtin_glasses();
        assert_eq!(asset.dimensions(), (400, 140));
        assert_eq!(asset.image().get_pixel(0, 139)[3], 0);
        // Frame pixel on the left rim
        assert_eq!(asset.image().get_pixel(15, 70)[3], 255);
    }

    #[test]
    fn test_empty_image_rejected() {
        let err = OverlayAsset::from_image(RgbaImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, MediaError::AssetLoadFailure(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_asset_failure_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glasses.png");
        let loader = OverlayLoader::from_path(&path);

        let err = loader.get().await.unwrap_err();
        assert!(matches!(err, MediaError::AssetLoadFailure(_)));
        assert!(!loader.is_loaded());

        OverlayAsset::builtin_glasses().image().save(&path).unwrap();
        let asset = loader.get().await.unwrap();
        assert_eq!(asset.dimensions(), (400, 140));
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn test_undecodable_file_is_asset_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glasses.png");
        std::fs::write(&path, b"not a png").unwrap();

        let err = OverlayLoader::from_path(&path).get().await.unwrap_err();
        assert!(matches!(err, MediaError::AssetLoadFailure(_)));
    }

    #[tokio::test]
    async fn test_preloaded_resolves_immediately() {
        let loader = OverlayLoader::preloaded(OverlayAsset::builtin_glasses());
        assert!(loader.is_loaded());
        assert!(loader.get().await.is_ok());
    }
}
