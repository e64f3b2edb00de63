//! Try-on session: one photo, its cached landmarks, the user's adjustments
//! and the canvas they render into.
//!
//! Every render attempt takes a generation token. Work that finishes after
//! a newer attempt started is dropped without touching the canvas. The
//! landmark source runs once per loaded image; adjustments only re-run the
//! placement and the compositor.
//!
//! The session lock is never held across an await point.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use image::{DynamicImage, RgbaImage};
use tracing::{debug, info, warn};
use tryon_models::{AdjustmentParameters, FaceLandmarks, PlacementTransform};

use scopeguard::ScopeGuard;

use crate::canvas::{BaseFit, Canvas, FitRect};
use crate::compositor::{Compositor, RasterCompositor};
use crate::config::RenderConfig;
use crate::detection::{Detection, LandmarkSource};
use crate::error::{MediaError, MediaResult, PlacementError};
use crate::geometry::compute_placement;
use crate::metrics;
use crate::overlay::OverlayLoader;

/// Lifecycle of the current image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No overlay frame for the current image.
    #[default]
    Idle,
    /// The canvas shows the overlay at the current adjustments.
    Ready,
    /// Placement failed; the canvas is frozen on the last valid frame.
    Degraded,
}

/// What a render request did to the canvas.
#[derive(Debug)]
pub enum RenderOutcome {
    /// Base photo and overlay drawn.
    Rendered {
        generation: u64,
        transform: PlacementTransform,
    },
    /// Base photo drawn without the overlay: the asset is unavailable, or
    /// a freshly loaded photo has no usable face.
    BaseOnly { generation: u64, error: MediaError },
    /// Nothing drawn; the previous frame stays.
    Unchanged { error: MediaError },
    /// A newer request took over; this result was discarded.
    Superseded { generation: u64 },
    /// Detection is still running; it will render with the new adjustments.
    Deferred,
    /// No image loaded.
    NoImage,
}

impl RenderOutcome {
    pub fn transform(&self) -> Option<&PlacementTransform> {
        match self {
            RenderOutcome::Rendered { transform, .. } => Some(transform),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&MediaError> {
        match self {
            RenderOutcome::BaseOnly { error, .. } | RenderOutcome::Unchanged { error } => {
                Some(error)
            }
            _ => None,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }

    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            RenderOutcome::Rendered { .. } => "rendered",
            RenderOutcome::BaseOnly {
                error: MediaError::NoFaceDetected,
                ..
            } => "no_face",
            RenderOutcome::BaseOnly {
                error: MediaError::InsufficientLandmarks { .. },
                ..
            } => "insufficient_landmarks",
            RenderOutcome::BaseOnly { .. } => "base_only",
            RenderOutcome::Unchanged {
                error: MediaError::NoFaceDetected,
            } => "no_face",
            RenderOutcome::Unchanged {
                error: MediaError::InsufficientLandmarks { .. },
            } => "insufficient_landmarks",
            RenderOutcome::Unchanged { .. } => "unchanged",
            RenderOutcome::Superseded { .. } => "superseded",
            RenderOutcome::Deferred => "deferred",
            RenderOutcome::NoImage => "no_image",
        }
    }
}

#[derive(Clone)]
struct LoadedImage {
    id: u64,
    source: Arc<DynamicImage>,
    rgba: Arc<RgbaImage>,
}

/// Detection results worth keeping for the image's lifetime.
#[derive(Debug, Clone)]
enum CachedDetection {
    Face(FaceLandmarks),
    NoFace,
}

struct SessionData {
    compositor: Box<dyn Compositor>,
    canvas: Canvas,
    params: AdjustmentParameters,
    state: SessionState,
    image: Option<LoadedImage>,
    landmarks: Option<CachedDetection>,
    /// Image id whose detection is in flight.
    detecting: Option<u64>,
    /// An overlay frame was rendered for the current image.
    has_frame: bool,
    next_image_id: u64,
}

enum Step {
    Detect(LoadedImage),
    Render,
}

impl SessionData {
    /// Decide how a new render attempt proceeds, or why it cannot start.
    fn begin(&mut self) -> Result<Step, RenderOutcome> {
        let Some(image) = &self.image else {
            return Err(RenderOutcome::NoImage);
        };
        if self.detecting.is_some() {
            return Err(RenderOutcome::Deferred);
        }
        match self.landmarks {
            Some(_) => Ok(Step::Render),
            None => {
                let image = image.clone();
                self.detecting = Some(image.id);
                Ok(Step::Detect(image))
            }
        }
    }

    fn image_is(&self, id: u64) -> bool {
        self.image.as_ref().map(|i| i.id) == Some(id)
    }

    /// Re-renders of a placed image freeze the last frame. A new image
    /// without a placement shows the bare photo.
    fn placement_failed(
        &mut self,
        base_fit: BaseFit,
        generation: u64,
        error: MediaError,
    ) -> RenderOutcome {
        if self.has_frame {
            self.state = SessionState::Degraded;
            return RenderOutcome::Unchanged { error };
        }
        self.state = SessionState::Idle;
        let Some(image) = self.image.clone() else {
            return RenderOutcome::Unchanged { error };
        };
        let fit = self
            .canvas
            .fit_rect(base_fit, image.rgba.width(), image.rgba.height());
        self.compositor.draw_base(&image.rgba, fit, &mut self.canvas);
        RenderOutcome::BaseOnly { generation, error }
    }

    /// Clear the in-flight marker if it still belongs to `image_id`.
    fn release_detection(&mut self, image_id: u64) {
        if self.detecting == Some(image_id) {
            self.detecting = None;
        }
    }
}

struct Inner {
    source: Arc<dyn LandmarkSource>,
    config: RenderConfig,
    overlay: OverlayLoader,
    generation: AtomicU64,
    data: Mutex<SessionData>,
}

/// Handle to a try-on session. Clones share the same session.
#[derive(Clone)]
pub struct TryOnSession {
    inner: Arc<Inner>,
}

impl TryOnSession {
    /// Session with the raster compositor and the configured overlay path.
    pub fn new(source: Arc<dyn LandmarkSource>, config: RenderConfig) -> MediaResult<Self> {
        let overlay = OverlayLoader::from_path(config.overlay_path.clone());
        let compositor = Box::new(RasterCompositor::new(config.calibration.shadow));
        Self::with_parts(source, config, overlay, compositor)
    }

    /// Session with an explicit overlay loader and compositor.
    pub fn with_parts(
        source: Arc<dyn LandmarkSource>,
        config: RenderConfig,
        overlay: OverlayLoader,
        compositor: Box<dyn Compositor>,
    ) -> MediaResult<Self> {
        config.validate()?;
        let canvas = Canvas::new(config.canvas_width, config.canvas_height);
        let data = SessionData {
            compositor,
            canvas,
            params: AdjustmentParameters::default(),
            state: SessionState::Idle,
            image: None,
            landmarks: None,
            detecting: None,
            has_frame: false,
            next_image_id: 0,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                source,
                config,
                overlay,
                generation: AtomicU64::new(0),
                data: Mutex::new(data),
            }),
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.inner.config
    }

    /// Latest generation handed out.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MediaResult<SessionState> {
        Ok(self.lock()?.state)
    }

    pub fn params(&self) -> MediaResult<AdjustmentParameters> {
        Ok(self.lock()?.params)
    }

    /// Whether a detection result is cached for the current image.
    pub fn has_cached_detection(&self) -> MediaResult<bool> {
        Ok(self.lock()?.landmarks.is_some())
    }

    /// Copy of the current canvas contents.
    pub fn snapshot_frame(&self) -> MediaResult<RgbaImage> {
        Ok(self.lock()?.canvas.frame().clone())
    }

    /// Write the current canvas to disk.
    pub fn save_frame(&self, path: &Path) -> MediaResult<()> {
        let frame = self.snapshot_frame()?;
        frame.save(path)?;
        Ok(())
    }

    /// Replace the photo: drops cached landmarks, resets the adjustments,
    /// runs detection and renders.
    pub async fn load_image(&self, image: DynamicImage) -> MediaResult<RenderOutcome> {
        let started = Instant::now();
        let (generation, step) = {
            let mut data = self.lock()?;
            let id = data.next_image_id;
            data.next_image_id += 1;
            let rgba = Arc::new(image.to_rgba8());
            data.image = Some(LoadedImage {
                id,
                source: Arc::new(image),
                rgba,
            });
            data.landmarks = None;
            data.detecting = None;
            data.has_frame = false;
            data.params = AdjustmentParameters::default();
            data.state = SessionState::Idle;
            match data.begin() {
                Ok(step) => (self.next_generation(), step),
                Err(outcome) => return Ok(outcome),
            }
        };
        info!(generation, "Image loaded");
        self.finish(generation, step, started).await
    }

    /// Decode a photo file and load it.
    pub async fn load_image_file(&self, path: &Path) -> MediaResult<RenderOutcome> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path).await?;
        let image = image::load_from_memory(&bytes)?;
        self.load_image(image).await
    }

    /// Set the overlay scale (clamped) and re-render.
    pub async fn set_scale(&self, scale: f64) -> MediaResult<RenderOutcome> {
        self.adjust(|params| {
            let applied = params.set_scale(scale);
            debug!(requested = scale, applied, "Scale adjusted");
        })
        .await
    }

    /// Set the vertical offset in pixels (clamped) and re-render.
    pub async fn set_vertical_offset(&self, offset: i32) -> MediaResult<RenderOutcome> {
        self.adjust(|params| {
            let applied = params.set_vertical_offset(offset);
            debug!(requested = offset, applied, "Vertical offset adjusted");
        })
        .await
    }

    /// Re-render with the current adjustments.
    pub async fn rerender(&self) -> MediaResult<RenderOutcome> {
        self.adjust(|_| {}).await
    }

    async fn adjust(
        &self,
        apply: impl FnOnce(&mut AdjustmentParameters),
    ) -> MediaResult<RenderOutcome> {
        let started = Instant::now();
        let (generation, step) = {
            let mut data = self.lock()?;
            apply(&mut data.params);
            match data.begin() {
                Ok(step) => (self.next_generation(), step),
                Err(outcome) => {
                    debug!(outcome = outcome.label(), "Render not started");
                    return Ok(outcome);
                }
            }
        };
        self.finish(generation, step, started).await
    }

    async fn finish(
        &self,
        generation: u64,
        step: Step,
        started: Instant,
    ) -> MediaResult<RenderOutcome> {
        let outcome = match step {
            Step::Detect(image) => match self.detect(generation, image).await? {
                Some(outcome) => outcome,
                None => self.render(generation).await?,
            },
            Step::Render => self.render(generation).await?,
        };
        metrics::record_render(outcome.label(), started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// Run the landmark source and cache its result.
    ///
    /// Returns an outcome when rendering must not continue.
    async fn detect(
        &self,
        generation: u64,
        image: LoadedImage,
    ) -> MediaResult<Option<RenderOutcome>> {
        let source = self.inner.source.as_ref();
        let started = Instant::now();
        // A dropped future must not leave the image marked as detecting
        let in_flight = scopeguard::guard(image.id, |id| {
            if let Ok(mut data) = self.inner.data.lock() {
                data.release_detection(id);
            }
        });
        let detection = source.detect(&image.source).await;
        ScopeGuard::into_inner(in_flight);
        metrics::record_detection(
            source.name(),
            detection.kind(),
            started.elapsed().as_secs_f64(),
        );

        let mut data = self.lock()?;
        if !data.image_is(image.id) {
            debug!(generation, "Discarding detection for a replaced image");
            metrics::record_stale_result("detection");
            return Ok(Some(RenderOutcome::Superseded { generation }));
        }
        data.release_detection(image.id);
        match detection {
            Detection::Detected(landmarks) => {
                debug!(generation, points = landmarks.len(), "Landmarks cached");
                data.landmarks = Some(CachedDetection::Face(landmarks));
                Ok(None)
            }
            Detection::NoFace => {
                data.landmarks = Some(CachedDetection::NoFace);
                Ok(None)
            }
            Detection::Error(reason) => {
                // Not cached: the next request retries detection
                warn!(generation, reason = %reason, "Landmark detection failed");
                Ok(Some(data.placement_failed(
                    self.inner.config.base_fit,
                    generation,
                    MediaError::detection_failed(reason),
                )))
            }
        }
    }

    async fn render(&self, generation: u64) -> MediaResult<RenderOutcome> {
        let (image, fit, transform) = {
            let mut data = self.lock()?;
            if self.is_stale(generation) {
                return Ok(self.superseded(generation, "placement"));
            }
            let Some(image) = data.image.clone() else {
                return Ok(RenderOutcome::NoImage);
            };
            let fit = data.canvas.fit_rect(
                self.inner.config.base_fit,
                image.rgba.width(),
                image.rgba.height(),
            );
            match self.place(data.landmarks.as_ref(), fit, &data.params) {
                Ok(transform) => (image, fit, transform),
                Err(e) => {
                    debug!(generation, error = %e, "Placement failed");
                    return Ok(data.placement_failed(
                        self.inner.config.base_fit,
                        generation,
                        e.into(),
                    ));
                }
            }
        };

        // The overlay is drawn only once fully decoded
        let overlay = self.inner.overlay.get().await;

        let mut data = self.lock()?;
        if self.is_stale(generation) {
            return Ok(self.superseded(generation, "composite"));
        }
        let SessionData {
            compositor,
            canvas,
            ..
        } = &mut *data;
        match overlay {
            Ok(asset) => {
                compositor.composite(&image.rgba, fit, &asset, &transform, canvas);
                data.has_frame = true;
                data.state = SessionState::Ready;
                debug!(
                    generation,
                    center_x = transform.center_x,
                    center_y = transform.center_y,
                    width = transform.width,
                    angle = transform.angle_degrees(),
                    "Frame rendered"
                );
                Ok(RenderOutcome::Rendered {
                    generation,
                    transform,
                })
            }
            Err(error) => {
                compositor.draw_base(&image.rgba, fit, canvas);
                metrics::record_asset_failure();
                warn!(generation, error = %error, "Overlay unavailable, drew base image only");
                Ok(RenderOutcome::BaseOnly { generation, error })
            }
        }
    }

    /// Placement in canvas pixels. Landmarks are relative to the drawn photo.
    fn place(
        &self,
        landmarks: Option<&CachedDetection>,
        fit: FitRect,
        params: &AdjustmentParameters,
    ) -> Result<PlacementTransform, PlacementError> {
        let landmarks = match landmarks {
            Some(CachedDetection::Face(landmarks)) => landmarks,
            Some(CachedDetection::NoFace) | None => return Err(PlacementError::NoFaceDetected),
        };
        let transform = compute_placement(
            landmarks,
            fit.width,
            fit.height,
            params,
            &self.inner.config.calibration,
        )?;
        Ok(transform.translated(fit.x as f64, fit.y as f64))
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_stale(&self, generation: u64) -> bool {
        generation != self.generation()
    }

    fn superseded(&self, generation: u64, stage: &str) -> RenderOutcome {
        debug!(generation, latest = self.generation(), stage, "Discarding stale render");
        metrics::record_stale_result(stage);
        RenderOutcome::Superseded { generation }
    }

    fn lock(&self) -> MediaResult<MutexGuard<'_, SessionData>> {
        self.inner
            .data
            .lock()
            .map_err(|_| MediaError::internal("session state poisoned"))
    }
}

impl std::fmt::Debug for TryOnSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TryOnSession")
            .field("source", &self.inner.source.name())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayCalibration;
    use crate::detection::StaticLandmarkSource;
    use crate::overlay::OverlayAsset;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;
    use tryon_models::{LandmarkRole, NormalizedPoint, FACE_MESH_LANDMARK_COUNT};

    const EPS: f64 = 1e-9;

    #[derive(Clone, Default)]
    struct CountingCompositor {
        bases: Arc<AtomicUsize>,
        overlays: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<PlacementTransform>>>,
    }

    impl CountingCompositor {
        fn overlays(&self) -> usize {
            self.overlays.load(Ordering::SeqCst)
        }

        fn bases(&self) -> usize {
            self.bases.load(Ordering::SeqCst)
        }

        fn last(&self) -> Option<PlacementTransform> {
            *self.last.lock().unwrap()
        }
    }

    impl Compositor for CountingCompositor {
        fn draw_base(&mut self, _base: &RgbaImage, _target: FitRect, canvas: &mut Canvas) {
            self.bases.fetch_add(1, Ordering::SeqCst);
            canvas.clear();
        }

        fn draw_overlay(
            &mut self,
            _overlay: &OverlayAsset,
            transform: &PlacementTransform,
            canvas: &mut Canvas,
        ) {
            self.overlays.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(*transform);
            // Leave a mark so frame changes are observable
            let n = self.overlays() as u8;
            canvas.frame_mut().put_pixel(0, 0, image::Rgba([n, n, n, 255]));
        }
    }

    /// Counts calls; blocks on `gate` for images narrower than 100px.
    struct ScriptedSource {
        detection: Detection,
        calls: AtomicUsize,
        gate: Arc<Notify>,
    }

    impl ScriptedSource {
        fn new(detection: Detection) -> Arc<Self> {
            Arc::new(Self {
                detection,
                calls: AtomicUsize::new(0),
                gate: Arc::new(Notify::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LandmarkSource for ScriptedSource {
        async fn detect(&self, image: &DynamicImage) -> Detection {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if image.width() < 100 {
                self.gate.notified().await;
            }
            self.detection.clone()
        }
    }

    /// Level eyes at the reference positions of a 640x480 photo.
    fn reference_face() -> FaceLandmarks {
        let norm = |x: f64, y: f64| NormalizedPoint::new(x / 640.0, y / 480.0);
        FaceLandmarks::from_roles(
            FACE_MESH_LANDMARK_COUNT,
            [
                (LandmarkRole::NoseBridgeTop, norm(320.0, 190.0)),
                (LandmarkRole::LeftEyeInner, norm(300.0, 200.0)),
                (LandmarkRole::RightEyeInner, norm(340.0, 200.0)),
                (LandmarkRole::LeftEyeOuter, norm(280.0, 200.0)),
                (LandmarkRole::RightEyeOuter, norm(360.0, 200.0)),
            ],
        )
    }

    fn photo() -> DynamicImage {
        DynamicImage::new_rgba8(640, 480)
    }

    fn session_with(
        source: Arc<dyn LandmarkSource>,
        overlay: OverlayLoader,
    ) -> (TryOnSession, CountingCompositor) {
        let compositor = CountingCompositor::default();
        let session = TryOnSession::with_parts(
            source,
            RenderConfig::default(),
            overlay,
            Box::new(compositor.clone()),
        )
        .unwrap();
        (session, compositor)
    }

    fn session(source: Arc<dyn LandmarkSource>) -> (TryOnSession, CountingCompositor) {
        session_with(source, OverlayLoader::preloaded(OverlayAsset::builtin_glasses()))
    }

    #[tokio::test]
    async fn test_reference_render() {
        let (session, compositor) = session(Arc::new(StaticLandmarkSource::new(reference_face())));

        let outcome = session.load_image(photo()).await.unwrap();
        let t = *outcome.transform().unwrap();
        assert!((t.center_x - 320.0).abs() < EPS);
        assert!((t.center_y - 200.0).abs() < EPS);
        assert!((t.width - 104.0).abs() < EPS);
        assert!((t.height - 36.4).abs() < EPS);
        assert_eq!(t.angle_radians, 0.0);

        assert_eq!(compositor.overlays(), 1);
        assert_eq!(session.state().unwrap(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_adjustments_reuse_cached_landmarks() {
        let source = ScriptedSource::new(Detection::Detected(reference_face()));
        let (session, compositor) = session(source.clone());

        session.load_image(photo()).await.unwrap();
        session.set_scale(1.2).await.unwrap();
        session.set_vertical_offset(10).await.unwrap();
        let outcome = session.rerender().await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(compositor.overlays(), 4);
        let t = outcome.transform().unwrap();
        assert!((t.width - 104.0 * 1.2).abs() < EPS);
        assert!((t.center_y - 210.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_scale_is_clamped_before_render() {
        let (session, _) = session(Arc::new(StaticLandmarkSource::new(reference_face())));
        session.load_image(photo()).await.unwrap();

        let outcome = session.set_scale(2.0).await.unwrap();
        assert_eq!(session.params().unwrap().scale(), 1.5);
        assert!((outcome.transform().unwrap().width - 104.0 * 1.5).abs() < EPS);

        let outcome = session.set_vertical_offset(-100).await.unwrap();
        assert_eq!(session.params().unwrap().vertical_offset_px(), -30);
        assert!((outcome.transform().unwrap().center_y - 170.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_same_scale_twice_is_identical() {
        let (session, _) = session(Arc::new(StaticLandmarkSource::new(reference_face())));
        session.load_image(photo()).await.unwrap();

        let first = *session.set_scale(1.1).await.unwrap().transform().unwrap();
        let second = *session.set_scale(1.1).await.unwrap().transform().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_no_face_draws_bare_photo() {
        let source = ScriptedSource::new(Detection::NoFace);
        let (session, compositor) = session(source.clone());

        let outcome = session.load_image(photo()).await.unwrap();
        assert!(matches!(
            outcome,
            RenderOutcome::BaseOnly {
                error: MediaError::NoFaceDetected,
                ..
            }
        ));
        assert_eq!(outcome.label(), "no_face");
        assert_eq!(compositor.overlays(), 0);
        assert_eq!(compositor.bases(), 1);
        assert_eq!(session.state().unwrap(), SessionState::Idle);

        // Cached: adjusting does not detect again
        session.set_scale(1.3).await.unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(compositor.overlays(), 0);
        assert_eq!(session.state().unwrap(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_short_landmarks_never_composite() {
        let short = FaceLandmarks::from_xy((0..300).map(|_| (0.5, 0.5)));
        let (session, compositor) = session(Arc::new(StaticLandmarkSource::new(short)));

        let outcome = session.load_image(photo()).await.unwrap();
        assert!(matches!(
            outcome.error(),
            Some(MediaError::InsufficientLandmarks {
                required: 363,
                found: 300
            })
        ));
        assert_eq!(compositor.overlays(), 0);
    }

    /// Finds the reference face only in full-size photos.
    struct FullSizeOnly;

    #[async_trait]
    impl LandmarkSource for FullSizeOnly {
        async fn detect(&self, image: &DynamicImage) -> Detection {
            if image.width() == 640 {
                Detection::Detected(reference_face())
            } else {
                Detection::NoFace
            }
        }
    }

    #[tokio::test]
    async fn test_new_photo_without_face_drops_old_frame() {
        let (session, compositor) = session(Arc::new(FullSizeOnly));
        session.load_image(photo()).await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Ready);
        let frame = session.snapshot_frame().unwrap();

        let outcome = session
            .load_image(DynamicImage::new_rgba8(320, 240))
            .await
            .unwrap();
        assert_eq!(outcome.label(), "no_face");
        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert_eq!(compositor.bases(), 2);
        assert_eq!(compositor.overlays(), 1);
        assert_ne!(session.snapshot_frame().unwrap(), frame);

        // Still no face after adjusting; the old glasses never come back
        session.set_scale(1.2).await.unwrap();
        assert_eq!(session.state().unwrap(), SessionState::Idle);
        assert_eq!(compositor.overlays(), 1);
    }

    #[tokio::test]
    async fn test_detection_error_is_retried() {
        let source = ScriptedSource::new(Detection::Error("model crashed".into()));
        let (session, compositor) = session(source.clone());

        let outcome = session.load_image(photo()).await.unwrap();
        assert!(matches!(
            outcome.error(),
            Some(MediaError::DetectionFailed(_))
        ));
        assert!(!session.has_cached_detection().unwrap());

        session.rerender().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(compositor.overlays(), 0);
    }

    #[tokio::test]
    async fn test_missing_asset_draws_base_only() {
        let dir = tempfile::tempdir().unwrap();
        let (session, compositor) = session_with(
            Arc::new(StaticLandmarkSource::new(reference_face())),
            OverlayLoader::from_path(dir.path().join("missing.png")),
        );

        let outcome = session.load_image(photo()).await.unwrap();
        assert!(matches!(
            outcome,
            RenderOutcome::BaseOnly {
                error: MediaError::AssetLoadFailure(_),
                ..
            }
        ));
        assert_eq!(compositor.bases(), 1);
        assert_eq!(compositor.overlays(), 0);
        assert_eq!(session.state().unwrap(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stale_detection_is_discarded() {
        let source = ScriptedSource::new(Detection::Detected(reference_face()));
        let (session, compositor) = session(source.clone());
        let gate = source.gate.clone();

        // The first photo blocks in detection until the second one rendered
        let (first, second) = tokio::join!(
            session.load_image(DynamicImage::new_rgba8(64, 48)),
            async {
                let outcome = session.load_image(photo()).await;
                gate.notify_one();
                outcome
            }
        );

        assert!(matches!(first.unwrap(), RenderOutcome::Superseded { generation: 1 }));
        assert!(matches!(
            second.unwrap(),
            RenderOutcome::Rendered { generation: 2, .. }
        ));
        assert_eq!(compositor.overlays(), 1);
        assert!((compositor.last().unwrap().center_x - 320.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_adjustment_during_detection_is_deferred() {
        let source = ScriptedSource::new(Detection::Detected(reference_face()));
        let (session, compositor) = session(source.clone());
        let gate = source.gate.clone();

        // 64x48 keeps the landmarks' relative geometry on a smaller photo
        let (loaded, adjusted) = tokio::join!(
            session.load_image(DynamicImage::new_rgba8(64, 48)),
            async {
                let outcome = session.set_scale(1.2).await;
                gate.notify_one();
                outcome
            }
        );

        assert!(matches!(adjusted.unwrap(), RenderOutcome::Deferred));
        let loaded = loaded.unwrap();
        assert!(loaded.is_rendered());
        assert_eq!(source.calls(), 1);
        assert_eq!(compositor.overlays(), 1);
        // The photo is scaled up to fill the 640x480 canvas
        assert!((loaded.transform().unwrap().width - 104.0 * 1.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_cancelled_detection_allows_adjustments() {
        let source = ScriptedSource::new(Detection::Detected(reference_face()));
        let (session, compositor) = session(source.clone());

        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            session.load_image(DynamicImage::new_rgba8(64, 48)),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(compositor.overlays(), 0);

        // Lets the retried detection through
        source.gate.notify_one();
        let outcome = session.set_scale(1.2).await.unwrap();
        assert!(outcome.is_rendered());
        assert_eq!(source.calls(), 2);
        assert_eq!(session.state().unwrap(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_adjust_without_image() {
        let (session, compositor) = session(Arc::new(StaticLandmarkSource::no_face()));
        assert!(matches!(
            session.set_scale(1.2).await.unwrap(),
            RenderOutcome::NoImage
        ));
        assert_eq!(session.params().unwrap().scale(), 1.2);
        assert_eq!(compositor.bases(), 0);
    }

    #[tokio::test]
    async fn test_letterboxed_photo_keeps_alignment() {
        // Square photo on 640x480: drawn at x=80, 480x480
        let face = FaceLandmarks::from_roles(
            FACE_MESH_LANDMARK_COUNT,
            [
                (LandmarkRole::LeftEyeInner, NormalizedPoint::new(0.45, 0.4)),
                (LandmarkRole::RightEyeInner, NormalizedPoint::new(0.55, 0.4)),
                (LandmarkRole::LeftEyeOuter, NormalizedPoint::new(0.4, 0.4)),
                (LandmarkRole::RightEyeOuter, NormalizedPoint::new(0.6, 0.4)),
            ],
        );
        let (session, _) = session(Arc::new(StaticLandmarkSource::new(face)));

        let outcome = session
            .load_image(DynamicImage::new_rgba8(1000, 1000))
            .await
            .unwrap();
        let t = outcome.transform().unwrap();
        assert!((t.center_x - (80.0 + 0.5 * 480.0)).abs() < 1e-6);
        assert!((t.center_y - 0.4 * 480.0).abs() < 1e-6);
        assert!((t.width - 0.2 * 480.0 * 1.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_new_image_resets_adjustments() {
        let (session, _) = session(Arc::new(StaticLandmarkSource::new(reference_face())));
        session.load_image(photo()).await.unwrap();
        session.set_scale(1.4).await.unwrap();

        session.load_image(photo()).await.unwrap();
        assert_eq!(session.params().unwrap(), AdjustmentParameters::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RenderConfig::default().with_calibration(OverlayCalibration {
            width_factor: 0.0,
            ..OverlayCalibration::default()
        });
        let result = TryOnSession::new(Arc::new(StaticLandmarkSource::no_face()), config);
        assert!(matches!(result, Err(MediaError::InvalidConfig(_))));
    }
}
