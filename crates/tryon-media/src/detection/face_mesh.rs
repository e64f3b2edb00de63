//! ONNX Runtime landmark source for the MediaPipe Face Mesh model.
//!
//! The model sees the whole photo padded to a square, so it works best on
//! portrait selfies where the face fills most of the frame.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, warn};
use tryon_models::{DetectorOptions, FaceLandmarks, NormalizedPoint};

use super::{Detection, LandmarkSource};
use crate::error::{MediaError, MediaResult};

/// Model input edge length.
const INPUT_SIZE: u32 = 192;

const LANDMARK_OUTPUT: &str = "output";
const SCORE_OUTPUT: &str = "score";

/// Square crop of the source image fed to the model, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SquareFrame {
    x: f32,
    y: f32,
    side: f32,
    image_width: f32,
    image_height: f32,
}

impl SquareFrame {
    fn around(width: u32, height: u32) -> Self {
        let side = width.max(height) as f32;
        Self {
            x: (width as f32 - side) / 2.0,
            y: (height as f32 - side) / 2.0,
            side,
            image_width: width as f32,
            image_height: height as f32,
        }
    }

    /// Model-space coordinate (0..1 of the square) to image-normalized.
    fn to_image(&self, nx: f32, ny: f32) -> (f64, f64) {
        let px = self.x + nx * self.side;
        let py = self.y + ny * self.side;
        (
            (px / self.image_width) as f64,
            (py / self.image_height) as f64,
        )
    }
}

/// Face Mesh landmark source.
pub struct FaceMeshSource {
    session: Arc<Mutex<Session>>,
    options: DetectorOptions,
}

impl FaceMeshSource {
    /// Load the model from `model_path`.
    pub fn load(model_path: &Path, options: DetectorOptions) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::FileNotFound(model_path.to_path_buf()));
        }
        let model_bytes = std::fs::read(model_path)?;

        let session = Session::builder()
            .map_err(|e| MediaError::detection_failed(format!("ORT session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MediaError::detection_failed(format!("ORT opt level: {e}")))?
            .commit_from_memory(model_bytes.as_slice())
            .map_err(|e| MediaError::detection_failed(format!("ORT load model: {e}")))?;

        debug!(path = %model_path.display(), "Face mesh model loaded");
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            options,
        })
    }

    /// Load from `FACE_MESH_MODEL` or the usual model locations.
    pub fn from_env(options: DetectorOptions) -> MediaResult<Self> {
        let path = find_model_path().ok_or_else(|| {
            MediaError::detection_failed(
                "face_landmark.onnx not found; set FACE_MESH_MODEL or place it under models/",
            )
        })?;
        Self::load(&path, options)
    }

    fn run(
        session: &Mutex<Session>,
        options: &DetectorOptions,
        image: &DynamicImage,
    ) -> MediaResult<Option<FaceLandmarks>> {
        let frame = SquareFrame::around(image.width(), image.height());
        let tensor = to_chw_tensor(&letterbox(image, &frame))?;

        let mut session = session
            .lock()
            .map_err(|_| MediaError::detection_failed("ORT session poisoned"))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| MediaError::detection_failed(format!("ORT run failed: {e}")))?;

        if let Some(score) = outputs.get(SCORE_OUTPUT) {
            let (_, data) = score
                .try_extract_tensor::<f32>()
                .map_err(|e| MediaError::detection_failed(format!("ORT extract: {e}")))?;
            let presence = data.first().map(|v| sigmoid(*v)).unwrap_or(0.0);
            if presence < options.min_detection_confidence {
                debug!(presence, "Face presence below threshold");
                return Ok(None);
            }
        }

        let output = outputs
            .get(LANDMARK_OUTPUT)
            .ok_or_else(|| MediaError::detection_failed("ORT returned no landmark output"))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("ORT extract: {e}")))?;

        // Accept [1,N,3], [N,3] or the flat [1,N*3]
        let (points, dim) = match shape.len() {
            3 if shape[0] == 1 => (shape[1] as usize, shape[2] as usize),
            2 if shape[1] % 3 == 0 && shape[0] == 1 => (shape[1] as usize / 3, 3),
            2 => (shape[0] as usize, shape[1] as usize),
            _ => {
                return Err(MediaError::detection_failed(format!(
                    "Unexpected face mesh output shape: {:?}",
                    shape
                )))
            }
        };
        if dim < 2 || data.len() < points * dim {
            return Err(MediaError::detection_failed("Face mesh output too short"));
        }

        Ok(Some(options.shape(decode_landmarks(data, points, dim, &frame))))
    }
}

#[async_trait]
impl LandmarkSource for FaceMeshSource {
    async fn detect(&self, image: &DynamicImage) -> Detection {
        let session = Arc::clone(&self.session);
        let options = self.options;
        let image = image.clone();
        let result =
            tokio::task::spawn_blocking(move || Self::run(&session, &options, &image)).await;
        match result {
            Ok(result) => Detection::from(result),
            Err(e) => {
                warn!(error = %e, "Face mesh task failed");
                Detection::Error(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "face_mesh"
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Pad to a square and resize to the model input.
fn letterbox(image: &DynamicImage, frame: &SquareFrame) -> RgbImage {
    let side = frame.side as u32;
    let mut square = RgbImage::from_pixel(side, side, Rgb([0, 0, 0]));
    imageops::overlay(
        &mut square,
        &image.to_rgb8(),
        -frame.x as i64,
        -frame.y as i64,
    );
    imageops::resize(&square, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
}

/// RGB HxWx3 to a (1,3,H,W) tensor normalized to [-1,1].
fn to_chw_tensor(rgb: &RgbImage) -> MediaResult<Value> {
    let (w, h) = rgb.dimensions();
    let mut chw = Vec::with_capacity((w * h * 3) as usize);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let v = rgb.get_pixel(x, y)[c] as f32 / 255.0;
                chw.push(v * 2.0 - 1.0);
            }
        }
    }

    let shape = vec![1usize, 3, h as usize, w as usize];
    Tensor::from_array((shape, chw.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| MediaError::detection_failed(format!("ORT tensor: {e}")))
}

/// Model output is in input pixels for the stock model, or already 0..1.
fn decode_landmarks(data: &[f32], points: usize, dim: usize, frame: &SquareFrame) -> FaceLandmarks {
    let pixel_space = data
        .iter()
        .step_by(dim)
        .take(points)
        .any(|v| *v > 1.5);
    let norm = if pixel_space { INPUT_SIZE as f32 } else { 1.0 };

    let points = (0..points)
        .map(|i| {
            let base = i * dim;
            let (x, y) = frame.to_image(data[base] / norm, data[base + 1] / norm);
            let z = if dim > 2 { data[base + 2] / norm } else { 0.0 };
            NormalizedPoint { x, y, z: z as f64 }
        })
        .collect();
    FaceLandmarks::new(points)
}

fn find_model_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("FACE_MESH_MODEL") {
        return Some(PathBuf::from(path));
    }
    const CANDIDATES: &[&str] = &[
        "./models/face_mesh/face_landmark.onnx",
        "/app/models/face_mesh/face_landmark.onnx",
    ];
    CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}
