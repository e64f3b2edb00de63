//! tryon CLI: render glasses onto a photo, upload photos, step through adjustments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tryon_client::TryOnClient;
use tryon_media::{
    BaseFit, LandmarkSource, OverlayAsset, OverlayLoader, RasterCompositor, RenderConfig,
    RenderOutcome, StaticLandmarkSource, TryOnSession,
};
use tryon_models::{AdjustmentParameters, PlacementTransform};

#[derive(Parser)]
#[command(name = "tryon")]
#[command(about = "Place a glasses overlay on a face photo using facial landmarks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one frame and print the placement as JSON.
    Render(RenderArgs),

    /// Upload a photo to the backend and print its URL.
    Upload {
        /// Photo to upload.
        #[arg(long)]
        image: PathBuf,
    },

    /// Render one frame per adjustment step, reusing the detected landmarks.
    Adjust(AdjustArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FitArg {
    Contain,
    Stretch,
}

impl From<FitArg> for BaseFit {
    fn from(value: FitArg) -> Self {
        match value {
            FitArg::Contain => BaseFit::Contain,
            FitArg::Stretch => BaseFit::Stretch,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct SessionArgs {
    /// Photo path, or an http(s) URL fetched through the backend client.
    #[arg(long)]
    image: String,

    /// Landmark file (JSON array of {x,y} points or {"faces": [...]}).
    #[arg(long)]
    landmarks: PathBuf,

    /// Overlay PNG; defaults to OVERLAY_PATH or the bundled asset locations.
    #[arg(long, conflicts_with = "builtin_overlay")]
    overlay: Option<PathBuf>,

    /// Use the procedurally drawn glasses instead of a PNG asset.
    #[arg(long)]
    builtin_overlay: bool,

    /// Canvas width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Canvas height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// How the photo is fitted into the canvas.
    #[arg(long, value_enum)]
    fit: Option<FitArg>,
}

#[derive(Debug, Clone, Args)]
struct RenderArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Overlay scale (clamped to 0.7..=1.5).
    #[arg(long, default_value = "1.0")]
    scale: f64,

    /// Vertical offset in pixels (clamped to -30..=30).
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    offset: i32,

    /// Output PNG.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct AdjustArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Scale steps, applied in order.
    #[arg(long = "scale")]
    scales: Vec<f64>,

    /// Vertical offset steps, applied in order after the scale steps.
    #[arg(long = "offset", allow_hyphen_values = true)]
    offsets: Vec<i32>,

    /// Directory receiving frame-NNN.png files.
    #[arg(long)]
    out_dir: PathBuf,
}

/// One adjustment applied by `adjust`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Scale(f64),
    Offset(i32),
}

impl AdjustArgs {
    fn steps(&self) -> Vec<Step> {
        self.scales
            .iter()
            .map(|s| Step::Scale(*s))
            .chain(self.offsets.iter().map(|o| Step::Offset(*o)))
            .collect()
    }
}

/// JSON line printed for every rendered frame.
#[derive(Debug, Serialize)]
struct FrameReport {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame: Option<PathBuf>,
    params: AdjustmentParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    transform: Option<PlacementTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FrameReport {
    fn new(outcome: &RenderOutcome, params: AdjustmentParameters, frame: Option<PathBuf>) -> Self {
        Self {
            outcome: outcome.label(),
            frame,
            params,
            transform: outcome.transform().copied(),
            error: outcome.error().map(|e| e.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => run_render(args).await,
        Commands::Upload { image } => run_upload(&image).await,
        Commands::Adjust(args) => run_adjust(args).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    let env_filter = EnvFilter::from_default_env().add_directive("tryon=warn".parse()?);
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run_render(args: RenderArgs) -> anyhow::Result<()> {
    let session = open_session(&args.session)?;
    let image = read_image(&args.session.image).await?;

    let outcome = session.load_image(image).await?;
    if !outcome.is_rendered() {
        warn!(outcome = outcome.label(), "Overlay not placed");
    }
    session.set_scale(args.scale).await?;
    let outcome = session.set_vertical_offset(args.offset).await?;

    session
        .save_frame(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;

    let report = FrameReport::new(&outcome, session.params()?, Some(args.out.clone()));
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_upload(path: &Path) -> anyhow::Result<()> {
    let client = TryOnClient::from_env()?;
    let url = client
        .upload_image(path)
        .await
        .with_context(|| format!("uploading {}", path.display()))?;
    println!("{}", url);
    Ok(())
}

async fn run_adjust(args: AdjustArgs) -> anyhow::Result<()> {
    let steps = args.steps();
    if steps.is_empty() {
        bail!("pass at least one --scale or --offset step");
    }

    let session = open_session(&args.session)?;
    let image = read_image(&args.session.image).await?;
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let outcome = session.load_image(image).await?;
    emit_frame(&session, &outcome, &args.out_dir, 0)?;

    for (i, step) in steps.iter().enumerate() {
        let outcome = match *step {
            Step::Scale(scale) => session.set_scale(scale).await?,
            Step::Offset(offset) => session.set_vertical_offset(offset).await?,
        };
        emit_frame(&session, &outcome, &args.out_dir, i + 1)?;
    }

    info!(frames = steps.len() + 1, "Adjustment frames written");
    Ok(())
}

fn emit_frame(
    session: &TryOnSession,
    outcome: &RenderOutcome,
    out_dir: &Path,
    index: usize,
) -> anyhow::Result<()> {
    let path = out_dir.join(format!("frame-{:03}.png", index));
    session
        .save_frame(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    let report = FrameReport::new(outcome, session.params()?, Some(path));
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn render_config(args: &SessionArgs) -> RenderConfig {
    let mut config = RenderConfig::from_env();
    if let Some(path) = &args.overlay {
        config = config.with_overlay_path(path);
    }
    if args.width.is_some() || args.height.is_some() {
        let width = args.width.unwrap_or(config.canvas_width);
        let height = args.height.unwrap_or(config.canvas_height);
        config = config.with_canvas_size(width, height);
    }
    if let Some(fit) = args.fit {
        config = config.with_base_fit(fit.into());
    }
    config
}

fn open_session(args: &SessionArgs) -> anyhow::Result<TryOnSession> {
    let source: Arc<dyn LandmarkSource> = Arc::new(
        StaticLandmarkSource::load(&args.landmarks)
            .with_context(|| format!("loading landmarks {}", args.landmarks.display()))?,
    );
    let config = render_config(args);

    let session = if args.builtin_overlay {
        let compositor = Box::new(RasterCompositor::new(config.calibration.shadow));
        let overlay = OverlayLoader::preloaded(OverlayAsset::builtin_glasses());
        TryOnSession::with_parts(source, config, overlay, compositor)?
    } else {
        TryOnSession::new(source, config)?
    };
    Ok(session)
}

async fn read_image(location: &str) -> anyhow::Result<image::DynamicImage> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let client = TryOnClient::from_env()?;
        return client
            .fetch_image(location)
            .await
            .with_context(|| format!("fetching {}", location));
    }
    let bytes = tokio::fs::read(location)
        .await
        .with_context(|| format!("reading {}", location))?;
    image::load_from_memory(&bytes).with_context(|| format!("decoding {}", location))
}

#[cfg(test)]
mod tests {
    use tryon_models::{FaceLandmarks, LandmarkRole, NormalizedPoint};

    use super::*;

    #[test]
    fn test_parse_render() {
        let cli = Cli::try_parse_from([
            "tryon",
            "render",
            "--image",
            "me.jpg",
            "--landmarks",
            "me.json",
            "--offset",
            "-12",
            "--out",
            "out.png",
            "--builtin-overlay",
        ])
        .unwrap();
        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.offset, -12);
        assert_eq!(args.scale, 1.0);
        assert!(args.session.builtin_overlay);
    }

    #[test]
    fn test_overlay_conflicts_with_builtin() {
        let result = Cli::try_parse_from([
            "tryon",
            "render",
            "--image",
            "me.jpg",
            "--landmarks",
            "me.json",
            "--out",
            "out.png",
            "--overlay",
            "g.png",
            "--builtin-overlay",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_adjust_steps_order() {
        let cli = Cli::try_parse_from([
            "tryon",
            "adjust",
            "--image",
            "me.jpg",
            "--landmarks",
            "me.json",
            "--scale",
            "1.2",
            "--offset",
            "-5",
            "--scale",
            "0.8",
            "--out-dir",
            "frames",
        ])
        .unwrap();
        let Commands::Adjust(args) = cli.command else {
            panic!("expected adjust");
        };
        assert_eq!(
            args.steps(),
            vec![Step::Scale(1.2), Step::Scale(0.8), Step::Offset(-5)]
        );
    }

    #[test]
    fn test_render_config_overrides() {
        let cli = Cli::try_parse_from([
            "tryon",
            "adjust",
            "--image",
            "me.jpg",
            "--landmarks",
            "me.json",
            "--width",
            "320",
            "--fit",
            "stretch",
            "--out-dir",
            "frames",
        ])
        .unwrap();
        let Commands::Adjust(args) = cli.command else {
            panic!("expected adjust");
        };
        let config = render_config(&args.session);
        assert_eq!(config.canvas_width, 320);
        assert_eq!(config.base_fit, BaseFit::Stretch);
    }

    #[tokio::test]
    async fn test_render_with_builtin_overlay() {
        let tmp = tempfile::tempdir().unwrap();
        let photo = tmp.path().join("face.png");
        image::RgbImage::from_pixel(640, 480, image::Rgb([180, 150, 130]))
            .save(&photo)
            .unwrap();

        let landmarks = FaceLandmarks::from_roles(
            468,
            [
                (LandmarkRole::NoseBridgeTop, NormalizedPoint::new(0.5, 0.42)),
                (LandmarkRole::LeftEyeInner, NormalizedPoint::new(0.45, 0.42)),
                (LandmarkRole::RightEyeInner, NormalizedPoint::new(0.55, 0.42)),
                (LandmarkRole::LeftEyeOuter, NormalizedPoint::new(0.4, 0.42)),
                (LandmarkRole::RightEyeOuter, NormalizedPoint::new(0.6, 0.42)),
            ],
        );
        let landmarks_path = tmp.path().join("face.json");
        std::fs::write(&landmarks_path, serde_json::to_string(&landmarks).unwrap()).unwrap();

        let out = tmp.path().join("out.png");
        run_render(RenderArgs {
            session: SessionArgs {
                image: photo.display().to_string(),
                landmarks: landmarks_path,
                overlay: None,
                builtin_overlay: true,
                width: None,
                height: None,
                fit: None,
            },
            scale: 1.0,
            offset: 0,
            out: out.clone(),
        })
        .await
        .unwrap();

        let frame = image::open(&out).unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
    }
}
