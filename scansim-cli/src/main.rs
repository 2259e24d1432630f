//! Command line front end for generating simulated scan datasets.
//!
//! ```text
//! scansim --sensor-res 64x48 --sensor-fov 60x45 --position 0,0,5 --samples 100 --output out
//! ```

use anyhow::Context;
use clap::Parser;
use scansim::scene::SceneDescription;
use scansim::{
    CancelToken, DatasetGenerator, FieldOfView, Position, Resolution, RunConfig, Scene,
    SetupViewRenderer, UpAxis,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Generate labeled point cloud datasets from a simulated ranging sensor
#[derive(Parser)]
#[command(name = "scansim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sensor resolution in rays
    #[arg(long, value_name = "WxH")]
    sensor_res: Resolution,

    /// Horizontal and vertical field of view in degrees
    #[arg(long, value_name = "HxV")]
    sensor_fov: FieldOfView,

    /// Sensor position in world coordinates (meters)
    #[arg(long, value_name = "X,Y,Z", allow_hyphen_values = true)]
    position: Position,

    /// Number of samples to generate
    #[arg(long)]
    samples: usize,

    /// Output directory for the point clouds and ground truth table
    #[arg(long)]
    output: PathBuf,

    /// Rotation range in degrees, each angle is drawn from [-range, range]
    #[arg(long, default_value_t = scansim::config::DEFAULT_ROTATION_RANGE_DEG)]
    rot_range: f64,

    /// Translation range in meters, each offset is drawn from [-range, range]
    #[arg(long, default_value_t = scansim::config::DEFAULT_TRANSLATION_RANGE_M)]
    trans_range: f64,

    /// Standard deviation of the Gaussian noise added to each point (meters)
    #[arg(long, default_value_t = scansim::config::DEFAULT_NOISE_STD_DEV_M)]
    noise: f64,

    /// Name of the object to randomize and scan
    #[arg(long, default_value = scansim::config::DEFAULT_TARGET)]
    target_name: String,

    /// Maximum sensing distance in meters
    #[arg(long, default_value_t = scansim::config::DEFAULT_MAX_RANGE_M)]
    max_dist: f64,

    /// Render debug views of the sensor setup
    #[arg(long)]
    viz: bool,

    /// Seed for the random poses and noise, drawn at random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Point the sensor looks at
    #[arg(long, value_name = "X,Y,Z", default_value = "0,0,0", allow_hyphen_values = true)]
    look_at: Position,

    /// World up axis used to orient the sensor
    #[arg(long, default_value = "y")]
    up: UpAxis,

    /// Scene description (JSON); a single 2m cube named "Cube" is used when omitted
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Process samples in parallel
    #[arg(long)]
    parallel_samples: bool,

    /// Cast the rays of each sample on a single thread
    #[arg(long)]
    serial_rays: bool,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECONDS")]
    time_limit: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(
            self.sensor_res,
            self.sensor_fov,
            self.position,
            self.samples,
            self.output.clone(),
        );
        config.look_at = self.look_at;
        config.up = self.up;
        config.rotation_range_deg = self.rot_range;
        config.translation_range_m = self.trans_range;
        config.noise_std_dev_m = self.noise;
        config.target = self.target_name.clone();
        config.max_range_m = self.max_dist;
        config.visualize = self.viz;
        config.seed = self.seed;
        config.parallel_samples = self.parallel_samples;
        config.parallel_rays = !self.serial_rays;
        config
    }

    fn load_scene(&self) -> anyhow::Result<Scene> {
        let Some(path) = &self.scene else {
            info!("No scene given, using the default cube");
            return Ok(Scene::default_cube());
        };

        let description = SceneDescription::load(path)
            .with_context(|| format!("Failed to read scene {}", path.display()))?;
        let scene = description
            .build(path.parent())
            .with_context(|| format!("Failed to build scene {}", path.display()))?;
        info!("Loaded {} objects from {}", scene.len(), path.display());
        Ok(scene)
    }
}

fn start_watchdog(seconds: f64, cancel: CancelToken) -> anyhow::Result<()> {
    let limit = Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("Invalid time limit {seconds}"))?;
    std::thread::Builder::new()
        .name("scansim-watchdog".to_string())
        .spawn(move || {
            std::thread::sleep(limit);
            warn!("Time limit of {seconds}s reached, cancelling");
            cancel.cancel();
        })
        .context("Failed to start the watchdog thread")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let scene = cli.load_scene()?;
    let config = cli.run_config();
    let generator = DatasetGenerator::new(config, &scene, &scene)
        .context("Invalid run configuration")?;

    let cancel = CancelToken::new();
    if let Some(seconds) = cli.time_limit {
        start_watchdog(seconds, cancel.clone())?;
    }

    let renderer = SetupViewRenderer::default();
    let summary = generator
        .run(Some(&renderer), &cancel)
        .context("Dataset generation failed")?;

    info!(
        "Wrote {} samples ({} points) to {}",
        summary.samples,
        summary.total_points,
        cli.output.display()
    );
    info!("Ground truth: {}", summary.ground_truth.display());
    for view in summary.debug_views.iter() {
        info!("Debug view: {}", view.display());
    }
    info!("Seed: {}", summary.seed);

    Ok(())
}
