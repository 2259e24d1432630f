//! Run parameters for dataset generation and their validation.

use crate::sensors::{FieldOfView, RayGrid, Resolution, SensorFrame};
use crate::{Point3, Result, ScanError, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_ROTATION_RANGE_DEG: f64 = 180.0;
pub const DEFAULT_TRANSLATION_RANGE_M: f64 = 0.0;
pub const DEFAULT_NOISE_STD_DEV_M: f64 = 0.0;
pub const DEFAULT_TARGET: &str = "Cube";
pub const DEFAULT_MAX_RANGE_M: f64 = 100.0;

/// A world position written as `x,y,z` in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Point3);

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(Point3::new(x, y, z))
    }

    pub fn point(&self) -> Point3 {
        self.0
    }
}

impl Default for Position {
    fn default() -> Self {
        Self(Point3::origin())
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.0.x, self.0.y, self.0.z)
    }
}

impl FromStr for Position {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || ScanError::InvalidConfig(format!("position '{s}' is not of the form x,y,z"));
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| bad())?;
        match values.as_slice() {
            [x, y, z] if values.iter().all(|v| v.is_finite()) => Ok(Self::new(*x, *y, *z)),
            _ => Err(bad()),
        }
    }
}

/// The world axis used as the up reference when orienting the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

impl UpAxis {
    pub fn vector(&self) -> Vector3 {
        match self {
            UpAxis::Y => Vector3::y(),
            UpAxis::Z => Vector3::z(),
        }
    }
}

impl FromStr for UpAxis {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y" => Ok(UpAxis::Y),
            "z" => Ok(UpAxis::Z),
            _ => Err(ScanError::InvalidConfig(format!(
                "up axis must be 'y' or 'z', got '{s}'"
            ))),
        }
    }
}

impl Display for UpAxis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UpAxis::Y => write!(f, "y"),
            UpAxis::Z => write!(f, "z"),
        }
    }
}

/// Every parameter of a dataset generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub resolution: Resolution,
    pub fov: FieldOfView,
    pub sensor_position: Position,

    #[serde(default)]
    pub look_at: Position,

    #[serde(default)]
    pub up: UpAxis,

    pub sample_count: usize,
    pub output_dir: PathBuf,

    #[serde(default = "default_rotation_range")]
    pub rotation_range_deg: f64,

    #[serde(default)]
    pub translation_range_m: f64,

    #[serde(default)]
    pub noise_std_dev_m: f64,

    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "default_max_range")]
    pub max_range_m: f64,

    #[serde(default)]
    pub visualize: bool,

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub parallel_samples: bool,

    #[serde(default = "default_true")]
    pub parallel_rays: bool,
}

fn default_rotation_range() -> f64 {
    DEFAULT_ROTATION_RANGE_DEG
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

fn default_max_range() -> f64 {
    DEFAULT_MAX_RANGE_M
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    /// A configuration with the required parameters and every optional one at its default.
    pub fn new(
        resolution: Resolution,
        fov: FieldOfView,
        sensor_position: Position,
        sample_count: usize,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            resolution,
            fov,
            sensor_position,
            look_at: Position::default(),
            up: UpAxis::default(),
            sample_count,
            output_dir,
            rotation_range_deg: DEFAULT_ROTATION_RANGE_DEG,
            translation_range_m: DEFAULT_TRANSLATION_RANGE_M,
            noise_std_dev_m: DEFAULT_NOISE_STD_DEV_M,
            target: DEFAULT_TARGET.to_string(),
            max_range_m: DEFAULT_MAX_RANGE_M,
            visualize: false,
            seed: None,
            parallel_samples: false,
            parallel_rays: true,
        }
    }

    /// Check every parameter, including that the sensor can be oriented towards its look-at
    /// point. Nothing is sampled or written when this fails.
    pub fn validate(&self) -> Result<()> {
        RayGrid::new(self.resolution, self.fov)?;

        if self.sample_count == 0 {
            return Err(ScanError::InvalidConfig(
                "sample count must be positive".to_string(),
            ));
        }
        non_negative("rotation range", self.rotation_range_deg)?;
        non_negative("translation range", self.translation_range_m)?;
        non_negative("noise standard deviation", self.noise_std_dev_m)?;
        if !(self.max_range_m.is_finite() && self.max_range_m > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "maximum range must be positive, got {}",
                self.max_range_m
            )));
        }
        if self.target.trim().is_empty() {
            return Err(ScanError::InvalidConfig(
                "target identifier must not be empty".to_string(),
            ));
        }
        for p in [self.sensor_position, self.look_at] {
            if !p.0.iter().all(|v| v.is_finite()) {
                return Err(ScanError::InvalidConfig(format!(
                    "position ({p}) must be finite"
                )));
            }
        }

        self.sensor_frame()?;
        Ok(())
    }

    pub fn ray_grid(&self) -> Result<RayGrid> {
        RayGrid::new(self.resolution, self.fov)
    }

    pub fn sensor_frame(&self) -> Result<SensorFrame> {
        SensorFrame::look_at_with_up(
            self.sensor_position.point(),
            self.look_at.point(),
            &self.up.vector(),
        )
    }

    /// The provenance line written at the top of the ground truth table. `seed` is the seed
    /// actually used, which may have been drawn at run time.
    pub fn settings_line(&self, seed: u64) -> String {
        format!(
            "Res={}, FOV={}, Pos={}, Range={}, Noise={}, RotRange={}, TransRange={}, Target={}, Seed={}",
            self.resolution,
            self.fov,
            self.sensor_position,
            self.max_range_m,
            self.noise_std_dev_m,
            self.rotation_range_deg,
            self.translation_range_m,
            self.target,
            seed
        )
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ScanError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}
