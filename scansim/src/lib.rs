//! Simulation of a fixed ranging sensor (LIDAR / depth camera style) which casts a regular grid
//! of rays into a scene, records where they strike a designated target object, and writes a
//! labeled dataset of point clouds paired with the randomized target pose that produced them.

pub mod config;
pub mod dataset;
mod errors;
pub mod pipeline;
pub mod pose;
pub mod scene;
pub mod sensors;
pub mod visualize;

pub use parry3d_f64::na;

pub type Point3 = na::Point3<f64>;
pub type Vector3 = na::Vector3<f64>;
pub type UnitVec3 = na::Unit<Vector3>;
pub type Iso3 = na::Isometry3<f64>;
pub type Rotation3 = na::Rotation3<f64>;
pub type Matrix4 = na::Matrix4<f64>;

pub type Result<T> = std::result::Result<T, ScanError>;

pub use config::{Position, RunConfig, UpAxis};
pub use dataset::GroundTruthRecord;
pub use errors::ScanError;
pub use pipeline::{CancelToken, DatasetGenerator, RunSummary};
pub use pose::{Pose, PoseRandomizer};
pub use scene::{GeometryOracle, ObjectId, RayHit, Scene, TargetProvider, TargetState};
pub use sensors::{
    FieldOfView, RangeScanner, RayGrid, Resolution, ScanSample, SensorFrame,
    SimulatedPointSensor,
};
pub use visualize::{DebugVisualizer, SetupViewRenderer};
