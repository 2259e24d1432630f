//! This module contains tools for simulating a fixed ranging sensor: the construction of the
//! sensor's world frame, the regular grid of rays it emits, and the scanner which casts those rays
//! into a scene.

mod frame;
mod range_scanner;
mod ray_grid;

use crate::scene::{GeometryOracle, TargetState};
use rand::Rng;

pub use frame::SensorFrame;
pub use range_scanner::{RangeScanner, ScanSample};
pub use ray_grid::{FieldOfView, LocalDirections, RayGrid, Resolution};

pub trait SimulatedPointSensor {
    /// Sweep the sensor over the scene with the target at the pose held in `target`, returning the
    /// points which landed on the target in the order the rays were emitted.
    fn get_points<O, R>(&self, oracle: &O, target: &TargetState, rng: &mut R) -> ScanSample
    where
        O: GeometryOracle + ?Sized,
        R: Rng;
}
