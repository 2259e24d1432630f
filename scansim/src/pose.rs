//! Random 6-DOF perturbations of the target object.

use crate::na::{Translation3, UnitQuaternion};
use crate::scene::TargetState;
use crate::{Iso3, Matrix4, Result, Rotation3, ScanError, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A rigid transform expressed as three Euler angles in radians and a translation in meters.
///
/// The angles follow the `XYZ` convention of common 3D hosts: the rotation about X is applied
/// first, then Y, then Z, so the composed rotation is `Rz * Ry * Rx`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

impl Pose {
    pub fn new(rx: f64, ry: f64, rz: f64, tx: f64, ty: f64, tz: f64) -> Self {
        Self {
            rx,
            ry,
            rz,
            tx,
            ty,
            tz,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn rotation(&self) -> Rotation3 {
        Rotation3::from_euler_angles(self.rx, self.ry, self.rz)
    }

    pub fn translation(&self) -> Vector3 {
        Vector3::new(self.tx, self.ty, self.tz)
    }

    /// The pose of a rigid placement, with the angles recovered in the same XYZ convention
    pub fn from_iso(iso: &Iso3) -> Self {
        let (rx, ry, rz) = iso.rotation.euler_angles();
        let t = iso.translation.vector;
        Self::new(rx, ry, rz, t.x, t.y, t.z)
    }

    pub fn to_iso(&self) -> Iso3 {
        Iso3::from_parts(
            Translation3::from(self.translation()),
            UnitQuaternion::from_rotation_matrix(&self.rotation()),
        )
    }

    /// The 4x4 homogeneous world transform. The rotation block is built directly from the Euler
    /// angles rather than through a quaternion so the written matrix matches the angles exactly.
    pub fn to_matrix(&self) -> Matrix4 {
        let mut m = self.rotation().to_homogeneous();
        m[(0, 3)] = self.tx;
        m[(1, 3)] = self.ty;
        m[(2, 3)] = self.tz;
        m
    }

    /// The six scalars in table order: rx, ry, rz, tx, ty, tz
    pub fn as_array(&self) -> [f64; 6] {
        [self.rx, self.ry, self.rz, self.tx, self.ty, self.tz]
    }
}

/// Draws independent uniform rotation and translation perturbations for the target object.
#[derive(Debug, Clone, Copy)]
pub struct PoseRandomizer {
    rotation_range_deg: f64,
    translation_range_m: f64,
}

impl PoseRandomizer {
    /// Create a randomizer which draws each Euler angle from `[-rotation_range_deg,
    /// rotation_range_deg]` (converted to radians) and each translation component from
    /// `[-translation_range_m, translation_range_m]`.
    ///
    /// # Arguments
    ///
    /// * `rotation_range_deg`: the symmetric rotation range in degrees, must be finite and >= 0
    /// * `translation_range_m`: the symmetric translation range in meters, must be finite and >= 0
    ///
    /// returns: Result<PoseRandomizer, ScanError>
    pub fn new(rotation_range_deg: f64, translation_range_m: f64) -> Result<Self> {
        check_range("rotation range", rotation_range_deg)?;
        check_range("translation range", translation_range_m)?;
        Ok(Self {
            rotation_range_deg,
            translation_range_m,
        })
    }

    pub fn rotation_range_deg(&self) -> f64 {
        self.rotation_range_deg
    }

    pub fn translation_range_m(&self) -> f64 {
        self.translation_range_m
    }

    /// Draw a new pose. The values are drawn in the order rx, ry, rz, tx, ty, tz.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Pose {
        let rx = symmetric(rng, self.rotation_range_deg).to_radians();
        let ry = symmetric(rng, self.rotation_range_deg).to_radians();
        let rz = symmetric(rng, self.rotation_range_deg).to_radians();
        let tx = symmetric(rng, self.translation_range_m);
        let ty = symmetric(rng, self.translation_range_m);
        let tz = symmetric(rng, self.translation_range_m);
        Pose::new(rx, ry, rz, tx, ty, tz)
    }

    /// Draw a new pose, move the target to it, and return the target's resulting world transform
    /// together with the raw pose scalars.
    pub fn apply<R: Rng>(&self, target: &mut TargetState, rng: &mut R) -> (Matrix4, Pose) {
        let pose = self.sample(rng);
        target.set_pose(pose);
        (target.world_matrix(), pose)
    }
}

fn check_range(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ScanError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

/// Uniform draw from the closed interval [-range, range]. A zero range is a point mass at zero.
fn symmetric<R: Rng>(rng: &mut R, range: f64) -> f64 {
    if range == 0.0 {
        return 0.0;
    }
    rng.random_range(-range..=range)
}
