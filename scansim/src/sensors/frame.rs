//! The fixed world-space position and orientation of the sensor.

use crate::na::{Matrix3, Translation3, UnitQuaternion};
use crate::{Iso3, Point3, Result, Rotation3, ScanError, UnitVec3, Vector3};

/// The sensor's position and orientation in world space. The sensor looks down its local -Z axis
/// with local +Y as up, the same convention used by most camera models.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrame {
    position: Point3,
    orientation: Rotation3,
}

impl SensorFrame {
    /// Build a frame at `position` whose forward (-Z) axis points exactly at `target`, using the
    /// world +Y axis as the up reference.
    pub fn look_at(position: Point3, target: Point3) -> Result<Self> {
        Self::look_at_with_up(position, target, &Vector3::y())
    }

    /// Build a frame at `position` whose forward (-Z) axis points exactly at `target`.
    ///
    /// The orientation matrix has the columns `[right, up, -forward]`, where
    /// `forward = normalize(target - position)`, `right = normalize(forward x up_ref)` and
    /// `up = right x forward`.
    ///
    /// # Arguments
    ///
    /// * `position`: the world position of the sensor
    /// * `target`: the world point the sensor looks at
    /// * `up_ref`: the world direction the sensor's local +Y should lean towards
    ///
    /// returns: Result<SensorFrame, ScanError>
    ///
    /// Fails with `DegenerateLookAt` when the position coincides with the target, or when the
    /// viewing direction is parallel to the up reference.
    pub fn look_at_with_up(position: Point3, target: Point3, up_ref: &Vector3) -> Result<Self> {
        let degenerate = || ScanError::DegenerateLookAt { position, target };

        let forward = (target - position)
            .try_normalize(1e-12)
            .ok_or_else(degenerate)?;
        let right = forward.cross(up_ref).try_normalize(1e-9).ok_or_else(degenerate)?;
        let up = right.cross(&forward);

        let m = Matrix3::from_columns(&[right, up, -forward]);
        Ok(Self {
            position,
            orientation: Rotation3::from_matrix_unchecked(m),
        })
    }

    pub fn position(&self) -> &Point3 {
        &self.position
    }

    pub fn orientation(&self) -> &Rotation3 {
        &self.orientation
    }

    /// The world direction of the sensor's optical axis (local -Z)
    pub fn forward(&self) -> UnitVec3 {
        UnitVec3::new_unchecked(-self.orientation.matrix().column(2).into_owned())
    }

    pub fn right(&self) -> UnitVec3 {
        UnitVec3::new_unchecked(self.orientation.matrix().column(0).into_owned())
    }

    pub fn up(&self) -> UnitVec3 {
        UnitVec3::new_unchecked(self.orientation.matrix().column(1).into_owned())
    }

    /// Rotate a direction from the sensor's local frame into world space
    pub fn to_world(&self, local: &Vector3) -> Vector3 {
        self.orientation * local
    }

    /// Rotate a direction from world space into the sensor's local frame
    pub fn to_local(&self, world: &Vector3) -> Vector3 {
        self.orientation.inverse() * world
    }

    /// The rigid transform which takes sensor-local coordinates to world coordinates
    pub fn to_iso(&self) -> Iso3 {
        Iso3::from_parts(
            Translation3::from(self.position.coords),
            UnitQuaternion::from_rotation_matrix(&self.orientation),
        )
    }
}
