//! The regular grid of rays emitted by the sensor.
//!
//! Pixel `(x, y)` of a `W x H` grid maps to the sensor-local direction
//!
//! ```text
//! u = x / W - 0.5                  v = y / H - 0.5
//! direction = normalize(tan(u * fov_h), tan(v * fov_v), -1)
//! ```
//!
//! This is a tangent-plane (pinhole) projection rather than a spherical one, so a ray at the edge
//! of the grid subtends exactly half the field of view from the optical axis.

use super::SensorFrame;
use crate::{Result, ScanError, UnitVec3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Sensor resolution in rays, written as `WxH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidConfig(format!(
                "resolution must be at least 1x1, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn ray_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || ScanError::InvalidConfig(format!("resolution '{s}' is not of the form WxH"));
        let (w, h) = split_pair(s).ok_or_else(bad)?;
        let w = w.parse::<u32>().map_err(|_| bad())?;
        let h = h.parse::<u32>().map_err(|_| bad())?;
        Self::new(w, h)
    }
}

/// Horizontal and vertical field of view in degrees, written as `HxV`. Each angle must lie in the
/// open interval (0, 180).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub horizontal_deg: f64,
    pub vertical_deg: f64,
}

impl FieldOfView {
    pub fn new(horizontal_deg: f64, vertical_deg: f64) -> Result<Self> {
        for (name, value) in [("horizontal", horizontal_deg), ("vertical", vertical_deg)] {
            if !(value > 0.0 && value < 180.0) {
                return Err(ScanError::InvalidConfig(format!(
                    "{name} field of view must be in (0, 180) degrees, got {value}"
                )));
            }
        }
        Ok(Self {
            horizontal_deg,
            vertical_deg,
        })
    }

    pub fn horizontal_rad(&self) -> f64 {
        self.horizontal_deg.to_radians()
    }

    pub fn vertical_rad(&self) -> f64 {
        self.vertical_deg.to_radians()
    }
}

impl Display for FieldOfView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.horizontal_deg, self.vertical_deg)
    }
}

impl FromStr for FieldOfView {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let bad =
            || ScanError::InvalidConfig(format!("field of view '{s}' is not of the form HxV"));
        let (h, v) = split_pair(s).ok_or_else(bad)?;
        let h = h.parse::<f64>().map_err(|_| bad())?;
        let v = v.parse::<f64>().map_err(|_| bad())?;
        Self::new(h, v)
    }
}

fn split_pair(s: &str) -> Option<(&str, &str)> {
    let (a, b) = s.trim().split_once(['x', 'X'])?;
    Some((a.trim(), b.trim()))
}

/// A validated resolution and field of view, from which the ray directions are generated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayGrid {
    resolution: Resolution,
    fov: FieldOfView,
}

impl RayGrid {
    /// Create a ray grid. `Resolution` and `FieldOfView` are re-validated here so that values
    /// built field-by-field (for instance through deserialization) cannot produce diverging rays.
    pub fn new(resolution: Resolution, fov: FieldOfView) -> Result<Self> {
        let resolution = Resolution::new(resolution.width, resolution.height)?;
        let fov = FieldOfView::new(fov.horizontal_deg, fov.vertical_deg)?;
        Ok(Self { resolution, fov })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn fov(&self) -> FieldOfView {
        self.fov
    }

    pub fn len(&self) -> usize {
        self.resolution.ray_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The pixel `(x, y)` of the ray at a row-major index
    pub fn pixel(&self, index: usize) -> (u32, u32) {
        let w = self.resolution.width as usize;
        ((index % w) as u32, (index / w) as u32)
    }

    /// The row-major index of pixel `(x, y)`
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.resolution.width as usize + x as usize
    }

    /// The sensor-local direction of the ray through pixel `(x, y)`
    pub fn local_direction(&self, x: u32, y: u32) -> UnitVec3 {
        let u = x as f64 / self.resolution.width as f64 - 0.5;
        let v = y as f64 / self.resolution.height as f64 - 0.5;
        let angle_x = u * self.fov.horizontal_rad();
        let angle_y = v * self.fov.vertical_rad();
        UnitVec3::new_normalize(Vector3::new(angle_x.tan(), angle_y.tan(), -1.0))
    }

    /// A lazy iterator over every local ray direction in row-major order (y outer, x inner). The
    /// grid can be iterated any number of times and always yields the same sequence.
    pub fn local_directions(&self) -> LocalDirections {
        LocalDirections {
            grid: *self,
            next: 0,
        }
    }

    /// The world-space ray directions for a sensor frame, in the same row-major order
    pub fn world_directions<'a>(
        &'a self,
        frame: &'a SensorFrame,
    ) -> impl ExactSizeIterator<Item = UnitVec3> + 'a {
        self.local_directions()
            .map(|d| UnitVec3::new_normalize(frame.to_world(&d)))
    }
}

#[derive(Debug, Clone)]
pub struct LocalDirections {
    grid: RayGrid,
    next: usize,
}

impl Iterator for LocalDirections {
    type Item = UnitVec3;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.grid.len() {
            return None;
        }
        let (x, y) = self.grid.pixel(self.next);
        self.next += 1;
        Some(self.grid.local_direction(x, y))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LocalDirections {}
