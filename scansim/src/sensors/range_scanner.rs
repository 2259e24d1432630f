//! The scanner which casts the ray grid into the scene and keeps the hits on the target.

use super::{RayGrid, SensorFrame, SimulatedPointSensor};
use crate::scene::{GeometryOracle, TargetState};
use crate::{Point3, Result, ScanError, UnitVec3, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

/// The ordered points produced by one full sweep of the ray grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSample {
    points: Vec<Point3>,
    ray_indices: Vec<usize>,
}

impl ScanSample {
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// The row-major index of the ray which produced each point
    pub fn ray_indices(&self) -> &[usize] {
        &self.ray_indices
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<Point3> {
        self.points
    }
}

/// Simulates the sensor by casting every ray of the grid from the sensor position and keeping the
/// first intersection of each ray, but only when the intersected object is the target.
#[derive(Debug, Clone)]
pub struct RangeScanner {
    frame: SensorFrame,
    grid: RayGrid,
    directions: Vec<UnitVec3>,
    max_range: f64,
    noise: Option<Normal<f64>>,
    parallel: bool,
}

impl RangeScanner {
    /// Create a scanner. The world-space ray directions are computed once here, since the sensor
    /// frame does not change over a run.
    ///
    /// # Arguments
    ///
    /// * `frame`: the sensor's world frame
    /// * `grid`: the ray grid
    /// * `max_range`: the maximum distance along each ray at which a hit is accepted, must be > 0
    /// * `noise_std_dev`: the standard deviation of the Gaussian noise added independently to
    ///   each coordinate of each accepted hit, must be >= 0. Zero disables noise.
    ///
    /// returns: Result<RangeScanner, ScanError>
    pub fn new(
        frame: SensorFrame,
        grid: RayGrid,
        max_range: f64,
        noise_std_dev: f64,
    ) -> Result<Self> {
        if !(max_range.is_finite() && max_range > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "maximum range must be positive, got {max_range}"
            )));
        }
        if !(noise_std_dev.is_finite() && noise_std_dev >= 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "noise standard deviation must be non-negative, got {noise_std_dev}"
            )));
        }

        let noise = if noise_std_dev > 0.0 {
            let n = Normal::new(0.0, noise_std_dev)
                .map_err(|e| ScanError::InvalidConfig(format!("noise: {e}")))?;
            Some(n)
        } else {
            None
        };

        let directions = grid.world_directions(&frame).collect();

        Ok(Self {
            frame,
            grid,
            directions,
            max_range,
            noise,
            parallel: true,
        })
    }

    /// Enable or disable casting the rays of a sweep across the rayon thread pool. The output is
    /// identical either way.
    pub fn with_parallel_rays(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn frame(&self) -> &SensorFrame {
        &self.frame
    }

    pub fn grid(&self) -> &RayGrid {
        &self.grid
    }

    pub fn directions(&self) -> &[UnitVec3] {
        &self.directions
    }

    pub fn max_range(&self) -> f64 {
        self.max_range
    }

    fn cast<O: GeometryOracle + ?Sized>(
        &self,
        oracle: &O,
        target: &TargetState,
        direction: &UnitVec3,
    ) -> Option<Point3> {
        oracle
            .intersect(target, self.frame.position(), direction, self.max_range)
            .filter(|hit| hit.object == target.id())
            .map(|hit| hit.point)
    }
}

impl SimulatedPointSensor for RangeScanner {
    fn get_points<O, R>(&self, oracle: &O, target: &TargetState, rng: &mut R) -> ScanSample
    where
        O: GeometryOracle + ?Sized,
        R: Rng,
    {
        // The rays are independent, so they may be cast on any thread as long as the results are
        // collected back in row-major order.
        let hits: Vec<Option<Point3>> = if self.parallel {
            self.directions
                .par_iter()
                .map(|d| self.cast(oracle, target, d))
                .collect()
        } else {
            self.directions
                .iter()
                .map(|d| self.cast(oracle, target, d))
                .collect()
        };

        // Noise is drawn sequentially in ray order so the sample only depends on the rng state
        let mut sample = ScanSample::default();
        for (i, hit) in hits.into_iter().enumerate() {
            if let Some(mut p) = hit {
                if let Some(noise) = &self.noise {
                    p += Vector3::new(noise.sample(rng), noise.sample(rng), noise.sample(rng));
                }
                sample.points.push(p);
                sample.ray_indices.push(i);
            }
        }

        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Scene, TargetProvider};
    use crate::sensors::{FieldOfView, Resolution};
    use crate::{Iso3, Pose};
    use approx::assert_relative_eq;
    use parry3d_f64::shape::SharedShape;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn grid(w: u32, h: u32, f: f64) -> RayGrid {
        RayGrid::new(Resolution::new(w, h).unwrap(), FieldOfView::new(f, f).unwrap()).unwrap()
    }

    fn plane_scene() -> Scene {
        let mut scene = Scene::new();
        scene.add(
            "Plane",
            SharedShape::halfspace(Vector3::z_axis()),
            Iso3::identity(),
        );
        scene
    }

    fn overhead_scanner(w: u32, h: u32, noise: f64) -> RangeScanner {
        let frame = SensorFrame::look_at(Point3::new(0.0, 0.0, 5.0), Point3::origin()).unwrap();
        RangeScanner::new(frame, grid(w, h, 90.0), 10.0, noise).unwrap()
    }

    #[test]
    fn plane_hits_match_tangent_projection() {
        let scene = plane_scene();
        let target = scene.resolve_target("Plane").unwrap();
        let scanner = overhead_scanner(4, 4, 0.0);
        let mut rng = StdRng::seed_from_u64(0);

        let sample = scanner.get_points(&scene, &target, &mut rng);
        assert_eq!(sample.len(), 16);

        let t = (std::f64::consts::PI / 8.0).tan();
        let offsets = [-1.0, -t, 0.0, t];
        for (k, p) in sample.points().iter().enumerate() {
            let (x, y) = (k % 4, k / 4);
            assert_eq!(sample.ray_indices()[k], k);
            assert_relative_eq!(p.x, 5.0 * offsets[x], epsilon = 1e-9);
            assert_relative_eq!(p.y, 5.0 * offsets[y], epsilon = 1e-9);
            assert_relative_eq!(p.z, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn unit_cube_hit_count() {
        let mut scene = Scene::new();
        scene.add("Cube", SharedShape::cuboid(0.5, 0.5, 0.5), Iso3::identity());
        let target = scene.resolve_target("Cube").unwrap();
        let scanner = overhead_scanner(4, 4, 0.0);

        let sample = scanner.get_points(&scene, &target, &mut StdRng::seed_from_u64(0));
        assert!(!sample.is_empty() && sample.len() <= 16);
        for p in sample.points() {
            assert!(p.z <= 0.5 + 1e-9 && p.z >= -0.5 - 1e-9);
        }
    }

    #[test]
    fn hits_on_other_objects_are_discarded() {
        let mut scene = plane_scene();
        // A blocker sitting between the sensor and the center of the plane
        scene.add(
            "Blocker",
            SharedShape::cuboid(0.5, 0.5, 0.1),
            Iso3::translation(0.0, 0.0, 2.0),
        );
        let target = scene.resolve_target("Plane").unwrap();
        let scanner = overhead_scanner(4, 4, 0.0);

        let sample = scanner.get_points(&scene, &target, &mut StdRng::seed_from_u64(0));
        assert_eq!(sample.len(), 15);
        assert!(!sample.ray_indices().contains(&10));
    }

    #[test]
    fn target_out_of_range_is_empty() {
        let scene = plane_scene();
        let mut target = scene.resolve_target("Plane").unwrap();
        target.set_pose(Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, -20.0));
        let scanner = overhead_scanner(4, 4, 0.0);
        let sample = scanner.get_points(&scene, &target, &mut StdRng::seed_from_u64(0));
        assert!(sample.is_empty());
    }

    #[test]
    fn zero_noise_is_exact() {
        let scene = plane_scene();
        let target = scene.resolve_target("Plane").unwrap();
        let scanner = overhead_scanner(8, 6, 0.0);
        let sample = scanner.get_points(&scene, &target, &mut StdRng::seed_from_u64(4));

        for (p, i) in sample.points().iter().zip(sample.ray_indices()) {
            let raw = scene
                .intersect(&target, &Point3::new(0.0, 0.0, 5.0), &scanner.directions()[*i], 10.0)
                .unwrap();
            assert_eq!(*p, raw.point);
        }
    }

    #[test]
    fn noise_perturbs_points_deterministically() {
        let scene = plane_scene();
        let target = scene.resolve_target("Plane").unwrap();
        let clean = overhead_scanner(8, 8, 0.0)
            .get_points(&scene, &target, &mut StdRng::seed_from_u64(1));
        let noisy = overhead_scanner(8, 8, 0.01);
        let a = noisy.get_points(&scene, &target, &mut StdRng::seed_from_u64(1));
        let b = noisy.get_points(&scene, &target, &mut StdRng::seed_from_u64(1));

        assert_eq!(a, b);
        assert_eq!(a.len(), clean.len());
        let mut moved = 0;
        for (p, q) in a.points().iter().zip(clean.points()) {
            let d = p - q;
            assert!(d.norm() < 0.1);
            if d.norm() > 0.0 {
                moved += 1;
            }
        }
        assert_eq!(moved, a.len());
    }

    #[test]
    fn parallel_and_serial_agree() {
        let scene = Scene::default_cube();
        let mut target = scene.resolve_target("Cube").unwrap();
        target.set_pose(Pose::new(0.4, -0.3, 1.2, 0.2, 0.1, 0.0));
        let frame = SensorFrame::look_at(Point3::new(2.0, 3.0, 6.0), Point3::origin()).unwrap();

        let parallel = RangeScanner::new(frame.clone(), grid(32, 24, 50.0), 100.0, 0.005).unwrap();
        let serial = parallel.clone().with_parallel_rays(false);

        let a = parallel.get_points(&scene, &target, &mut StdRng::seed_from_u64(9));
        let b = serial.get_points(&scene, &target, &mut StdRng::seed_from_u64(9));
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_parameters() {
        let frame = SensorFrame::look_at(Point3::new(0.0, 0.0, 5.0), Point3::origin()).unwrap();
        assert!(RangeScanner::new(frame.clone(), grid(2, 2, 60.0), 0.0, 0.0).is_err());
        assert!(RangeScanner::new(frame.clone(), grid(2, 2, 60.0), 10.0, -0.1).is_err());
        assert!(RangeScanner::new(frame, grid(2, 2, 60.0), f64::INFINITY, 0.0).is_err());
    }
}
