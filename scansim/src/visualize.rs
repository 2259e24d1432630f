//! Debug renders of the sensor setup. These are purely cosmetic: a failure to render is logged and
//! never stops dataset generation.

use crate::scene::{GeometryOracle, TargetState};
use crate::sensors::{FieldOfView, RayGrid, Resolution, SensorFrame};
use crate::{Point3, Result, ScanError, Vector3};
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything a visualizer needs to know about the setup being rendered
#[derive(Debug, Clone, Copy)]
pub struct VisualizationRequest<'a> {
    pub output_dir: &'a Path,
    pub target: &'a TargetState,
    pub frame: &'a SensorFrame,
    pub fov: FieldOfView,
    pub max_range: f64,
}

pub trait DebugVisualizer {
    /// Render the setup into the output directory, returning the files written
    fn render(
        &self,
        oracle: &dyn GeometryOracle,
        request: &VisualizationRequest<'_>,
    ) -> Result<Vec<PathBuf>>;
}

/// Run a visualizer, logging and discarding any failure.
pub fn render_best_effort(
    visualizer: &dyn DebugVisualizer,
    oracle: &dyn GeometryOracle,
    request: &VisualizationRequest<'_>,
) -> Vec<PathBuf> {
    match visualizer.render(oracle, request) {
        Ok(files) => {
            info!("Saved {} debug views", files.len());
            files
        }
        Err(e) => {
            warn!("Could not generate debug views: {e}");
            Vec::new()
        }
    }
}

const BACKGROUND: [u8; 3] = [38, 38, 42];
const TARGET_COLOR: [f64; 3] = [225.0, 225.0, 225.0];
const OTHER_COLOR: [f64; 3] = [95.0, 115.0, 145.0];
const SENSOR_COLOR: [u8; 3] = [255, 0, 0];
const FOV_COLOR: [u8; 3] = [0, 255, 255];
const FOV_ALPHA: f64 = 0.5;
const SENSOR_BODY_SIZE: f64 = 0.4;

/// Renders the sensor setup from four fixed viewpoints: an isometric view and views along the
/// -Y, +X and +Z world axes, each camera tracking the target. The scene is depth shaded by casting
/// rays through the same geometry oracle the sensor uses, the sensor body is drawn in red and the
/// sensor's full-range field of view is drawn as a translucent cyan frustum.
#[derive(Debug, Clone)]
pub struct SetupViewRenderer {
    pub resolution: Resolution,
    pub lens_mm: f64,
    pub film_width_mm: f64,
    pub view_distance: f64,
    pub view_height: f64,
}

impl Default for SetupViewRenderer {
    fn default() -> Self {
        Self {
            resolution: Resolution {
                width: 480,
                height: 360,
            },
            lens_mm: 35.0,
            film_width_mm: 36.0,
            view_distance: 8.0,
            view_height: 4.0,
        }
    }
}

impl SetupViewRenderer {
    pub fn views(&self) -> [(&'static str, Point3); 4] {
        let d = self.view_distance;
        [
            ("view_iso", Point3::new(d, -d, self.view_height)),
            ("view_front", Point3::new(0.0, -d, 0.0)),
            ("view_right", Point3::new(d, 0.0, 0.0)),
            ("view_top", Point3::new(0.0, 0.0, d)),
        ]
    }

    fn camera_fov(&self) -> Result<FieldOfView> {
        let h = 2.0 * (self.film_width_mm / 2.0 / self.lens_mm).atan().to_degrees();
        let v = h * self.resolution.height as f64 / self.resolution.width as f64;
        FieldOfView::new(h, v)
    }

    fn render_view(
        &self,
        oracle: &dyn GeometryOracle,
        request: &VisualizationRequest<'_>,
        camera: &SensorFrame,
        grid: &RayGrid,
    ) -> RgbImage {
        let (w, h) = (self.resolution.width, self.resolution.height);
        let dirs = grid.world_directions(camera).collect::<Vec<_>>();
        let far = 4.0 * (self.view_distance + self.view_height) + request.max_range;

        let hits = dirs
            .par_iter()
            .map(|d| oracle.intersect(request.target, camera.position(), d, far))
            .collect::<Vec<_>>();

        let distances = hits.iter().flatten().map(|h| h.distance);
        let near = distances.clone().fold(f64::MAX, f64::min);
        let span = (distances.fold(0.0, f64::max) - near).max(1e-6);

        let mut img = RgbImage::from_pixel(w, h, Rgb(BACKGROUND));
        for (i, hit) in hits.iter().enumerate() {
            if let Some(hit) = hit {
                let shade = 1.0 - 0.6 * ((hit.distance - near) / span).clamp(0.0, 1.0);
                let base = if hit.object == request.target.id() {
                    TARGET_COLOR
                } else {
                    OTHER_COLOR
                };
                let (x, y) = grid.pixel(i);
                let c = base.map(|v| (v * shade) as u8);
                img.put_pixel(x, h - 1 - y, Rgb(c));
            }
        }

        let mut canvas = Canvas {
            img,
            camera,
            grid,
        };

        // Field of view frustum out to the full range, open at the far end
        let frame = request.frame;
        let l = request.max_range;
        let dx = l * (request.fov.horizontal_rad() / 2.0).tan();
        let dy = l * (request.fov.vertical_rad() / 2.0).tan();
        let corners = [(-dx, -dy), (-dx, dy), (dx, dy), (dx, -dy)]
            .map(|(x, y)| frame.position() + frame.to_world(&Vector3::new(x, y, -l)));
        for (k, c) in corners.iter().enumerate() {
            canvas.line(frame.position(), c, FOV_COLOR, FOV_ALPHA);
            canvas.line(c, &corners[(k + 1) % 4], FOV_COLOR, FOV_ALPHA);
        }

        // Sensor body as a small cube aligned with the sensor frame
        let s = SENSOR_BODY_SIZE / 2.0;
        let vertex = |i: usize| {
            let local = Vector3::new(
                if i & 1 == 0 { -s } else { s },
                if i & 2 == 0 { -s } else { s },
                if i & 4 == 0 { -s } else { s },
            );
            frame.position() + frame.to_world(&local)
        };
        for i in 0..8usize {
            for bit in [1, 2, 4] {
                if i & bit == 0 {
                    canvas.line(&vertex(i), &vertex(i | bit), SENSOR_COLOR, 1.0);
                }
            }
        }

        canvas.img
    }
}

impl DebugVisualizer for SetupViewRenderer {
    fn render(
        &self,
        oracle: &dyn GeometryOracle,
        request: &VisualizationRequest<'_>,
    ) -> Result<Vec<PathBuf>> {
        info!("Generating debug views (range: {}m)", request.max_range);
        let grid = RayGrid::new(self.resolution, self.camera_fov()?)?;
        let look_at = Point3::from(request.target.pose().translation());

        let mut written = Vec::new();
        for (name, position) in self.views() {
            // Z up reads naturally for the side views, but the top view looks straight down it
            let camera = SensorFrame::look_at_with_up(position, look_at, &Vector3::z())
                .or_else(|_| SensorFrame::look_at(position, look_at))?;

            let img = self.render_view(oracle, request, &camera, &grid);
            let path = request.output_dir.join(format!("setup_{name}.png"));
            img.save(&path)
                .map_err(|e| ScanError::Visualization(format!("{}: {e}", path.display())))?;
            written.push(path);
        }

        Ok(written)
    }
}

struct Canvas<'a> {
    img: RgbImage,
    camera: &'a SensorFrame,
    grid: &'a RayGrid,
}

impl Canvas<'_> {
    /// Project a world point to pixel coordinates using the inverse of the ray grid mapping
    fn project(&self, p: &Point3) -> Option<(i64, i64)> {
        let local = self.camera.to_local(&(p - self.camera.position()));
        if local.z > -1e-6 {
            return None;
        }
        let fov = self.grid.fov();
        let res = self.grid.resolution();
        let u = (local.x / -local.z).atan() / fov.horizontal_rad();
        let v = (local.y / -local.z).atan() / fov.vertical_rad();
        let x = ((u + 0.5) * res.width as f64).round() as i64;
        let y = ((v + 0.5) * res.height as f64).round() as i64;
        Some((x, res.height as i64 - 1 - y))
    }

    fn blend(&mut self, x: i64, y: i64, color: [u8; 3], alpha: f64) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        let px = self.img.get_pixel_mut(x as u32, y as u32);
        for k in 0..3 {
            let v = px.0[k] as f64 * (1.0 - alpha) + color[k] as f64 * alpha;
            px.0[k] = v.round() as u8;
        }
    }

    /// Draw a 3D segment by sampling it densely, which also clips the parts behind the camera
    fn line(&mut self, a: &Point3, b: &Point3, color: [u8; 3], alpha: f64) {
        const STEPS: usize = 2000;
        let mut last = None;
        for i in 0..=STEPS {
            let p = a + (b - a) * (i as f64 / STEPS as f64);
            let Some(px) = self.project(&p) else {
                continue;
            };
            if last != Some(px) {
                self.blend(px.0, px.1, color, alpha);
                last = Some(px);
            }
        }
    }
}
