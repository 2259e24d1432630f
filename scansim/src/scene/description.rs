//! Serializable scene descriptions, used to build a `Scene` from a JSON file.

use super::Scene;
use crate::pose::Pose;
use crate::{Result, ScanError, UnitVec3, Vector3};
use parry3d_f64::shape::SharedShape;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDescription {
    Cuboid { half_extents: [f64; 3] },
    Ball { radius: f64 },
    Cylinder { half_height: f64, radius: f64 },

    /// An infinite plane through the object origin, solid on the side opposite the normal
    Plane { normal: [f64; 3] },

    /// A triangle mesh loaded from an STL file, requires the `stl` feature
    Mesh { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectDescription {
    pub name: String,
    pub shape: ShapeDescription,

    #[serde(default)]
    pub position: [f64; 3],

    /// XYZ Euler rotation in degrees
    #[serde(default)]
    pub rotation_deg: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SceneDescription {
    pub objects: Vec<ObjectDescription>,
}

impl SceneDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Build the geometry for every object. Relative mesh paths are resolved against `base_dir`
    /// when one is given.
    pub fn build(&self, base_dir: Option<&Path>) -> Result<Scene> {
        let mut scene = Scene::new();
        for object in self.objects.iter() {
            let shape = build_shape(&object.name, &object.shape, base_dir)?;
            let [rx, ry, rz] = object.rotation_deg;
            let [tx, ty, tz] = object.position;
            let placement = Pose::new(
                rx.to_radians(),
                ry.to_radians(),
                rz.to_radians(),
                tx,
                ty,
                tz,
            )
            .to_iso();
            scene.add(&object.name, shape, placement);
        }
        Ok(scene)
    }
}

fn positive(name: &str, what: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ScanError::Scene(format!(
            "object '{name}': {what} must be positive, got {value}"
        )))
    }
}

fn build_shape(
    name: &str,
    shape: &ShapeDescription,
    base_dir: Option<&Path>,
) -> Result<SharedShape> {
    match shape {
        ShapeDescription::Cuboid { half_extents } => {
            let [hx, hy, hz] = *half_extents;
            Ok(SharedShape::cuboid(
                positive(name, "half extent", hx)?,
                positive(name, "half extent", hy)?,
                positive(name, "half extent", hz)?,
            ))
        }
        ShapeDescription::Ball { radius } => {
            Ok(SharedShape::ball(positive(name, "radius", *radius)?))
        }
        ShapeDescription::Cylinder {
            half_height,
            radius,
        } => Ok(SharedShape::cylinder(
            positive(name, "half height", *half_height)?,
            positive(name, "radius", *radius)?,
        )),
        ShapeDescription::Plane { normal } => {
            let n = Vector3::from(*normal);
            if n.norm() < 1e-12 || !n.iter().all(|v| v.is_finite()) {
                return Err(ScanError::Scene(format!(
                    "object '{name}': plane normal must be a non-zero vector"
                )));
            }
            Ok(SharedShape::halfspace(UnitVec3::new_normalize(n)))
        }
        ShapeDescription::Mesh { path } => {
            let full = match base_dir {
                Some(dir) => dir.join(path),
                None => Path::new(path).to_path_buf(),
            };
            load_mesh(name, &full)
        }
    }
}

#[cfg(feature = "stl")]
fn load_mesh(name: &str, path: &Path) -> Result<SharedShape> {
    use crate::Point3;
    use parry3d_f64::shape::TriMesh;

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let stl = stl_io::read_stl(&mut reader)?;

    let vertices = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect::<Vec<_>>();
    let faces = stl
        .faces
        .iter()
        .map(|f| {
            [
                f.vertices[0] as u32,
                f.vertices[1] as u32,
                f.vertices[2] as u32,
            ]
        })
        .collect::<Vec<_>>();

    let mesh = TriMesh::new(vertices, faces)
        .map_err(|e| ScanError::Scene(format!("object '{name}': {e}")))?;
    Ok(SharedShape::new(mesh))
}

#[cfg(not(feature = "stl"))]
fn load_mesh(name: &str, path: &Path) -> Result<SharedShape> {
    Err(ScanError::Scene(format!(
        "object '{name}': cannot load {}, mesh support requires the `stl` feature",
        path.display()
    )))
}
