//! This module contains the geometry collaborators of the sensor: the `GeometryOracle` which
//! answers ray intersection queries, the `TargetProvider` which resolves the target object by
//! name, and `Scene`, a reference implementation of both built on parry shapes.

mod description;

use crate::pose::Pose;
use crate::{Iso3, Matrix4, Point3, Result, ScanError, UnitVec3};
use parry3d_f64::query::{Ray, RayCast};
use parry3d_f64::shape::SharedShape;
use uuid::Uuid;

pub use description::{ObjectDescription, SceneDescription, ShapeDescription};

pub type ObjectId = Uuid;

/// The nearest intersection of a ray with the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Point3,
    pub distance: f64,
    pub object: ObjectId,
}

/// The one piece of mutable scene state: the identity of the target object and its current pose.
/// The pose randomizer writes it between scans and the scanner reads it, so each worker can own
/// an independent clone.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
    id: ObjectId,
    name: String,
    pose: Pose,
}

impl TargetState {
    pub fn new(id: ObjectId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            pose: Pose::identity(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn world_iso(&self) -> Iso3 {
        self.pose.to_iso()
    }

    pub fn world_matrix(&self) -> Matrix4 {
        self.pose.to_matrix()
    }
}

pub trait GeometryOracle: Send + Sync {
    /// Find the nearest intersection along a ray within `max_distance`, with the target object
    /// placed at the pose held in `target`. A miss is `None`, it is not an error.
    fn intersect(
        &self,
        target: &TargetState,
        origin: &Point3,
        direction: &UnitVec3,
        max_distance: f64,
    ) -> Option<RayHit>;
}

pub trait TargetProvider {
    fn resolve_target(&self, name: &str) -> Result<TargetState>;
}

#[derive(Clone)]
pub struct SceneObject {
    id: ObjectId,
    name: String,
    shape: SharedShape,
    placement: Iso3,
}

impl SceneObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &SharedShape {
        &self.shape
    }

    pub fn placement(&self) -> &Iso3 {
        &self.placement
    }
}

/// A collection of named rigid shapes. Each object has a fixed placement, except for the target
/// object, whose placement is taken from the `TargetState` passed into each query.
#[derive(Clone, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scene with a single 2m cube named "Cube" centered on the origin, the same as the default
    /// scene of most 3D authoring tools.
    pub fn default_cube() -> Self {
        let mut scene = Self::new();
        scene.add("Cube", SharedShape::cuboid(1.0, 1.0, 1.0), Iso3::identity());
        scene
    }

    /// Add an object to the scene and return its identifier. Names are not required to be unique,
    /// but target resolution uses the first object with a matching name.
    pub fn add(&mut self, name: &str, shape: SharedShape, placement: Iso3) -> ObjectId {
        let id = Uuid::new_v4();
        self.objects.push(SceneObject {
            id,
            name: name.to_string(),
            shape,
            placement,
        });
        id
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn find(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl GeometryOracle for Scene {
    fn intersect(
        &self,
        target: &TargetState,
        origin: &Point3,
        direction: &UnitVec3,
        max_distance: f64,
    ) -> Option<RayHit> {
        let ray = Ray::new(*origin, direction.into_inner());
        let target_iso = target.world_iso();
        let mut best: Option<(f64, ObjectId)> = None;

        for object in self.objects.iter() {
            let iso = if object.id == target.id() {
                &target_iso
            } else {
                &object.placement
            };

            let limit = best.map(|(d, _)| d).unwrap_or(max_distance);
            if let Some(toi) = object.shape.cast_ray(iso, &ray, limit, false) {
                if best.is_none_or(|(d, _)| toi < d) {
                    best = Some((toi, object.id));
                }
            }
        }

        best.map(|(distance, object)| RayHit {
            point: ray.point_at(distance),
            distance,
            object,
        })
    }
}

impl TargetProvider for Scene {
    fn resolve_target(&self, name: &str) -> Result<TargetState> {
        self.find(name)
            .map(|o| {
                let mut target = TargetState::new(o.id, &o.name);
                target.set_pose(Pose::from_iso(&o.placement));
                target
            })
            .ok_or_else(|| ScanError::NotFound(name.to_string()))
    }
}
