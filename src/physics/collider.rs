use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::{Entity, World};

/// Sphere in the local space of its group's node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereCollider {
    #[serde(default)]
    pub offset: Vec3,
    pub radius: f32,
}

impl SphereCollider {
    #[must_use]
    pub fn new(offset: Vec3, radius: f32) -> Self {
        Self { offset, radius }
    }

    /// Center and radius under `world`. The radius follows the largest
    /// scale axis.
    #[must_use]
    pub fn to_world(&self, world: &Mat4) -> WorldSphere {
        let scale = world.to_scale_rotation_translation().0.abs().max_element();
        WorldSphere {
            center: world.transform_point3(self.offset),
            radius: self.radius * scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Colliders attached to one scene-graph node. Chains refer to groups by
/// index.
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderGroup {
    pub node: Entity,
    pub colliders: Vec<SphereCollider>,
}

impl ColliderGroup {
    #[must_use]
    pub fn new(node: Entity) -> Self {
        Self {
            node,
            colliders: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sphere(mut self, offset: Vec3, radius: f32) -> Self {
        self.colliders.push(SphereCollider::new(offset, radius));
        self
    }

    /// Current world-space spheres; empty if the node is gone.
    #[must_use]
    pub fn world_spheres(&self, world: &World) -> Vec<WorldSphere> {
        let Some(matrix) = world.world_matrix(self.node) else {
            return Vec::new();
        };
        self.colliders.iter().map(|c| c.to_world(&matrix)).collect()
    }
}
