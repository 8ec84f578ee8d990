use std::fmt::Debug;
use std::sync::Arc;

use glam::Vec3;

use crate::scene::bounds::{BoundingBox, Ray};

/// Geometry attached to a mesh, as seen by the scene graph.
///
/// Implemented by the renderer's primitive type; the core only needs the
/// local bounds and a ray query.
pub trait MeshPrimitive: Debug {
    /// Bounds in the mesh's local space.
    fn local_aabb(&self) -> Option<BoundingBox>;

    /// Parametric distance `t` of the closest hit along a local-space ray,
    /// with `t >= 0`.
    fn cast_ray(&self, ray: &Ray) -> Option<f32>;
}

/// Mesh component: a list of primitives rendered with the owning entity's
/// world matrix.
#[derive(Debug, Clone)]
pub struct MeshComponent {
    primitives: Vec<Arc<dyn MeshPrimitive>>,
    /// Excluded from ray casts when `false`.
    pub pickable: bool,
}

impl MeshComponent {
    #[must_use]
    pub fn new() -> Self {
        Self {
            primitives: Vec::new(),
            pickable: true,
        }
    }

    #[must_use]
    pub fn with_primitive(mut self, primitive: Arc<dyn MeshPrimitive>) -> Self {
        self.primitives.push(primitive);
        self
    }

    pub fn add_primitive(&mut self, primitive: Arc<dyn MeshPrimitive>) {
        self.primitives.push(primitive);
    }

    #[must_use]
    pub fn primitives(&self) -> &[Arc<dyn MeshPrimitive>] {
        &self.primitives
    }

    /// Union of all primitive bounds.
    #[must_use]
    pub fn local_aabb(&self) -> Option<BoundingBox> {
        self.primitives
            .iter()
            .filter_map(|p| p.local_aabb())
            .reduce(|a, b| a.union(&b))
    }

    /// Closest hit over all primitives (first one wins on exact ties).
    #[must_use]
    pub fn cast_ray(&self, ray: &Ray) -> Option<f32> {
        let mut closest: Option<f32> = None;
        for primitive in &self.primitives {
            if let Some(t) = primitive.cast_ray(ray)
                && closest.is_none_or(|c| t < c)
            {
                closest = Some(t);
            }
        }
        closest
    }
}

impl Default for MeshComponent {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain triangle list, indexed or not.
#[derive(Debug, Clone, Default)]
pub struct TrianglePrimitive {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl TrianglePrimitive {
    #[must_use]
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        let count = if self.indices.is_empty() {
            self.positions.len() / 3
        } else {
            self.indices.len() / 3
        };

        (0..count).filter_map(move |i| {
            let corner = |k: usize| -> Option<Vec3> {
                let index = if self.indices.is_empty() {
                    i * 3 + k
                } else {
                    *self.indices.get(i * 3 + k)? as usize
                };
                self.positions.get(index).copied()
            };
            Some([corner(0)?, corner(1)?, corner(2)?])
        })
    }
}

impl MeshPrimitive for TrianglePrimitive {
    fn local_aabb(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.positions.iter().copied())
    }

    fn cast_ray(&self, ray: &Ray) -> Option<f32> {
        let mut closest: Option<f32> = None;
        for [a, b, c] in self.triangles() {
            if let Some(t) = intersect_triangle(ray, a, b, c)
                && closest.is_none_or(|best| t < best)
            {
                closest = Some(t);
            }
        }
        closest
    }
}

/// Möller–Trumbore, double sided.
fn intersect_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;

    let edge1 = b - a;
    let edge2 = c - a;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}
