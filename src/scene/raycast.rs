use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::core::{Entity, World};
use crate::scene::bounds::Ray;

/// Closest intersection found by a ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: Entity,
    /// Parametric distance along the world-space ray.
    pub distance: f32,
    pub position: Vec3,
}

impl World {
    /// Casts a world-space ray against every pickable mesh in the subtree
    /// rooted at `root`, visiting nodes in pre-order. Invisible subtrees are
    /// skipped. On exactly equal distances the first node visited wins.
    #[must_use]
    pub fn cast_ray(&self, root: Entity, ray: &Ray) -> Option<RaycastHit> {
        let mut closest: Option<RaycastHit> = None;
        let mut stack = vec![root];

        while let Some(entity) = stack.pop() {
            let Some(node) = self.nodes.get(entity) else {
                continue;
            };
            if !node.is_visible() {
                continue;
            }

            if let Some(mesh) = self.meshes.get(entity)
                && mesh.pickable
                && let Some(world) = self.world_matrix(entity)
            {
                let local_ray = ray.transform(&world.inverse());
                if let Some(t) = mesh.cast_ray(&local_ray)
                    && closest.is_none_or(|hit| t < hit.distance)
                {
                    closest = Some(RaycastHit {
                        entity,
                        distance: t,
                        position: ray.at(t),
                    });
                }
            }

            stack.extend(node.children.iter().rev().copied());
        }

        closest
    }

    /// Casts a ray through a screen position.
    ///
    /// `screen` is in pixels with the origin at the top-left of `viewport`
    /// (`x, y, width, height`). `view_projection` maps world space to clip
    /// space with a `[0, 1]` depth range.
    #[must_use]
    pub fn cast_ray_from_screen(
        &self,
        root: Entity,
        screen: Vec2,
        viewport: Vec4,
        view_projection: Mat4,
    ) -> Option<RaycastHit> {
        let ray = screen_ray(screen, viewport, view_projection)?;
        self.cast_ray(root, &ray)
    }
}

/// Unprojects a screen position into a normalized world-space ray.
#[must_use]
pub fn screen_ray(screen: Vec2, viewport: Vec4, view_projection: Mat4) -> Option<Ray> {
    if viewport.z <= 0.0 || viewport.w <= 0.0 {
        return None;
    }

    let ndc_x = (screen.x - viewport.x) / viewport.z * 2.0 - 1.0;
    let ndc_y = 1.0 - (screen.y - viewport.y) / viewport.w * 2.0;

    let inverse = view_projection.inverse();
    let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
    let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));

    let direction = (far - near).try_normalize()?;
    Some(Ray::new(near, direction))
}
