//! Spring Bones
//!
//! Verlet-style secondary motion for hair, cloth and accessories, following
//! the VRM spring-bone model.
//!
//! Each bone tracks the world position of its tail (the point its rest-pose
//! child offset maps to). Per step the tail keeps part of its velocity, is
//! pulled back toward the rest direction by `stiffness_force` and toward
//! `gravity_dir` by `gravity_power`, is pushed out of colliders, and is then
//! held at `bone_length` from the bone's origin. The bone's local rotation is
//! set so that its rest axis points at the new tail.
//!
//! Bones of a chain are processed parent first, so each bone sees its
//! parent's rotation from the same step.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::{ComponentType, Entity, World};
use crate::errors::{Result, RhodoniteError};
use crate::physics::collider::{ColliderGroup, SphereCollider, WorldSphere};

/// Tail extension of a bone without children, in world units.
pub const LEAF_TAIL_LENGTH: f32 = 0.07;

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpringBoneState {
    /// Rest pose not captured yet; done on the next update.
    Uninitialized,
    Active,
}

/// Per-bone simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringBoneParams {
    /// Pull back toward the rest direction.
    pub stiffness_force: f32,
    /// Fraction of the tail velocity removed per step, `0..=1`.
    pub drag_force: f32,
    pub gravity_dir: Vec3,
    pub gravity_power: f32,
    /// Radius of the tail when testing colliders.
    pub hit_radius: f32,
}

impl Default for SpringBoneParams {
    fn default() -> Self {
        Self {
            stiffness_force: 1.0,
            drag_force: 0.4,
            gravity_dir: Vec3::NEG_Y,
            gravity_power: 0.0,
            hit_radius: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpringBone {
    pub node: Entity,
    pub params: SpringBoneParams,

    state: SpringBoneState,
    initial_local_rotation: Quat,
    initial_local_child_position: Vec3,
    bone_axis: Vec3,
    bone_length: f32,
    current_tail: Vec3,
    prev_tail: Vec3,
}

impl SpringBone {
    #[must_use]
    pub fn new(node: Entity, params: SpringBoneParams) -> Self {
        Self {
            node,
            params,
            state: SpringBoneState::Uninitialized,
            initial_local_rotation: Quat::IDENTITY,
            initial_local_child_position: Vec3::ZERO,
            bone_axis: Vec3::ZERO,
            bone_length: 0.0,
            current_tail: Vec3::ZERO,
            prev_tail: Vec3::ZERO,
        }
    }

    #[must_use]
    pub fn state(&self) -> SpringBoneState {
        self.state
    }

    /// Unit rest-pose tail direction in the bone's local space.
    #[must_use]
    pub fn bone_axis(&self) -> Vec3 {
        self.bone_axis
    }

    /// World distance from the bone origin to its tail, fixed at setup.
    #[must_use]
    pub fn bone_length(&self) -> f32 {
        self.bone_length
    }

    #[must_use]
    pub fn current_tail(&self) -> Vec3 {
        self.current_tail
    }

    #[must_use]
    pub fn prev_tail(&self) -> Vec3 {
        self.prev_tail
    }

    #[must_use]
    pub fn initial_local_rotation(&self) -> Quat {
        self.initial_local_rotation
    }

    #[must_use]
    pub fn initial_local_child_position(&self) -> Vec3 {
        self.initial_local_child_position
    }

    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.bone_length <= EPSILON
    }

    /// Captures the rest pose from the node's current transforms.
    fn setup(&mut self, world: &World) -> bool {
        let (Some(transform), Some(node_world)) =
            (world.transform(self.node), world.world_matrix(self.node))
        else {
            log::warn!("Spring bone {:?} has no scene graph node", self.node);
            return false;
        };

        self.initial_local_rotation = transform.quaternion();
        self.initial_local_child_position = match world.children(self.node).first() {
            Some(&child) => world.transform(child).map_or(Vec3::ZERO, |t| t.translate()),
            None => leaf_child_position(world, self.node, &node_world),
        };

        self.bone_axis = self.initial_local_child_position.normalize_or_zero();
        let tail = node_world.transform_point3(self.initial_local_child_position);
        self.bone_length = (tail - node_world.w_axis.truncate()).length();
        self.current_tail = tail;
        self.prev_tail = tail;
        self.state = SpringBoneState::Active;
        true
    }

    /// One simulation step. Returns the new local rotation, or `None` when
    /// the bone is degenerate this step.
    fn step(&mut self, world: &World, spheres: &[WorldSphere], dt: f32) -> Option<Quat> {
        if self.is_degenerate() {
            return None;
        }
        let node_world = world.world_matrix(self.node)?;
        let origin = node_world.w_axis.truncate();
        let parent_rotation = world
            .parent(self.node)
            .and_then(|p| world.world_matrix(p))
            .map_or(Quat::IDENTITY, |m| m.to_scale_rotation_translation().1);
        let rest_rotation = parent_rotation * self.initial_local_rotation;

        let p = &self.params;
        let inertia = (self.current_tail - self.prev_tail) * (1.0 - p.drag_force);
        let stiffness = rest_rotation * self.bone_axis * (p.stiffness_force * dt);
        let external = p.gravity_dir * (p.gravity_power * dt);
        let candidate = self.current_tail + inertia + stiffness + external;

        let mut next = origin + (candidate - origin).try_normalize()? * self.bone_length;
        for sphere in spheres {
            next = resolve_sphere(origin, next, self.bone_length, sphere, p.hit_radius);
        }

        let direction = (rest_rotation.inverse() * (next - origin)).try_normalize()?;

        self.prev_tail = self.current_tail;
        self.current_tail = next;

        Some(self.initial_local_rotation * Quat::from_rotation_arc(self.bone_axis, direction))
    }
}

/// Local tail of a bone without children: extend the parent-to-bone
/// direction by [`LEAF_TAIL_LENGTH`].
fn leaf_child_position(world: &World, node: Entity, node_world: &Mat4) -> Vec3 {
    let origin = node_world.w_axis.truncate();
    let parent_origin = world
        .parent(node)
        .and_then(|p| world.world_position(p))
        .unwrap_or(Vec3::ZERO);
    let Some(direction) = (origin - parent_origin).try_normalize() else {
        return Vec3::ZERO;
    };
    let tail = origin + direction * LEAF_TAIL_LENGTH;
    node_world.inverse().transform_point3(tail)
}

/// Pushes `tail` out of `sphere` and back onto the bone sphere of radius
/// `length` around `origin`.
///
/// If renormalizing pulls the tail back inside, it is moved to the closest
/// point of the circle where the bone sphere meets the collider surface.
fn resolve_sphere(origin: Vec3, tail: Vec3, length: f32, sphere: &WorldSphere, hit_radius: f32) -> Vec3 {
    let r = hit_radius + sphere.radius;
    let offset = tail - sphere.center;
    if offset.length_squared() >= r * r {
        return tail;
    }

    let axis = offset
        .try_normalize()
        .or_else(|| (tail - origin).try_normalize())
        .unwrap_or(Vec3::Y);
    let pushed = sphere.center + axis * r;
    let Some(direction) = (pushed - origin).try_normalize() else {
        return tail;
    };
    let candidate = origin + direction * length;
    if candidate.distance_squared(sphere.center) >= r * r {
        return candidate;
    }

    let to_center = sphere.center - origin;
    let d = to_center.length();
    if d < EPSILON || d > length + r || d < (length - r).abs() {
        // No intersection circle: the collider swallows the whole bone sphere.
        return candidate;
    }
    let n = to_center / d;
    let a = (d * d + length * length - r * r) / (2.0 * d);
    let h = (length * length - a * a).max(0.0).sqrt();
    let w = (direction - n * direction.dot(n))
        .try_normalize()
        .unwrap_or_else(|| n.any_orthonormal_vector());
    origin + n * a + w * h
}

/// Ordered bones sharing a set of collider groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpringBoneChain {
    pub bones: Vec<SpringBone>,
    /// Indices into [`SpringBoneSystem::collider_groups`].
    pub collider_groups: Vec<usize>,
}

impl SpringBoneChain {
    #[must_use]
    pub fn new(bones: Vec<SpringBone>) -> Self {
        Self {
            bones,
            collider_groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_collider_groups(mut self, groups: Vec<usize>) -> Self {
        self.collider_groups = groups;
        self
    }
}

// ============================================================================
// Import descriptors
// ============================================================================

/// One spring joint of an imported chain; `node` indexes the importer's node
/// list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringJointDescriptor {
    pub node: usize,
    #[serde(flatten)]
    pub params: SpringBoneParams,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringChainDescriptor {
    pub joints: Vec<SpringJointDescriptor>,
    pub collider_groups: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColliderGroupDescriptor {
    pub node: usize,
    #[serde(default)]
    pub colliders: Vec<SphereCollider>,
}

/// Spring-bone section of an imported avatar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringBoneDescriptor {
    pub collider_groups: Vec<ColliderGroupDescriptor>,
    pub chains: Vec<SpringChainDescriptor>,
}

// ============================================================================
// System
// ============================================================================

/// All spring-bone chains and collider groups of a world.
#[derive(Debug, Clone, Default)]
pub struct SpringBoneSystem {
    collider_groups: Vec<ColliderGroup>,
    chains: Vec<SpringBoneChain>,
}

impl SpringBoneSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index chains use to reference the group.
    pub fn add_collider_group(&mut self, group: ColliderGroup) -> usize {
        self.collider_groups.push(group);
        self.collider_groups.len() - 1
    }

    /// Adds a chain. Fails if it references an unknown collider group.
    pub fn add_chain(&mut self, chain: SpringBoneChain) -> Result<usize> {
        let len = self.collider_groups.len();
        if let Some(&index) = chain.collider_groups.iter().find(|&&i| i >= len) {
            return Err(RhodoniteError::ColliderGroupOutOfBounds { index, len });
        }
        self.chains.push(chain);
        Ok(self.chains.len() - 1)
    }

    #[must_use]
    pub fn collider_groups(&self) -> &[ColliderGroup] {
        &self.collider_groups
    }

    #[must_use]
    pub fn chains(&self) -> &[SpringBoneChain] {
        &self.chains
    }

    #[must_use]
    pub fn chain(&self, index: usize) -> Option<&SpringBoneChain> {
        self.chains.get(index)
    }

    pub fn chain_mut(&mut self, index: usize) -> Option<&mut SpringBoneChain> {
        self.chains.get_mut(index)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Builds collider groups and chains from an importer descriptor whose
    /// node indices refer to `nodes`.
    pub fn import(&mut self, world: &World, descriptor: &SpringBoneDescriptor, nodes: &[Entity]) -> Result<()> {
        let resolve = |index: usize| -> Result<Entity> {
            let entity = *nodes.get(index).ok_or(RhodoniteError::NodeIndexOutOfBounds {
                index,
                len: nodes.len(),
            })?;
            if world.has_component(entity, ComponentType::SceneGraph) {
                Ok(entity)
            } else {
                Err(RhodoniteError::MissingComponent {
                    entity,
                    component: ComponentType::SceneGraph,
                })
            }
        };

        let base = self.collider_groups.len();
        let mut groups = Vec::with_capacity(descriptor.collider_groups.len());
        for group in &descriptor.collider_groups {
            groups.push(ColliderGroup {
                node: resolve(group.node)?,
                colliders: group.colliders.clone(),
            });
        }

        let mut chains = Vec::with_capacity(descriptor.chains.len());
        for chain in &descriptor.chains {
            let bones = chain
                .joints
                .iter()
                .map(|joint| Ok(SpringBone::new(resolve(joint.node)?, joint.params)))
                .collect::<Result<Vec<_>>>()?;
            let mut collider_groups = Vec::with_capacity(chain.collider_groups.len());
            for &index in &chain.collider_groups {
                if index >= groups.len() {
                    return Err(RhodoniteError::ColliderGroupOutOfBounds {
                        index,
                        len: groups.len(),
                    });
                }
                collider_groups.push(base + index);
            }
            chains.push(SpringBoneChain {
                bones,
                collider_groups,
            });
        }

        log::debug!(
            "Imported {} spring-bone chains, {} collider groups",
            chains.len(),
            groups.len()
        );
        self.collider_groups.extend(groups);
        self.chains.extend(chains);
        Ok(())
    }

    /// Captures the rest pose of every uninitialized bone, parents first.
    pub fn setup(&mut self, world: &World) {
        for chain in &mut self.chains {
            let depth = |e: Entity| {
                let mut n = 0;
                let mut cursor = world.parent(e);
                while let Some(p) = cursor {
                    n += 1;
                    cursor = world.parent(p);
                }
                n
            };
            if chain.bones.iter().any(|b| b.state == SpringBoneState::Uninitialized) {
                chain.bones.sort_by_key(|b| depth(b.node));
            }
            for bone in &mut chain.bones {
                if bone.state == SpringBoneState::Uninitialized {
                    bone.setup(world);
                }
            }
        }
    }

    /// Advances every chain by `dt` seconds and writes the resulting local
    /// rotations.
    pub fn update(&mut self, world: &mut World, dt: f32) {
        self.setup(world);

        let spheres: Vec<Vec<WorldSphere>> = self
            .collider_groups
            .iter()
            .map(|group| group.world_spheres(world))
            .collect();

        for chain in &mut self.chains {
            let chain_spheres: Vec<WorldSphere> = chain
                .collider_groups
                .iter()
                .filter_map(|&i| spheres.get(i))
                .flatten()
                .copied()
                .collect();

            for bone in &mut chain.bones {
                if bone.state != SpringBoneState::Active {
                    continue;
                }
                let Some(rotation) = bone.step(world, &chain_spheres, dt) else {
                    continue;
                };
                if let Some(mut transform) = world.transform_mut(bone.node) {
                    transform.set_quaternion(rotation);
                }
            }
        }
    }

    /// Restores every bone's rest rotation. Tails are re-captured on the
    /// next update.
    pub fn reset(&mut self, world: &mut World) {
        for bone in self.chains.iter_mut().flat_map(|c| c.bones.iter_mut()) {
            if bone.state == SpringBoneState::Active
                && let Some(mut transform) = world.transform_mut(bone.node)
            {
                transform.set_quaternion(bone.initial_local_rotation);
            }
            bone.state = SpringBoneState::Uninitialized;
        }
    }
}

impl World {
    /// Restores spring-bone rest rotations. See [`SpringBoneSystem::reset`].
    pub fn reset_spring_bones(&mut self) {
        let mut spring_bones = std::mem::take(&mut self.spring_bones);
        spring_bones.reset(self);
        self.spring_bones = spring_bones;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_tail_outside_and_on_bone_sphere() {
        let origin = Vec3::ZERO;
        let length = 1.0;
        let sphere = WorldSphere {
            center: Vec3::new(0.0, -1.0, 0.0),
            radius: 0.5,
        };
        let tail = resolve_sphere(origin, Vec3::new(0.05, -1.0, 0.0), length, &sphere, 0.0);
        assert!((tail.length() - length).abs() < 1e-4);
        assert!(tail.distance(sphere.center) >= 0.5 - 1e-4);
    }

    #[test]
    fn resolve_ignores_distant_collider() {
        let sphere = WorldSphere {
            center: Vec3::new(5.0, 0.0, 0.0),
            radius: 0.5,
        };
        let tail = Vec3::new(0.0, -1.0, 0.0);
        assert_eq!(resolve_sphere(Vec3::ZERO, tail, 1.0, &sphere, 0.1), tail);
    }

    #[test]
    fn descriptor_defaults() {
        let params = SpringBoneParams::default();
        assert_eq!(params.gravity_dir, Vec3::NEG_Y);
        assert!((params.drag_force - 0.4).abs() < 1e-6);
    }
}
