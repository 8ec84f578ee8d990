use std::cell::Cell;

use slotmap::{SecondaryMap, SlotMap};

use crate::animation::{AnimationComponent, AnimationContext, BlendShapeComponent};
use crate::core::{ComponentMask, ComponentType, Entity};
use crate::errors::{Result, RhodoniteError};
use crate::physics::SpringBoneSystem;
use crate::scene::mesh::MeshComponent;
use crate::scene::scene_graph::{SceneGraphComponent, mark_subtree_dirty};
use crate::scene::skeleton::SkeletalComponent;
use crate::scene::transform::TransformComponent;
use crate::settings::WorldSettings;

/// Owner of every entity and component.
///
/// Components refer to each other only through [`Entity`] handles, so
/// destroying an entity never leaves a dangling reference: lookups through a
/// stale handle simply miss.
pub struct World {
    entities: SlotMap<Entity, ComponentMask>,

    // ==== Component Storage ====
    pub(crate) transforms: SecondaryMap<Entity, TransformComponent>,
    pub(crate) nodes: SecondaryMap<Entity, SceneGraphComponent>,
    pub(crate) top_level: Vec<Entity>,
    pub(crate) meshes: SecondaryMap<Entity, MeshComponent>,
    pub(crate) animations: SecondaryMap<Entity, AnimationComponent>,
    pub(crate) blend_shapes: SecondaryMap<Entity, BlendShapeComponent>,
    pub(crate) skeletals: SecondaryMap<Entity, SkeletalComponent>,
    pub(crate) spring_bones: SpringBoneSystem,
    /// `settings.update_joint_aabb` as of the cached world AABBs.
    pub(crate) cached_joint_aabb_setting: Cell<bool>,

    // ==== Shared Context ====
    /// Time and playback switches shared by every animation component.
    pub animation: AnimationContext,
    pub settings: WorldSettings,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(WorldSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: WorldSettings) -> Self {
        Self {
            entities: SlotMap::with_key(),
            transforms: SecondaryMap::new(),
            nodes: SecondaryMap::new(),
            top_level: Vec::new(),
            meshes: SecondaryMap::new(),
            animations: SecondaryMap::new(),
            blend_shapes: SecondaryMap::new(),
            skeletals: SecondaryMap::new(),
            spring_bones: SpringBoneSystem::default(),
            cached_joint_aabb_setting: Cell::new(settings.update_joint_aabb),
            animation: AnimationContext::default(),
            settings,
        }
    }

    // ========================================================================
    // Entity Lifecycle
    // ========================================================================

    /// Creates an entity with no components.
    pub fn create_entity(&mut self) -> Entity {
        self.entities.insert(ComponentMask::empty())
    }

    /// Creates a top-level scene-graph node with an identity transform.
    pub fn create_node(&mut self) -> Entity {
        let entity = self.create_entity();
        self.insert_scene_graph(entity);
        entity
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(entity)
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Removes an entity and all its components.
    ///
    /// The node is detached from the hierarchy first; its children become
    /// top-level nodes that keep their local transforms.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.entities.contains_key(entity) {
            return false;
        }

        if self.nodes.contains_key(entity) {
            self.remove_node(entity);
        }
        self.transforms.remove(entity);
        self.meshes.remove(entity);
        self.animations.remove(entity);
        self.blend_shapes.remove(entity);
        self.skeletals.remove(entity);
        self.entities.remove(entity);

        log::debug!("Destroyed entity {entity:?}");
        true
    }

    /// Unlinks a node, re-roots its children and drops its scene-graph data.
    fn remove_node(&mut self, entity: Entity) {
        self.detach(entity);

        let children = self
            .nodes
            .get_mut(entity)
            .map(|node| std::mem::take(&mut node.children))
            .unwrap_or_default();
        for child in children {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = None;
            }
            self.top_level.push(child);
            mark_subtree_dirty(&self.nodes, child);
        }

        // Skeletons bound to this node must re-resolve their hierarchy.
        for skeletal in self.skeletals.values_mut() {
            if skeletal.joints().contains(&entity) {
                skeletal.reset_hierarchy();
            }
        }

        self.nodes.remove(entity);
    }

    // ========================================================================
    // Capability Queries
    // ========================================================================

    #[must_use]
    pub fn components_of(&self, entity: Entity) -> ComponentMask {
        self.entities.get(entity).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn has_component(&self, entity: Entity, component: ComponentType) -> bool {
        self.components_of(entity).contains(component.mask())
    }

    /// All entities carrying `component`.
    pub fn entities_with(&self, component: ComponentType) -> impl Iterator<Item = Entity> + '_ {
        let mask = component.mask();
        self.entities
            .iter()
            .filter(move |(_, m)| m.contains(mask))
            .map(|(entity, _)| entity)
    }

    fn set_mask(&mut self, entity: Entity, component: ComponentType, on: bool) {
        if let Some(mask) = self.entities.get_mut(entity) {
            mask.set(component.mask(), on);
        }
    }

    fn require_entity(&self, entity: Entity) -> Result<()> {
        if self.entities.contains_key(entity) {
            Ok(())
        } else {
            Err(RhodoniteError::EntityNotFound(entity))
        }
    }

    fn require_transform(&self, entity: Entity) -> Result<()> {
        if self.transforms.contains_key(entity) {
            Ok(())
        } else {
            Err(RhodoniteError::MissingComponent {
                entity,
                component: ComponentType::Transform,
            })
        }
    }

    // ========================================================================
    // Component Registration
    // ========================================================================

    /// Adds or replaces the local transform.
    pub fn add_transform(&mut self, entity: Entity, transform: TransformComponent) -> Result<()> {
        self.require_entity(entity)?;
        self.transforms.insert(entity, transform);
        self.set_mask(entity, ComponentType::Transform, true);
        if self.nodes.contains_key(entity) {
            mark_subtree_dirty(&self.nodes, entity);
        }
        Ok(())
    }

    /// Makes the entity a top-level scene-graph node. An identity transform
    /// is added if the entity has none. No-op if it already is a node.
    pub fn add_scene_graph(&mut self, entity: Entity) -> Result<()> {
        self.require_entity(entity)?;
        self.insert_scene_graph(entity);
        Ok(())
    }

    fn insert_scene_graph(&mut self, entity: Entity) {
        if !self.transforms.contains_key(entity) {
            self.transforms.insert(entity, TransformComponent::new());
            self.set_mask(entity, ComponentType::Transform, true);
        }
        if !self.nodes.contains_key(entity) {
            self.nodes.insert(entity, SceneGraphComponent::new());
            self.top_level.push(entity);
            self.set_mask(entity, ComponentType::SceneGraph, true);
        }
    }

    pub fn add_mesh(&mut self, entity: Entity, mesh: MeshComponent) -> Result<()> {
        self.require_entity(entity)?;
        self.require_scene_graph(entity)?;
        self.meshes.insert(entity, mesh);
        self.set_mask(entity, ComponentType::Mesh, true);
        mark_subtree_dirty(&self.nodes, entity);
        Ok(())
    }

    /// Attaches an animation component and backs up the entity's current
    /// local transform as its rest pose.
    pub fn add_animation(&mut self, entity: Entity, mut animation: AnimationComponent) -> Result<()> {
        self.require_entity(entity)?;
        self.require_transform(entity)?;
        if let Some(transform) = self.transforms.get(entity) {
            animation.backup_rest_pose(transform);
        }
        self.animations.insert(entity, animation);
        self.set_mask(entity, ComponentType::Animation, true);
        Ok(())
    }

    pub fn add_blend_shape(&mut self, entity: Entity, blend_shape: BlendShapeComponent) -> Result<()> {
        self.require_entity(entity)?;
        self.blend_shapes.insert(entity, blend_shape);
        self.set_mask(entity, ComponentType::BlendShape, true);
        Ok(())
    }

    pub fn add_skeletal(&mut self, entity: Entity, skeletal: SkeletalComponent) -> Result<()> {
        self.require_entity(entity)?;
        self.skeletals.insert(entity, skeletal);
        self.set_mask(entity, ComponentType::Skeletal, true);
        Ok(())
    }

    /// Removes one component. Removing the scene graph re-roots the node's
    /// children, as [`World::destroy_entity`] does.
    pub fn remove_component(&mut self, entity: Entity, component: ComponentType) -> bool {
        if !self.has_component(entity, component) {
            return false;
        }
        match component {
            ComponentType::Transform => {
                self.transforms.remove(entity);
                if self.nodes.contains_key(entity) {
                    mark_subtree_dirty(&self.nodes, entity);
                }
            }
            ComponentType::SceneGraph => self.remove_node(entity),
            ComponentType::Mesh => {
                self.meshes.remove(entity);
                mark_subtree_dirty(&self.nodes, entity);
            }
            ComponentType::Animation => {
                self.animations.remove(entity);
            }
            ComponentType::BlendShape => {
                self.blend_shapes.remove(entity);
            }
            ComponentType::Skeletal => {
                self.skeletals.remove(entity);
            }
        }
        self.set_mask(entity, component, false);
        true
    }

    // ========================================================================
    // Component Access
    // ========================================================================

    #[must_use]
    pub fn mesh(&self, entity: Entity) -> Option<&MeshComponent> {
        self.meshes.get(entity)
    }

    #[must_use]
    pub fn animation(&self, entity: Entity) -> Option<&AnimationComponent> {
        self.animations.get(entity)
    }

    pub fn animation_mut(&mut self, entity: Entity) -> Option<&mut AnimationComponent> {
        self.animations.get_mut(entity)
    }

    #[must_use]
    pub fn blend_shape(&self, entity: Entity) -> Option<&BlendShapeComponent> {
        self.blend_shapes.get(entity)
    }

    pub fn blend_shape_mut(&mut self, entity: Entity) -> Option<&mut BlendShapeComponent> {
        self.blend_shapes.get_mut(entity)
    }

    #[must_use]
    pub fn spring_bones(&self) -> &SpringBoneSystem {
        &self.spring_bones
    }

    pub fn spring_bones_mut(&mut self) -> &mut SpringBoneSystem {
        &mut self.spring_bones
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Advances one frame: animation sampling, then spring bones, then
    /// skinning buffers. World matrices are refreshed lazily by whichever
    /// step reads them first.
    pub fn tick(&mut self, global_time: f32, delta_time: f32) {
        self.animation.global_time = global_time;

        crate::animation::system::update_animations(self);

        if self.settings.spring_bone_enabled {
            let mut spring_bones = std::mem::take(&mut self.spring_bones);
            spring_bones.update(self, delta_time);
            self.spring_bones = spring_bones;
        }

        let rebuilt = self.update_skeletals();
        log::trace!("tick t={global_time}: {rebuilt} skeletons rebuilt");
    }

    /// Drops every entity and resets the shared context. Settings are kept.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.transforms.clear();
        self.nodes.clear();
        self.top_level.clear();
        self.meshes.clear();
        self.animations.clear();
        self.blend_shapes.clear();
        self.skeletals.clear();
        self.spring_bones = SpringBoneSystem::default();
        self.animation = AnimationContext::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_node_registers_transform_and_scene_graph() {
        let mut world = World::new();
        let e = world.create_node();
        let mask = world.components_of(e);
        assert_eq!(mask, ComponentMask::TRANSFORM | ComponentMask::SCENE_GRAPH);
        assert_eq!(world.top_level_entities(), &[e]);
    }

    #[test]
    fn add_to_unknown_entity_fails() {
        let mut world = World::new();
        let e = world.create_entity();
        world.destroy_entity(e);
        assert_eq!(
            world.add_transform(e, TransformComponent::new()),
            Err(RhodoniteError::EntityNotFound(e))
        );
    }

    #[test]
    fn mesh_requires_scene_graph() {
        let mut world = World::new();
        let e = world.create_entity();
        assert_eq!(
            world.add_mesh(e, MeshComponent::new()),
            Err(RhodoniteError::MissingComponent {
                entity: e,
                component: ComponentType::SceneGraph,
            })
        );
    }
}
