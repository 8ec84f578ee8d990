use std::cell::Cell;
use std::ops::{Deref, DerefMut};

use bitflags::bitflags;
use glam::{Mat3, Mat4, Quat, Vec3};
use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::core::{ComponentType, Entity, World};
use crate::errors::{Result, RhodoniteError};
use crate::scene::bounds::BoundingBox;
use crate::scene::transform::TransformComponent;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    struct NodeFlags: u8 {
        const WORLD_MATRIX_DIRTY = 1 << 0;
        const WORLD_NORMAL_DIRTY = 1 << 1;
        const WORLD_AABB_DIRTY   = 1 << 2;
        const VISIBLE            = 1 << 3;
        const JOINT              = 1 << 4;
        const ROOT_JOINT         = 1 << 5;

        const ALL_DIRTY = Self::WORLD_MATRIX_DIRTY.bits()
            | Self::WORLD_NORMAL_DIRTY.bits()
            | Self::WORLD_AABB_DIRTY.bits();
    }
}

/// Scene-graph membership of an entity.
///
/// Parent and children are handles into the owning [`World`]; the node owns
/// neither. The world matrix, world normal matrix and merged world AABB are
/// caches guarded by independent dirty flags.
///
/// # Dirty Invariant
///
/// When a node's world matrix is dirty, every descendant's is dirty as well.
/// [`World::set_world_matrix_dirty_recursively`] (called by every local
/// transform write made through [`World::transform_mut`], and by reparenting)
/// maintains this. Reads therefore only need to walk up until they meet a
/// clean ancestor.
#[derive(Debug, Clone)]
pub struct SceneGraphComponent {
    pub(crate) parent: Option<Entity>,
    pub(crate) children: Vec<Entity>,

    world_matrix: Cell<Mat4>,
    world_normal_matrix: Cell<Mat3>,
    world_aabb: Cell<Option<BoundingBox>>,
    flags: Cell<NodeFlags>,
    world_version: Cell<u64>,
}

impl SceneGraphComponent {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            world_matrix: Cell::new(Mat4::IDENTITY),
            world_normal_matrix: Cell::new(Mat3::IDENTITY),
            world_aabb: Cell::new(None),
            flags: Cell::new(NodeFlags::ALL_DIRTY | NodeFlags::VISIBLE),
            world_version: Cell::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[Entity] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn is_world_matrix_dirty(&self) -> bool {
        self.flags.get().contains(NodeFlags::WORLD_MATRIX_DIRTY)
    }

    #[inline]
    #[must_use]
    pub fn is_world_aabb_dirty(&self) -> bool {
        self.flags.get().contains(NodeFlags::WORLD_AABB_DIRTY)
    }

    /// Own visibility flag, ignoring ancestors.
    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.flags.get().contains(NodeFlags::VISIBLE)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.set_flag(NodeFlags::VISIBLE, visible);
    }

    /// Whether this node is referenced as a skin joint.
    #[inline]
    #[must_use]
    pub fn is_joint(&self) -> bool {
        self.flags.get().contains(NodeFlags::JOINT)
    }

    pub fn set_joint(&mut self, joint: bool) {
        self.set_flag(NodeFlags::JOINT, joint);
    }

    /// Whether this node anchors a joint hierarchy.
    #[inline]
    #[must_use]
    pub fn is_root_joint(&self) -> bool {
        self.flags.get().contains(NodeFlags::ROOT_JOINT)
    }

    pub fn set_root_joint(&mut self, root_joint: bool) {
        self.set_flag(NodeFlags::ROOT_JOINT, root_joint);
    }

    /// Incremented each time the world matrix is recomputed.
    #[inline]
    #[must_use]
    pub fn world_version(&self) -> u64 {
        self.world_version.get()
    }

    /// Last computed world matrix, without refreshing it.
    #[inline]
    #[must_use]
    pub fn cached_world_matrix(&self) -> Mat4 {
        self.world_matrix.get()
    }

    fn set_flag(&mut self, flag: NodeFlags, on: bool) {
        let mut flags = self.flags.get();
        flags.set(flag, on);
        self.flags.set(flags);
    }

    #[inline]
    fn mark(&self, flags: NodeFlags) {
        self.flags.set(self.flags.get() | flags);
    }

    #[inline]
    fn clear(&self, flags: NodeFlags) {
        self.flags.set(self.flags.get() - flags);
    }

    pub(crate) fn store_world_matrix(&self, world: Mat4) {
        self.world_matrix.set(world);
        self.world_version.set(self.world_version.get().wrapping_add(1));
        self.clear(NodeFlags::WORLD_MATRIX_DIRTY);
        self.mark(NodeFlags::WORLD_NORMAL_DIRTY);
    }
}

impl Default for SceneGraphComponent {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks `root` and all its descendants world-matrix dirty, and every
/// ancestor's merged AABB dirty.
pub(crate) fn mark_subtree_dirty(nodes: &SecondaryMap<Entity, SceneGraphComponent>, root: Entity) {
    let mut stack: SmallVec<[Entity; 32]> = SmallVec::new();
    stack.push(root);
    while let Some(entity) = stack.pop() {
        if let Some(node) = nodes.get(entity) {
            node.mark(NodeFlags::ALL_DIRTY);
            stack.extend(node.children.iter().copied());
        }
    }

    let mut cursor = nodes.get(root).and_then(|n| n.parent);
    while let Some(entity) = cursor {
        let Some(node) = nodes.get(entity) else {
            break;
        };
        node.mark(NodeFlags::WORLD_AABB_DIRTY);
        cursor = node.parent;
    }
}

/// Read-only view over the hierarchy and local transforms.
///
/// Borrows only the two maps it needs, so systems can hold it alongside a
/// mutable borrow of their own component storage.
#[derive(Clone, Copy)]
pub(crate) struct GraphView<'a> {
    pub(crate) nodes: &'a SecondaryMap<Entity, SceneGraphComponent>,
    pub(crate) transforms: &'a SecondaryMap<Entity, TransformComponent>,
}

impl GraphView<'_> {
    pub(crate) fn world_matrix(&self, entity: Entity) -> Option<Mat4> {
        let node = self.nodes.get(entity)?;
        if !node.is_world_matrix_dirty() {
            return Some(node.world_matrix.get());
        }

        let mut chain: SmallVec<[Entity; 16]> = SmallVec::new();
        let mut parent_world = Mat4::IDENTITY;
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            if !node.is_world_matrix_dirty() {
                parent_world = node.world_matrix.get();
                break;
            }
            chain.push(current);
            cursor = node.parent;
        }

        for &current in chain.iter().rev() {
            let local = self
                .transforms
                .get(current)
                .map_or(Mat4::IDENTITY, TransformComponent::matrix);
            parent_world *= local;
            self.nodes[current].store_world_matrix(parent_world);
        }

        Some(parent_world)
    }

    #[inline]
    pub(crate) fn world_version(&self, entity: Entity) -> u64 {
        self.nodes.get(entity).map_or(0, SceneGraphComponent::world_version)
    }

    /// Flags `entity` as a joint and invalidates the merged AABB of it and
    /// its ancestors, which depends on the flag.
    pub(crate) fn flag_joint(&self, entity: Entity, root: bool) {
        let Some(node) = self.nodes.get(entity) else {
            return;
        };
        let mut flags = NodeFlags::JOINT;
        if root {
            flags |= NodeFlags::ROOT_JOINT;
        }
        node.mark(flags);
        self.mark_aabb_dirty_upwards(entity);
    }

    /// Drops both joint flags from `entity`.
    pub(crate) fn unflag_joint(&self, entity: Entity) {
        let Some(node) = self.nodes.get(entity) else {
            return;
        };
        node.clear(NodeFlags::JOINT | NodeFlags::ROOT_JOINT);
        self.mark_aabb_dirty_upwards(entity);
    }

    fn mark_aabb_dirty_upwards(&self, entity: Entity) {
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            node.mark(NodeFlags::WORLD_AABB_DIRTY);
            cursor = node.parent;
        }
    }
}

/// Mutable access to a [`TransformComponent`] that keeps the scene graph
/// consistent: when the guard is dropped after any write, the entity's
/// subtree is marked dirty.
pub struct TransformMut<'a> {
    entity: Entity,
    transform: &'a mut TransformComponent,
    nodes: &'a SecondaryMap<Entity, SceneGraphComponent>,
    start_count: u64,
}

impl Deref for TransformMut<'_> {
    type Target = TransformComponent;

    fn deref(&self) -> &Self::Target {
        self.transform
    }
}

impl DerefMut for TransformMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.transform
    }
}

impl Drop for TransformMut<'_> {
    fn drop(&mut self) {
        if self.transform.update_count() != self.start_count {
            mark_subtree_dirty(self.nodes, self.entity);
        }
    }
}

// ============================================================================
// Hierarchy & world-space queries
// ============================================================================

impl World {
    #[must_use]
    pub fn scene_graph(&self, entity: Entity) -> Option<&SceneGraphComponent> {
        self.nodes.get(entity)
    }

    /// Mutable access for flags (visibility, joint markers). Hierarchy links
    /// are only editable through [`World::add_child`] / [`World::remove_child`].
    pub fn scene_graph_mut(&mut self, entity: Entity) -> Option<&mut SceneGraphComponent> {
        self.nodes.get_mut(entity)
    }

    #[must_use]
    pub fn transform(&self, entity: Entity) -> Option<&TransformComponent> {
        self.transforms.get(entity)
    }

    /// Write access to an entity's local transform. See [`TransformMut`].
    pub fn transform_mut(&mut self, entity: Entity) -> Option<TransformMut<'_>> {
        let transform = self.transforms.get_mut(entity)?;
        let start_count = transform.update_count();
        Some(TransformMut {
            entity,
            transform,
            nodes: &self.nodes,
            start_count,
        })
    }

    #[must_use]
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.nodes.get(entity)?.parent
    }

    #[must_use]
    pub fn children(&self, entity: Entity) -> &[Entity] {
        self.nodes.get(entity).map_or(&[], |n| n.children.as_slice())
    }

    /// All scene-graph nodes without a parent, in insertion order.
    #[must_use]
    pub fn top_level_entities(&self) -> &[Entity] {
        &self.top_level
    }

    /// Returns `true` if `ancestor` is `entity` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current).and_then(|n| n.parent);
        }
        false
    }

    /// Attaches `child` under `parent`, detaching it from its previous parent
    /// first. Rejects self-attachment and cycles.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> bool {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            log::warn!("add_child: {parent:?} or {child:?} has no scene graph component");
            return false;
        }
        if self.is_ancestor_of(child, parent) {
            log::warn!("add_child: attaching {child:?} under {parent:?} would create a cycle");
            return false;
        }
        if self.nodes[child].parent == Some(parent) {
            return true;
        }

        self.detach(child);

        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
        mark_subtree_dirty(&self.nodes, child);
        true
    }

    /// Detaches `child` from `parent`; the child becomes a top-level node.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> bool {
        if self.nodes.get(child).and_then(|n| n.parent) != Some(parent) {
            log::debug!("remove_child: {child:?} is not a child of {parent:?}");
            return false;
        }
        self.detach(child);
        self.top_level.push(child);
        mark_subtree_dirty(&self.nodes, child);
        true
    }

    /// Unlinks `child` from its parent (or from the top-level list).
    pub(crate) fn detach(&mut self, child: Entity) {
        // Invalidate the old ancestors' merged AABB while still linked.
        mark_subtree_dirty(&self.nodes, child);

        let old_parent = self.nodes.get(child).and_then(|n| n.parent);
        if let Some(old_parent) = old_parent {
            if let Some(node) = self.nodes.get_mut(old_parent)
                && let Some(i) = node.children.iter().position(|&c| c == child)
            {
                node.children.remove(i);
            }
        } else if let Some(i) = self.top_level.iter().position(|&e| e == child) {
            self.top_level.remove(i);
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
    }

    /// Marks this node only.
    pub fn set_world_matrix_dirty(&self, entity: Entity) {
        if let Some(node) = self.nodes.get(entity) {
            node.mark(NodeFlags::ALL_DIRTY);
        }
    }

    /// Marks this node and all descendants.
    pub fn set_world_matrix_dirty_recursively(&self, entity: Entity) {
        mark_subtree_dirty(&self.nodes, entity);
    }

    /// World matrix, recomputed on demand.
    ///
    /// Walks up to the nearest ancestor with a valid world matrix (or the
    /// root), then multiplies back down, caching every matrix on the way.
    #[must_use]
    pub fn world_matrix(&self, entity: Entity) -> Option<Mat4> {
        self.graph().world_matrix(entity)
    }

    pub(crate) fn graph(&self) -> GraphView<'_> {
        GraphView {
            nodes: &self.nodes,
            transforms: &self.transforms,
        }
    }

    /// Inverse-transpose of the world matrix's upper 3x3.
    #[must_use]
    pub fn world_normal_matrix(&self, entity: Entity) -> Option<Mat3> {
        let world = self.world_matrix(entity)?;
        let node = self.nodes.get(entity)?;
        if node.flags.get().contains(NodeFlags::WORLD_NORMAL_DIRTY) {
            node.world_normal_matrix
                .set(Mat3::from_mat4(world).inverse().transpose());
            node.clear(NodeFlags::WORLD_NORMAL_DIRTY);
        }
        Some(node.world_normal_matrix.get())
    }

    #[must_use]
    pub fn world_position(&self, entity: Entity) -> Option<Vec3> {
        self.world_matrix(entity).map(|m| m.w_axis.truncate())
    }

    #[must_use]
    pub fn world_rotation(&self, entity: Entity) -> Option<Quat> {
        self.world_matrix(entity)
            .map(|m| m.to_scale_rotation_translation().1)
    }

    #[must_use]
    pub fn world_scale(&self, entity: Entity) -> Option<Vec3> {
        self.world_matrix(entity)
            .map(|m| m.to_scale_rotation_translation().0)
    }

    /// Visible only if this node and every ancestor are visible.
    #[must_use]
    pub fn is_visible_in_hierarchy(&self, entity: Entity) -> bool {
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                return false;
            };
            if !node.is_visible() {
                return false;
            }
            cursor = node.parent;
        }
        true
    }

    /// Union of the world-space bounds of every mesh in the subtree.
    ///
    /// Joint subtrees are reduced to the joint's world position unless
    /// [`WorldSettings::update_joint_aabb`](crate::settings::WorldSettings)
    /// is enabled.
    #[must_use]
    pub fn world_aabb(&self, entity: Entity) -> Option<BoundingBox> {
        if self.cached_joint_aabb_setting.get() != self.settings.update_joint_aabb {
            for node in self.nodes.values() {
                node.mark(NodeFlags::WORLD_AABB_DIRTY);
            }
            self.cached_joint_aabb_setting.set(self.settings.update_joint_aabb);
        }

        let node = self.nodes.get(entity)?;
        if !node.is_world_aabb_dirty() {
            return node.world_aabb.get();
        }

        let mut merged = self
            .meshes
            .get(entity)
            .and_then(|mesh| mesh.local_aabb())
            .zip(self.world_matrix(entity))
            .map(|(local, world)| local.transform(&world));

        if node.is_joint() && !self.settings.update_joint_aabb {
            if let Some(position) = self.world_position(entity) {
                let point = BoundingBox::from_point(position);
                merged = Some(merged.map_or(point, |m| m.union(&point)));
            }
        } else {
            for &child in &node.children {
                if let Some(child_box) = self.world_aabb(child) {
                    merged = Some(merged.map_or(child_box, |m| m.union(&child_box)));
                }
            }
        }

        node.world_aabb.set(merged);
        node.clear(NodeFlags::WORLD_AABB_DIRTY);
        merged
    }

    pub(crate) fn require_scene_graph(&self, entity: Entity) -> Result<()> {
        if self.nodes.contains_key(entity) {
            Ok(())
        } else {
            Err(RhodoniteError::MissingComponent {
                entity,
                component: ComponentType::SceneGraph,
            })
        }
    }
}
