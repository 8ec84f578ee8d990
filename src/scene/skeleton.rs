use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::core::{Entity, World};
use crate::errors::{Result, RhodoniteError};
use crate::scene::bounds::BoundingBox;
use crate::scene::scene_graph::GraphView;

/// Floats per joint in [`JointPacking::Matrix`] mode (one column-major mat4).
pub const MATRIX_FLOATS_PER_JOINT: usize = 16;

/// Floats per joint in [`JointPacking::Compressed`] mode:
/// `vec4(quaternion)` followed by `vec4(translate.xyz, max scale)`.
pub const COMPRESSED_FLOATS_PER_JOINT: usize = 8;

/// GPU layout of the skinning buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JointPacking {
    /// One 4x4 matrix per joint.
    #[default]
    Matrix,
    /// Quaternion + translate + uniform scale per joint. Non-uniform scale is
    /// approximated by its largest component.
    Compressed,
}

impl JointPacking {
    #[inline]
    #[must_use]
    pub fn floats_per_joint(self) -> usize {
        match self {
            JointPacking::Matrix => MATRIX_FLOATS_PER_JOINT,
            JointPacking::Compressed => COMPRESSED_FLOATS_PER_JOINT,
        }
    }
}

/// A joint matrix decomposed into translate / rotation / scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTrs {
    pub translate: Vec3,
    pub quaternion: Quat,
    pub scale: Vec3,
}

impl JointTrs {
    #[must_use]
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, quaternion, translate) = matrix.to_scale_rotation_translation();
        Self {
            translate,
            quaternion,
            scale,
        }
    }

    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quaternion, self.translate)
    }
}

impl Default for JointTrs {
    fn default() -> Self {
        Self {
            translate: Vec3::ZERO,
            quaternion: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Skin binding of an entity.
///
/// `joints[i]` is the scene-graph node driving skin joint `i`; its skinning
/// matrix is `world(joints[i]) * inverse_bind_matrices[i] * bind_shape_matrix`.
/// The flattened buffers are rebuilt by [`World::update_skeletal`] only when a
/// joint's world matrix was recomputed since the last rebuild.
#[derive(Debug, Clone, Default)]
pub struct SkeletalComponent {
    pub name: String,

    joints: Vec<Entity>,
    inverse_bind_matrices: Option<Vec<Mat4>>,
    bind_shape_matrix: Option<Mat4>,
    top_of_joints_hierarchy: Option<Entity>,
    /// Nodes flagged as joints by the last hierarchy resolve.
    flagged_joints: Vec<Entity>,

    // === Runtime Data ===
    joint_trs: Vec<JointTrs>,
    joint_matrices: Vec<f32>,
    joint_quaternions: Vec<f32>,
    joint_translate_scales: Vec<f32>,
    joint_compressed_chunk: Vec<f32>,

    // === Cache State ===
    seen_world_versions: Vec<u64>,
    packing: JointPacking,
    valid: bool,
    rebuild_count: u64,
}

impl SkeletalComponent {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_joints(mut self, joints: Vec<Entity>) -> Self {
        self.set_joints(joints);
        self
    }

    #[must_use]
    pub fn joints(&self) -> &[Entity] {
        &self.joints
    }

    /// Replaces the joint list and invalidates the cached buffers.
    ///
    /// Inverse bind matrices are kept only if their count still matches.
    pub fn set_joints(&mut self, joints: Vec<Entity>) {
        if let Some(ibms) = &self.inverse_bind_matrices
            && ibms.len() != joints.len()
        {
            log::warn!(
                "Skeleton '{}': dropping {} inverse bind matrices for {} joints",
                self.name,
                ibms.len(),
                joints.len()
            );
            self.inverse_bind_matrices = None;
        }
        self.joints = joints;
        self.reset_hierarchy();
    }

    #[must_use]
    pub fn inverse_bind_matrices(&self) -> Option<&[Mat4]> {
        self.inverse_bind_matrices.as_deref()
    }

    /// One matrix per joint; `None` means identity for every joint.
    pub fn set_inverse_bind_matrices(&mut self, matrices: Option<Vec<Mat4>>) -> Result<()> {
        if let Some(m) = &matrices
            && m.len() != self.joints.len()
        {
            return Err(RhodoniteError::JointCountMismatch {
                joints: self.joints.len(),
                matrices: m.len(),
            });
        }
        self.inverse_bind_matrices = matrices;
        self.invalidate();
        Ok(())
    }

    #[must_use]
    pub fn bind_shape_matrix(&self) -> Option<Mat4> {
        self.bind_shape_matrix
    }

    pub fn set_bind_shape_matrix(&mut self, matrix: Option<Mat4>) {
        self.bind_shape_matrix = matrix;
        self.invalidate();
    }

    /// Joint anchoring the hierarchy, resolved on the first update after the
    /// joint list changed.
    #[must_use]
    pub fn top_of_joints_hierarchy(&self) -> Option<Entity> {
        self.top_of_joints_hierarchy
    }

    /// Forces a rebuild on the next update.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Forces the joint hierarchy to be resolved again on the next update.
    pub(crate) fn reset_hierarchy(&mut self) {
        self.top_of_joints_hierarchy = None;
        self.invalidate();
    }

    /// Number of times the buffers have been rebuilt.
    #[must_use]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    /// Packing used by the last rebuild.
    #[must_use]
    pub fn packing(&self) -> JointPacking {
        self.packing
    }

    /// `16 * joints` floats, column-major.
    #[must_use]
    pub fn joint_matrices(&self) -> &[f32] {
        &self.joint_matrices
    }

    #[must_use]
    pub fn joint_matrix(&self, index: usize) -> Option<Mat4> {
        let start = index * MATRIX_FLOATS_PER_JOINT;
        let slice = self
            .joint_matrices
            .get(start..start + MATRIX_FLOATS_PER_JOINT)?;
        Some(Mat4::from_cols_slice(slice))
    }

    /// Decomposed joint matrices (filled in compressed mode only).
    #[must_use]
    pub fn joint_trs(&self) -> &[JointTrs] {
        &self.joint_trs
    }

    /// `4 * joints` floats (compressed mode only).
    #[must_use]
    pub fn joint_quaternion_array(&self) -> &[f32] {
        &self.joint_quaternions
    }

    /// `4 * joints` floats: `translate.xyz, max scale` (compressed mode only).
    #[must_use]
    pub fn joint_translate_scale_array(&self) -> &[f32] {
        &self.joint_translate_scales
    }

    /// `8 * joints` floats (compressed mode only).
    #[must_use]
    pub fn joint_compressed_chunk(&self) -> &[f32] {
        &self.joint_compressed_chunk
    }

    /// The buffer matching the active packing.
    #[must_use]
    pub fn gpu_buffer(&self) -> &[f32] {
        match self.packing {
            JointPacking::Matrix => &self.joint_matrices,
            JointPacking::Compressed => &self.joint_compressed_chunk,
        }
    }

    /// [`gpu_buffer`](Self::gpu_buffer) as raw bytes for upload.
    #[must_use]
    pub fn gpu_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.gpu_buffer())
    }

    fn resolve_top_of_hierarchy(&mut self, graph: GraphView<'_>) {
        for joint in self.flagged_joints.drain(..) {
            graph.unflag_joint(joint);
        }

        let joint_set: FxHashSet<Entity> = self.joints.iter().copied().collect();

        let flagged = self
            .joints
            .iter()
            .copied()
            .find(|&j| graph.nodes.get(j).is_some_and(|n| n.is_root_joint()));

        let top = flagged.or_else(|| {
            self.joints.iter().copied().find(|&j| {
                graph
                    .nodes
                    .get(j)
                    .is_some_and(|n| n.parent().is_none_or(|p| !joint_set.contains(&p)))
            })
        });

        for &joint in &self.joints {
            graph.flag_joint(joint, Some(joint) == top);
        }
        self.flagged_joints.clone_from(&self.joints);
        self.top_of_joints_hierarchy = top;
    }

    /// Rebuilds the buffers if any joint's world matrix changed since the
    /// last rebuild. Returns `true` when a rebuild happened.
    pub(crate) fn update(&mut self, graph: GraphView<'_>, packing: JointPacking) -> bool {
        let count = self.joints.len();

        if !self.valid && self.top_of_joints_hierarchy.is_none() {
            self.resolve_top_of_hierarchy(graph);
        }

        let mut changed =
            !self.valid || self.packing != packing || self.seen_world_versions.len() != count;
        for (i, &joint) in self.joints.iter().enumerate() {
            // Refreshing first so the version reflects pending hierarchy edits.
            let _ = graph.world_matrix(joint);
            if self.seen_world_versions.get(i) != Some(&graph.world_version(joint)) {
                changed = true;
            }
        }

        if !changed {
            log::trace!("Skeleton '{}': joints unchanged, reusing buffers", self.name);
            return false;
        }

        self.seen_world_versions.resize(count, 0);
        self.joint_matrices.resize(count * MATRIX_FLOATS_PER_JOINT, 0.0);
        if packing == JointPacking::Compressed {
            self.joint_trs.resize(count, JointTrs::default());
            self.joint_quaternions.resize(count * 4, 0.0);
            self.joint_translate_scales.resize(count * 4, 0.0);
            self.joint_compressed_chunk
                .resize(count * COMPRESSED_FLOATS_PER_JOINT, 0.0);
        } else {
            self.joint_trs.clear();
            self.joint_quaternions.clear();
            self.joint_translate_scales.clear();
            self.joint_compressed_chunk.clear();
        }

        for (i, &joint) in self.joints.iter().enumerate() {
            let world = graph.world_matrix(joint).unwrap_or(Mat4::IDENTITY);
            let ibm = self
                .inverse_bind_matrices
                .as_ref()
                .and_then(|m| m.get(i))
                .copied()
                .unwrap_or(Mat4::IDENTITY);

            let mut matrix = world * ibm;
            if let Some(bind_shape) = self.bind_shape_matrix {
                matrix *= bind_shape;
            }

            let m = i * MATRIX_FLOATS_PER_JOINT;
            self.joint_matrices[m..m + MATRIX_FLOATS_PER_JOINT]
                .copy_from_slice(&matrix.to_cols_array());

            if packing == JointPacking::Compressed {
                let trs = JointTrs::from_matrix(&matrix);
                let q = trs.quaternion.to_array();
                let ts = [
                    trs.translate.x,
                    trs.translate.y,
                    trs.translate.z,
                    trs.scale.abs().max_element(),
                ];
                self.joint_trs[i] = trs;
                self.joint_quaternions[i * 4..i * 4 + 4].copy_from_slice(&q);
                self.joint_translate_scales[i * 4..i * 4 + 4].copy_from_slice(&ts);
                let c = i * COMPRESSED_FLOATS_PER_JOINT;
                self.joint_compressed_chunk[c..c + 4].copy_from_slice(&q);
                self.joint_compressed_chunk[c + 4..c + 8].copy_from_slice(&ts);
            }

            self.seen_world_versions[i] = graph.world_version(joint);
        }

        self.packing = packing;
        self.valid = true;
        self.rebuild_count += 1;
        true
    }
}

impl World {
    /// Refreshes the skinning buffers of one entity. Returns `true` if they
    /// were rebuilt, `false` if reused or if the entity has no skeleton.
    pub fn update_skeletal(&mut self, entity: Entity) -> bool {
        let packing = self.settings.joint_packing;
        let graph = GraphView {
            nodes: &self.nodes,
            transforms: &self.transforms,
        };
        self.skeletals
            .get_mut(entity)
            .is_some_and(|skeletal| skeletal.update(graph, packing))
    }

    /// Refreshes every skeleton. Returns how many were rebuilt.
    pub fn update_skeletals(&mut self) -> usize {
        let packing = self.settings.joint_packing;
        let graph = GraphView {
            nodes: &self.nodes,
            transforms: &self.transforms,
        };
        self.skeletals
            .values_mut()
            .map(|skeletal| skeletal.update(graph, packing))
            .filter(|&rebuilt| rebuilt)
            .count()
    }

    #[must_use]
    pub fn skeletal(&self, entity: Entity) -> Option<&SkeletalComponent> {
        self.skeletals.get(entity)
    }

    pub fn skeletal_mut(&mut self, entity: Entity) -> Option<&mut SkeletalComponent> {
        self.skeletals.get_mut(entity)
    }

    /// Tight world bounds of the current joint positions.
    #[must_use]
    pub fn skeleton_world_bounds(&self, entity: Entity) -> Option<BoundingBox> {
        let skeletal = self.skeletals.get(entity)?;
        BoundingBox::from_points(
            skeletal
                .joints
                .iter()
                .filter_map(|&joint| self.world_position(joint)),
        )
    }
}
