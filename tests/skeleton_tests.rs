//! Skeleton tests
//!
//! Tests for:
//! - Joint matrices (world * inverse bind * bind shape)
//! - Rebuild skipping when no joint moved
//! - Compressed packing
//! - Root joint detection and joint flags

use glam::{Mat4, Quat, Vec3};
use rhodonite::core::{Entity, World};
use rhodonite::scene::skeleton::{COMPRESSED_FLOATS_PER_JOINT, JointPacking, MATRIX_FLOATS_PER_JOINT, SkeletalComponent};
use rhodonite::settings::WorldSettings;

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-5;

struct Rig {
    world: World,
    mesh: Entity,
    /// hips -> spine -> head
    joints: Vec<Entity>,
}

fn rig(settings: WorldSettings) -> Rig {
    let mut world = World::with_settings(settings);
    let root = world.create_node();
    let mut joints = Vec::new();
    let mut parent = root;
    for y in [1.0, 0.5, 0.25] {
        let joint = world.create_node();
        world.transform_mut(joint).unwrap().set_translate(Vec3::new(0.0, y, 0.0));
        world.add_child(parent, joint);
        joints.push(joint);
        parent = joint;
    }

    let mesh = world.create_node();
    world.add_child(root, mesh);
    let inverse_binds = joints
        .iter()
        .map(|&j| world.world_matrix(j).unwrap().inverse())
        .collect();
    let mut skeletal = SkeletalComponent::new("body").with_joints(joints.clone());
    skeletal.set_inverse_bind_matrices(Some(inverse_binds)).unwrap();
    world.add_skeletal(mesh, skeletal).unwrap();

    Rig { world, mesh, joints }
}

// ============================================================================
// Joint Matrices
// ============================================================================

#[test]
fn bind_pose_yields_identity_joint_matrices() {
    let Rig { mut world, mesh, .. } = rig(WorldSettings::default());
    assert!(world.update_skeletal(mesh));

    let skeletal = world.skeletal(mesh).unwrap();
    assert_eq!(skeletal.joint_matrices().len(), 3 * MATRIX_FLOATS_PER_JOINT);
    for i in 0..3 {
        assert!(skeletal.joint_matrix(i).unwrap().abs_diff_eq(Mat4::IDENTITY, EPSILON));
    }
    assert!(skeletal.joint_matrix(3).is_none());
}

#[test]
fn joint_matrix_is_world_times_inverse_bind() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    world
        .transform_mut(joints[1])
        .unwrap()
        .set_quaternion(Quat::from_rotation_z(0.8));
    let bind_shape = Mat4::from_scale(Vec3::splat(0.5));
    world.skeletal_mut(mesh).unwrap().set_bind_shape_matrix(Some(bind_shape));
    world.update_skeletal(mesh);

    let skeletal = world.skeletal(mesh).unwrap();
    let ibms = skeletal.inverse_bind_matrices().unwrap().to_vec();
    for (i, &joint) in joints.iter().enumerate() {
        let expected = world.world_matrix(joint).unwrap() * ibms[i] * bind_shape;
        assert!(skeletal.joint_matrix(i).unwrap().abs_diff_eq(expected, EPSILON));
    }
}

#[test]
fn missing_inverse_binds_default_to_identity() {
    let mut world = World::new();
    let joint = world.create_node();
    world.transform_mut(joint).unwrap().set_translate(Vec3::new(2.0, 0.0, 0.0));
    let mesh = world.create_node();
    world
        .add_skeletal(mesh, SkeletalComponent::new("bare").with_joints(vec![joint]))
        .unwrap();

    world.update_skeletals();
    let matrix = world.skeletal(mesh).unwrap().joint_matrix(0).unwrap();
    assert!(matrix.abs_diff_eq(Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)), EPSILON));
}

// ============================================================================
// Rebuild Skipping
// ============================================================================

#[test]
fn unchanged_joints_skip_rebuild() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());

    assert_eq!(world.update_skeletals(), 1);
    assert_eq!(world.update_skeletals(), 0);
    assert_eq!(world.skeletal(mesh).unwrap().rebuild_count(), 1);

    // The mesh node is not a joint
    world.transform_mut(mesh).unwrap().set_translate(Vec3::X);
    assert_eq!(world.update_skeletals(), 0);

    world.transform_mut(joints[2]).unwrap().set_translate(Vec3::new(0.0, 1.0, 0.0));
    assert_eq!(world.update_skeletals(), 1);
    assert_eq!(world.skeletal(mesh).unwrap().rebuild_count(), 2);
}

#[test]
fn moving_an_ancestor_of_the_joints_rebuilds() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    world.tick(0.0, 0.0);
    let before = world.skeletal(mesh).unwrap().rebuild_count();

    let root = world.parent(joints[0]).unwrap();
    world.transform_mut(root).unwrap().set_translate(Vec3::new(0.0, 0.0, 4.0));
    world.tick(0.0, 0.0);

    let skeletal = world.skeletal(mesh).unwrap();
    assert_eq!(skeletal.rebuild_count(), before + 1);
    let expected = Mat4::from_translation(Vec3::new(0.0, 0.0, 4.0));
    assert!(skeletal.joint_matrix(2).unwrap().abs_diff_eq(expected, EPSILON));
}

#[test]
fn editing_skeleton_data_forces_rebuild() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    world.update_skeletals();

    world.skeletal_mut(mesh).unwrap().invalidate();
    assert!(world.update_skeletal(mesh));

    // Joint count changes drop the inverse binds
    world.skeletal_mut(mesh).unwrap().set_joints(joints[..2].to_vec());
    assert!(world.skeletal(mesh).unwrap().inverse_bind_matrices().is_none());
    assert!(world.update_skeletal(mesh));
    assert_eq!(world.skeletal(mesh).unwrap().joint_matrices().len(), 2 * MATRIX_FLOATS_PER_JOINT);

    world.settings.joint_packing = JointPacking::Compressed;
    assert!(world.update_skeletal(mesh));
    assert_eq!(world.skeletal(mesh).unwrap().packing(), JointPacking::Compressed);
}

// ============================================================================
// Compressed Packing
// ============================================================================

#[test]
fn compressed_chunk_holds_rotation_and_translate_scale() {
    let settings = WorldSettings {
        joint_packing: JointPacking::Compressed,
        ..Default::default()
    };
    let Rig { mut world, mesh, joints } = rig(settings);
    let rotation = Quat::from_rotation_x(0.6);
    {
        let mut t = world.transform_mut(joints[0]).unwrap();
        t.set_quaternion(rotation);
        t.set_scale(Vec3::new(1.0, 2.0, 1.0));
    }
    world.update_skeletals();

    let skeletal = world.skeletal(mesh).unwrap();
    let n = joints.len();
    assert_eq!(skeletal.joint_compressed_chunk().len(), n * COMPRESSED_FLOATS_PER_JOINT);
    assert_eq!(skeletal.joint_quaternion_array().len(), n * 4);
    assert_eq!(skeletal.joint_translate_scale_array().len(), n * 4);
    assert_eq!(skeletal.gpu_buffer().len(), n * COMPRESSED_FLOATS_PER_JOINT);
    assert_eq!(skeletal.gpu_bytes().len(), n * COMPRESSED_FLOATS_PER_JOINT * 4);

    for i in 0..n {
        let matrix = skeletal.joint_matrix(i).unwrap();
        let trs = skeletal.joint_trs()[i];
        assert!(trs.to_matrix().abs_diff_eq(matrix, 1e-4));

        let chunk = &skeletal.joint_compressed_chunk()[i * 8..i * 8 + 8];
        assert_eq!(&chunk[..4], &trs.quaternion.to_array());
        assert_eq!(&chunk[4..7], &trs.translate.to_array());
        assert!((chunk[7] - trs.scale.abs().max_element()).abs() < EPSILON);
    }
    assert!((skeletal.joint_compressed_chunk()[7] - 2.0).abs() < 1e-4);
}

#[test]
fn matrix_packing_uploads_matrices() {
    let Rig { mut world, mesh, .. } = rig(WorldSettings::default());
    world.update_skeletals();
    let skeletal = world.skeletal(mesh).unwrap();
    assert!(skeletal.joint_compressed_chunk().is_empty());
    assert_eq!(skeletal.gpu_bytes().len(), 3 * MATRIX_FLOATS_PER_JOINT * 4);
}

// ============================================================================
// Joint Hierarchy
// ============================================================================

#[test]
fn top_joint_is_first_without_joint_parent() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    // List order does not matter
    world
        .skeletal_mut(mesh)
        .unwrap()
        .set_joints(vec![joints[2], joints[0], joints[1]]);
    world.update_skeletal(mesh);

    assert_eq!(world.skeletal(mesh).unwrap().top_of_joints_hierarchy(), Some(joints[0]));
    for &joint in &joints {
        assert!(world.scene_graph(joint).unwrap().is_joint());
    }
    assert!(world.scene_graph(joints[0]).unwrap().is_root_joint());
    assert!(!world.scene_graph(mesh).unwrap().is_joint());
}

#[test]
fn flagged_root_joint_wins() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    world.scene_graph_mut(joints[1]).unwrap().set_root_joint(true);
    world.update_skeletal(mesh);
    assert_eq!(world.skeletal(mesh).unwrap().top_of_joints_hierarchy(), Some(joints[1]));
}

#[test]
fn skeleton_bounds_cover_joint_positions() {
    let Rig { world, mesh, .. } = rig(WorldSettings::default());
    let bounds = world.skeleton_world_bounds(mesh).unwrap();
    assert!(bounds.min.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), EPSILON));
    assert!(bounds.max.abs_diff_eq(Vec3::new(0.0, 1.75, 0.0), EPSILON));
}

#[test]
fn destroying_a_joint_invalidates_skeleton() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    world.update_skeletals();
    world.destroy_entity(joints[2]);
    assert_eq!(world.update_skeletals(), 1);
}

#[test]
fn replacing_joints_clears_previous_flags() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    world.update_skeletal(mesh);
    assert_eq!(world.skeletal(mesh).unwrap().top_of_joints_hierarchy(), Some(joints[0]));

    let root = world.parent(joints[0]).unwrap();
    world
        .skeletal_mut(mesh)
        .unwrap()
        .set_joints(vec![joints[1], root, joints[0]]);
    world.update_skeletal(mesh);

    assert_eq!(world.skeletal(mesh).unwrap().top_of_joints_hierarchy(), Some(root));
    assert!(world.scene_graph(root).unwrap().is_root_joint());
    assert!(!world.scene_graph(joints[0]).unwrap().is_root_joint());
    assert!(world.scene_graph(joints[0]).unwrap().is_joint());
    assert!(!world.scene_graph(joints[2]).unwrap().is_joint());
}

#[test]
fn destroying_the_top_joint_resolves_a_live_one() {
    let Rig { mut world, mesh, joints } = rig(WorldSettings::default());
    world.update_skeletals();
    world.destroy_entity(joints[0]);
    assert_eq!(world.skeletal(mesh).unwrap().top_of_joints_hierarchy(), None);

    world.update_skeletals();
    assert_eq!(world.skeletal(mesh).unwrap().top_of_joints_hierarchy(), Some(joints[1]));
    assert!(world.scene_graph(joints[1]).unwrap().is_root_joint());
}
