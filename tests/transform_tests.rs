//! TransformComponent and TransformSystem tests
//!
//! Tests for:
//! - TRS setters, lazy getters and the update counter
//! - Matrix decomposition round-trip
//! - set_transform precedence
//! - look_at orientation
//! - Eager world-matrix refresh and level-order batching

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use glam::{EulerRot, Mat4, Quat, Vec3};
use rhodonite::core::World;
use rhodonite::scene::transform::{EULER_ORDER, TransformComponent, TransformParams};
use rhodonite::scene::transform_system::{
    LevelOrderBatches, build_level_order_batches, update_batch, update_world_matrices,
};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

fn quat_approx(a: Quat, b: Quat) -> bool {
    // q and -q are the same rotation
    a.dot(b).abs() > 1.0 - EPSILON
}

// ============================================================================
// TransformComponent
// ============================================================================

#[test]
fn transform_default_is_identity() {
    let t = TransformComponent::new();
    assert_eq!(t.translate(), Vec3::ZERO);
    assert_eq!(t.quaternion(), Quat::IDENTITY);
    assert_eq!(t.scale(), Vec3::ONE);
    assert_eq!(t.matrix(), Mat4::IDENTITY);
    assert_eq!(t.update_count(), 0);
}

#[test]
fn every_setter_bumps_update_count() {
    let mut t = TransformComponent::new();
    t.set_translate(Vec3::X);
    t.set_scale(Vec3::splat(2.0));
    t.set_rotation(Vec3::new(0.1, 0.2, 0.3));
    t.set_quaternion(Quat::from_rotation_z(0.5));
    t.set_matrix(Mat4::IDENTITY);
    assert_eq!(t.update_count(), 5);

    // Reads never bump it
    let _ = t.matrix();
    let _ = t.translate();
    assert_eq!(t.update_count(), 5);
}

#[test]
fn matrix_is_translate_rotate_scale() {
    let translate = Vec3::new(1.0, 2.0, 3.0);
    let rotation = Quat::from_rotation_y(FRAC_PI_2);
    let scale = Vec3::new(2.0, 3.0, 4.0);
    let t = TransformComponent::from_trs(translate, rotation, scale);

    let expected = Mat4::from_translation(translate) * Mat4::from_quat(rotation) * Mat4::from_scale(scale);
    assert!(t.matrix().abs_diff_eq(expected, EPSILON));
}

#[test]
fn trs_round_trip_through_matrix() {
    let mut source = TransformComponent::new();
    source.set_translate(Vec3::new(-4.0, 0.5, 9.0));
    source.set_quaternion(Quat::from_euler(EulerRot::XYZ, 0.3, -1.2, 0.7));
    source.set_scale(Vec3::new(1.5, 0.5, 2.0));

    let decomposed = TransformComponent::from_matrix(source.matrix());
    assert!(vec3_approx(decomposed.translate(), source.translate()));
    assert!(vec3_approx(decomposed.scale(), source.scale()));
    assert!(quat_approx(decomposed.quaternion(), source.quaternion()));
}

#[test]
fn euler_and_quaternion_stay_in_sync() {
    let mut t = TransformComponent::new();
    let euler = Vec3::new(0.2, -0.4, 0.9);
    t.set_rotation(euler);

    let expected = Quat::from_euler(EULER_ORDER, euler.x, euler.y, euler.z);
    assert!(quat_approx(t.quaternion(), expected));

    t.set_quaternion(Quat::from_rotation_x(FRAC_PI_4));
    assert!(vec3_approx(t.rotation(), Vec3::new(FRAC_PI_4, 0.0, 0.0)));
}

#[test]
fn set_translate_after_matrix_keeps_matrix_rotation_and_scale() {
    let rotation = Quat::from_rotation_z(FRAC_PI_2);
    let mut t = TransformComponent::from_matrix(Mat4::from_scale_rotation_translation(
        Vec3::splat(3.0),
        rotation,
        Vec3::ZERO,
    ));
    t.set_translate(Vec3::new(0.0, 5.0, 0.0));

    assert!(vec3_approx(t.scale(), Vec3::splat(3.0)));
    assert!(quat_approx(t.quaternion(), rotation));
    assert!(vec3_approx(t.matrix().w_axis.truncate(), Vec3::new(0.0, 5.0, 0.0)));
}

#[test]
fn set_transform_with_matrix_trusts_supplied_fields() {
    let mut t = TransformComponent::new();
    let matrix = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
    // Deliberately contradictory: the caller contract is not validated.
    t.set_transform(TransformParams {
        matrix: Some(matrix),
        translate: Some(Vec3::new(7.0, 7.0, 7.0)),
        ..Default::default()
    });
    assert_eq!(t.matrix(), matrix);
    assert_eq!(t.translate(), Vec3::new(7.0, 7.0, 7.0));
    assert_eq!(t.update_count(), 1);
}

#[test]
fn set_transform_quaternion_wins_over_euler() {
    let mut t = TransformComponent::new();
    let q = Quat::from_rotation_y(0.5);
    t.set_transform(TransformParams {
        quaternion: Some(q),
        translate: Some(Vec3::X),
        ..Default::default()
    });
    assert!(quat_approx(t.quaternion(), q));
    assert!(vec3_approx(t.rotation(), Vec3::new(0.0, 0.5, 0.0)));
    assert_eq!(t.translate(), Vec3::X);
    // Scale untouched
    assert_eq!(t.scale(), Vec3::ONE);
}

#[test]
fn inverse_and_normal_matrices() {
    let t = TransformComponent::from_trs(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_x(0.3), Vec3::new(1.0, 2.0, 4.0));
    assert!((t.matrix() * t.inverse_matrix()).abs_diff_eq(Mat4::IDENTITY, EPSILON));

    let expected = glam::Mat3::from_mat4(t.matrix()).inverse().transpose();
    assert!(t.normal_matrix().abs_diff_eq(expected, EPSILON));
}

#[test]
fn look_at_points_negative_z_at_target() {
    let mut t = TransformComponent::new();
    t.set_translate(Vec3::new(0.0, 0.0, 5.0));
    t.look_at(Vec3::ZERO, Vec3::Y);
    let forward = t.quaternion() * Vec3::NEG_Z;
    assert!(vec3_approx(forward, Vec3::NEG_Z));

    t.look_at(Vec3::new(5.0, 0.0, 5.0), Vec3::Y);
    let forward = t.quaternion() * Vec3::NEG_Z;
    assert!(vec3_approx(forward, Vec3::X));
}

// ============================================================================
// TransformSystem
// ============================================================================

fn chain(world: &mut World, depth: usize) -> Vec<rhodonite::Entity> {
    let mut nodes = Vec::new();
    for i in 0..depth {
        let node = world.create_node();
        world.transform_mut(node).unwrap().set_translate(Vec3::new(1.0, 0.0, 0.0));
        if i > 0 {
            assert!(world.add_child(nodes[i - 1], node));
        }
        nodes.push(node);
    }
    nodes
}

#[test]
fn eager_update_visits_each_dirty_node_once() {
    let mut world = World::new();
    let nodes = chain(&mut world, 4);

    assert_eq!(update_world_matrices(&world), 4);
    assert_eq!(update_world_matrices(&world), 0);

    let leaf = nodes[3];
    assert!(!world.scene_graph(leaf).unwrap().is_world_matrix_dirty());
    assert!(vec3_approx(world.world_position(leaf).unwrap(), Vec3::new(4.0, 0.0, 0.0)));

    // Touching the middle only refreshes its subtree
    world.transform_mut(nodes[2]).unwrap().set_translate(Vec3::new(0.0, 1.0, 0.0));
    assert_eq!(update_world_matrices(&world), 2);
    assert!(vec3_approx(world.world_position(leaf).unwrap(), Vec3::new(3.0, 1.0, 0.0)));
}

#[test]
fn level_order_batches_group_by_depth() {
    let mut world = World::new();
    let root = world.create_node();
    let a = world.create_node();
    let b = world.create_node();
    let c = world.create_node();
    world.add_child(root, a);
    world.add_child(root, b);
    world.add_child(a, c);
    let other_root = world.create_node();

    let mut batches = LevelOrderBatches::new();
    build_level_order_batches(&world, &mut batches);

    assert_eq!(batches.depth(), 3);
    assert_eq!(batches.total_nodes(), 5);
    assert_eq!(batches.batches[0], vec![root, other_root]);
    assert_eq!(batches.batches[1], vec![a, b]);
    assert_eq!(batches.batches[2], vec![c]);

    for batch in &batches.batches {
        update_batch(&world, batch);
    }
    assert!(!world.scene_graph(c).unwrap().is_world_matrix_dirty());

    // Rebuilding reuses the allocation and drops stale levels
    world.remove_child(a, c);
    build_level_order_batches(&world, &mut batches);
    assert_eq!(batches.depth(), 2);
    assert_eq!(batches.total_nodes(), 5);
}
