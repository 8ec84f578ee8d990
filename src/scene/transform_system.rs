//! Transform System
//!
//! Eager, top-down world-matrix refresh over the whole scene graph.
//!
//! [`World::world_matrix`] already recomputes lazily per read; renderers that
//! are about to read every node use [`update_world_matrices`] instead, which
//! visits each node once in parent-before-child order.
//!
//! # Level-order batches
//!
//! [`build_level_order_batches`] groups nodes by depth. Nodes of the same
//! level never depend on each other, so a caller may process one batch in
//! parallel as long as batches run in order and no transform writes happen
//! meanwhile.

use glam::Mat4;

use crate::core::{Entity, World};
use crate::scene::transform::TransformComponent;

/// Nodes grouped by depth. `batches[0]` holds the top-level nodes.
#[derive(Debug, Default)]
pub struct LevelOrderBatches {
    pub batches: Vec<Vec<Entity>>,
}

impl LevelOrderBatches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the batches, keeping their allocations.
    pub fn clear(&mut self) {
        for batch in &mut self.batches {
            batch.clear();
        }
    }

    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.batches.iter().filter(|b| !b.is_empty()).count()
    }
}

/// Fills `output` with the scene graph in BFS order, one batch per level.
pub fn build_level_order_batches(world: &World, output: &mut LevelOrderBatches) {
    output.clear();

    let mut level = 0;
    let mut current: Vec<Entity> = world.top_level_entities().to_vec();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &entity in &current {
            next.extend_from_slice(world.children(entity));
        }

        if level < output.batches.len() {
            output.batches[level].extend_from_slice(&current);
        } else {
            output.batches.push(current);
        }
        level += 1;
        current = next;
    }

    output.batches.truncate(level);
}

/// Refreshes every dirty world matrix, parents before children.
///
/// Returns the number of nodes whose world matrix was recomputed.
pub fn update_world_matrices(world: &World) -> usize {
    let mut updated = 0;
    // (node, parent world matrix, parent recomputed)
    let mut stack: Vec<(Entity, Mat4, bool)> = Vec::with_capacity(64);
    for &root in world.top_level_entities().iter().rev() {
        stack.push((root, Mat4::IDENTITY, false));
    }

    while let Some((entity, parent_world, parent_changed)) = stack.pop() {
        let Some(node) = world.nodes.get(entity) else {
            continue;
        };

        let needs_update = parent_changed || node.is_world_matrix_dirty();
        let current_world = if needs_update {
            let local = world
                .transforms
                .get(entity)
                .map_or(Mat4::IDENTITY, TransformComponent::matrix);
            let new_world = parent_world * local;
            node.store_world_matrix(new_world);
            updated += 1;
            new_world
        } else {
            node.cached_world_matrix()
        };

        for &child in node.children.iter().rev() {
            stack.push((child, current_world, needs_update));
        }
    }

    log::trace!("transform system refreshed {updated} world matrices");
    updated
}

/// Refreshes world matrices of one batch produced by
/// [`build_level_order_batches`]. Batches must be processed in order.
pub fn update_batch(world: &World, batch: &[Entity]) {
    for &entity in batch {
        // Parents were refreshed by the previous batch, so this only walks one level.
        let _ = world.world_matrix(entity);
    }
}
