use std::collections::BTreeSet;

use crate::animation::component::{AnimationSample, RestPose};
use crate::core::{Entity, World};
use crate::scene::transform::TransformParams;

/// Samples every animating entity at the world's current animation time and
/// writes the results into its transform and blend shapes.
///
/// Animation components are temporarily taken out of the world so transform
/// writes can go through [`World::transform_mut`].
///
/// Returns the number of entities sampled.
pub fn update_animations(world: &mut World) -> usize {
    let animations = std::mem::take(&mut world.animations);
    let strategy = world.settings.search_strategy;

    let mut sampled = 0;
    for (entity, animation) in &animations {
        if !world.animation.is_animating(animation.is_animating) {
            continue;
        }
        let Some(sample) = animation.sample(&world.animation, strategy) else {
            continue;
        };
        apply_sample(world, entity, &sample);
        sampled += 1;
    }

    world.animations = animations;
    log::trace!("animation system sampled {sampled} entities");
    sampled
}

fn apply_sample(world: &mut World, entity: Entity, sample: &AnimationSample) {
    let params = TransformParams {
        translate: sample.translate,
        quaternion: sample.quaternion,
        scale: sample.scale,
        ..Default::default()
    };
    if let Some(mut transform) = world.transform_mut(entity) {
        transform.set_transform(params);
    }

    if let Some(weights) = &sample.weights
        && let Some(blend_shape) = world.blend_shapes.get_mut(entity)
    {
        blend_shape.set_weights(weights);
    }
}

fn apply_rest_pose(world: &mut World, entity: Entity, pose: RestPose) {
    if let Some(mut transform) = world.transform_mut(entity) {
        transform.set_transform(TransformParams {
            translate: Some(pose.translate),
            quaternion: Some(pose.quaternion),
            scale: Some(pose.scale),
            ..Default::default()
        });
    }
}

impl World {
    /// Starts (or switches) the entity's active track.
    ///
    /// The rest pose restored by [`World::set_animation_to_rest`] is the one
    /// captured by [`World::add_animation`]; it is never re-captured here.
    pub fn set_active_animation_track(&mut self, entity: Entity, name: &str) -> bool {
        let Some(animation) = self.animations.get_mut(entity) else {
            log::debug!("set_active_animation_track: {entity:?} has no animation component");
            return false;
        };
        if animation.track(name).is_none() {
            log::debug!("set_active_animation_track: {entity:?} has no track '{name}'");
            return false;
        }
        animation.set_active_animation_track(name)
    }

    /// Stops animating the entity and restores its backed-up rest pose.
    pub fn set_animation_to_rest(&mut self, entity: Entity) -> bool {
        let Some(animation) = self.animations.get_mut(entity) else {
            return false;
        };
        if let Some(pose) = animation.set_animation_to_rest() {
            apply_rest_pose(self, entity, pose);
        }
        true
    }

    /// Sorted, de-duplicated names of every track on every entity.
    #[must_use]
    pub fn animation_track_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .animations
            .values()
            .flat_map(|animation| animation.track_names())
            .collect();
        names.into_iter().map(str::to_string).collect()
    }
}
