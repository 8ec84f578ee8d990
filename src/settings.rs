//! World Settings
//!
//! Per-world configuration for the transform / animation core.
//!
//! ```rust,ignore
//! use rhodonite::settings::WorldSettings;
//! use rhodonite::scene::skeleton::JointPacking;
//!
//! let settings = WorldSettings {
//!     joint_packing: JointPacking::Compressed,
//!     ..Default::default()
//! };
//! let world = World::with_settings(settings);
//! ```

use serde::{Deserialize, Serialize};

use crate::animation::sampler::SearchStrategy;
use crate::scene::skeleton::JointPacking;

/// Configuration owned by a [`World`](crate::core::World).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// When `false`, joint nodes contribute only their world position to a
    /// merged world AABB instead of their whole subtree.
    pub update_joint_aabb: bool,

    /// Layout of the per-joint skinning buffer handed to the renderer.
    pub joint_packing: JointPacking,

    /// Keyframe search used by animation sampling.
    pub search_strategy: SearchStrategy,

    /// Disables the spring-bone step of [`World::tick`](crate::core::World::tick).
    pub spring_bone_enabled: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            update_joint_aabb: true,
            joint_packing: JointPacking::Matrix,
            search_strategy: SearchStrategy::Auto,
            spring_bone_enabled: true,
        }
    }
}
