//! Entity / Component Registry
//!
//! An [`Entity`] is an opaque slotmap key. Components live in per-type
//! secondary maps owned by [`World`]; which of them an entity carries is
//! tracked by a [`ComponentMask`], so capability queries ("does this entity
//! have a skeleton?") never touch the component storage itself.

pub mod world;

pub use world::World;

use bitflags::bitflags;
use slotmap::new_key_type;

new_key_type! {
    /// Stable handle of an entity inside a [`World`].
    pub struct Entity;
}

/// The component kinds an entity can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Transform,
    SceneGraph,
    Mesh,
    Animation,
    BlendShape,
    Skeletal,
}

impl ComponentType {
    pub const ALL: [ComponentType; 6] = [
        ComponentType::Transform,
        ComponentType::SceneGraph,
        ComponentType::Mesh,
        ComponentType::Animation,
        ComponentType::BlendShape,
        ComponentType::Skeletal,
    ];

    #[inline]
    #[must_use]
    pub fn mask(self) -> ComponentMask {
        match self {
            ComponentType::Transform => ComponentMask::TRANSFORM,
            ComponentType::SceneGraph => ComponentMask::SCENE_GRAPH,
            ComponentType::Mesh => ComponentMask::MESH,
            ComponentType::Animation => ComponentMask::ANIMATION,
            ComponentType::BlendShape => ComponentMask::BLEND_SHAPE,
            ComponentType::Skeletal => ComponentMask::SKELETAL,
        }
    }
}

bitflags! {
    /// Set of capabilities registered on an entity.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ComponentMask: u32 {
        const TRANSFORM   = 1 << 0;
        const SCENE_GRAPH = 1 << 1;
        const MESH        = 1 << 2;
        const ANIMATION   = 1 << 3;
        const BLEND_SHAPE = 1 << 4;
        const SKELETAL    = 1 << 5;
    }
}

impl ComponentMask {
    /// Iterates the component types contained in this mask.
    pub fn types(self) -> impl Iterator<Item = ComponentType> {
        ComponentType::ALL
            .into_iter()
            .filter(move |ty| self.contains(ty.mask()))
    }
}
