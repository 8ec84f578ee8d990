//! Secondary motion driven by simple physics.

pub mod collider;
pub mod spring_bone;

pub use collider::{ColliderGroup, SphereCollider, WorldSphere};
pub use spring_bone::{
    SpringBone, SpringBoneChain, SpringBoneDescriptor, SpringBoneParams, SpringBoneState, SpringBoneSystem,
};
