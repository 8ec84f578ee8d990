#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod animation;
pub mod core;
pub mod errors;
pub mod physics;
pub mod scene;
pub mod settings;

pub use animation::{
    AnimationChannel, AnimationComponent, AnimationContext, AnimationPath, AnimationTrack, BlendShapeComponent,
    InterpolationMode, SearchStrategy,
};
pub use crate::core::{ComponentMask, ComponentType, Entity, World};
pub use errors::{Result, RhodoniteError};
pub use physics::{ColliderGroup, SphereCollider, SpringBone, SpringBoneChain, SpringBoneParams, SpringBoneSystem};
pub use scene::{
    BoundingBox, MeshComponent, Ray, RaycastHit, SceneGraphComponent, SkeletalComponent, TransformComponent,
    TransformParams,
};
pub use settings::WorldSettings;
