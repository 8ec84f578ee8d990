//! Error Types
//!
//! This module defines the error types used by the core.
//!
//! # Overview
//!
//! Per-frame operations (sampling, world-matrix reads, spring-bone steps)
//! never fail: they clamp, no-op or return `bool`/`Option`. [`RhodoniteError`]
//! is reserved for the importer boundary, where raw arrays and indices coming
//! from an asset file are turned into components.
//!
//! ```rust,ignore
//! use rhodonite::errors::Result;
//! use rhodonite::animation::{AnimationChannel, AnimationPath, InterpolationMode};
//!
//! fn import(times: Vec<f32>, values: Vec<f32>) -> Result<AnimationChannel> {
//!     AnimationChannel::new(AnimationPath::Translate, times, values, 3, InterpolationMode::Linear)
//! }
//! ```

use thiserror::Error;

use crate::core::{ComponentType, Entity};

/// The main error type for the Rhodonite core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RhodoniteError {
    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// The entity handle is stale or was never created.
    #[error("Entity not found: {0:?}")]
    EntityNotFound(Entity),

    /// The entity exists but lacks a component the operation requires.
    #[error("Entity {entity:?} has no {component:?} component")]
    MissingComponent {
        entity: Entity,
        component: ComponentType,
    },

    // ========================================================================
    // Animation Import Errors
    // ========================================================================
    /// A channel was built with no keyframes.
    #[error("Animation channel has no keyframes")]
    EmptyChannel,

    /// A channel was built with a component count of zero.
    #[error("Animation channel component count must be positive")]
    InvalidComponentCount,

    /// Keyframe times must never decrease.
    #[error("Keyframe times are not monotonic at index {index}")]
    NonMonotonicTimes { index: usize },

    /// Output array length does not match `keyframes * components (* 3 for cubic spline)`.
    #[error("Channel output length mismatch: expected {expected}, got {actual}")]
    OutputLengthMismatch { expected: usize, actual: usize },

    // ========================================================================
    // Skinning Errors
    // ========================================================================
    /// Inverse bind matrix count differs from the joint count.
    #[error("Inverse bind matrix count {matrices} does not match joint count {joints}")]
    JointCountMismatch { joints: usize, matrices: usize },

    // ========================================================================
    // Spring Bone Errors
    // ========================================================================
    /// A spring-bone chain references a collider group that does not exist.
    #[error("Collider group index out of bounds: {index} (groups: {len})")]
    ColliderGroupOutOfBounds { index: usize, len: usize },

    /// An imported descriptor references a node index past the node list.
    #[error("Node index out of bounds: {index} (nodes: {len})")]
    NodeIndexOutOfBounds { index: usize, len: usize },
}

/// Alias for `Result<T, RhodoniteError>`.
pub type Result<T> = std::result::Result<T, RhodoniteError>;
