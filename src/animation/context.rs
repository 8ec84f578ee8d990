use serde::{Deserialize, Serialize};

/// Animation state shared by every entity of a [`World`](crate::core::World).
///
/// Set by the render loop once per frame; all components sample against the
/// same instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationContext {
    /// Seconds since playback started.
    pub global_time: f32,
    /// Pauses (`Some(false)`) or forces (`Some(true)`) every component,
    /// overriding their own `is_animating` flag.
    pub global_animating: Option<bool>,
    /// Wraps the sample time into each track's keyed range.
    pub is_loop: bool,
}

impl AnimationContext {
    /// Whether a component whose own flag is `instance_animating` should be
    /// sampled this frame.
    #[inline]
    #[must_use]
    pub fn is_animating(&self, instance_animating: bool) -> bool {
        self.global_animating.unwrap_or(instance_animating)
    }

    /// Maps `time` into `[start, end]` when looping is enabled.
    #[must_use]
    pub fn resolve_time(&self, time: f32, start: f32, end: f32) -> f32 {
        let span = end - start;
        if self.is_loop && span > 0.0 {
            start + (time - start).rem_euclid(span)
        } else {
            time
        }
    }
}
