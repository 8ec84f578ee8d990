use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, RhodoniteError};

/// Two keyframe times closer than this are the same keyframe.
pub const KEYFRAME_TIME_EPSILON: f32 = 1e-6;

/// Attribute driven by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationPath {
    Translate,
    Quaternion,
    Scale,
    /// Blend-shape weights, routed to the entity's blend-shape component.
    Weights,
}

impl AnimationPath {
    /// Fixed component count of the path, `None` for weights.
    #[must_use]
    pub fn component_count(self) -> Option<usize> {
        match self {
            AnimationPath::Translate | AnimationPath::Scale => Some(3),
            AnimationPath::Quaternion => Some(4),
            AnimationPath::Weights => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InterpolationMode {
    Step,
    /// Lerp; quaternion channels slerp.
    #[default]
    Linear,
    /// Hermite spline. Output holds `[in_tangent, value, out_tangent]` per key.
    CubicSpline,
    /// Spherical interpolation of 4-component values.
    Slerp,
}

/// One attribute's keyframe timeline.
///
/// `input` holds non-decreasing keyframe times. `output` holds
/// `component_count` floats per key, or three times that for cubic spline.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    path: AnimationPath,
    input: Vec<f32>,
    output: Vec<f32>,
    component_count: usize,
    interpolation: InterpolationMode,
}

impl AnimationChannel {
    /// Builds a channel from importer arrays.
    pub fn new(
        path: AnimationPath,
        input: Vec<f32>,
        output: Vec<f32>,
        component_count: usize,
        interpolation: InterpolationMode,
    ) -> Result<Self> {
        if component_count == 0 {
            return Err(RhodoniteError::InvalidComponentCount);
        }
        if path
            .component_count()
            .is_some_and(|expected| expected != component_count)
        {
            return Err(RhodoniteError::InvalidComponentCount);
        }
        if input.is_empty() {
            return Err(RhodoniteError::EmptyChannel);
        }
        if let Some(index) = input.windows(2).position(|w| {
            !matches!(
                w[0].partial_cmp(&w[1]),
                Some(Ordering::Less | Ordering::Equal)
            )
        }) {
            return Err(RhodoniteError::NonMonotonicTimes { index: index + 1 });
        }

        let expected = input.len() * component_count * stride(interpolation);
        if output.len() != expected {
            return Err(RhodoniteError::OutputLengthMismatch {
                expected,
                actual: output.len(),
            });
        }

        Ok(Self {
            path,
            input,
            output,
            component_count,
            interpolation,
        })
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> AnimationPath {
        self.path
    }

    #[inline]
    #[must_use]
    pub fn input(&self) -> &[f32] {
        &self.input
    }

    #[inline]
    #[must_use]
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    #[inline]
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    #[inline]
    #[must_use]
    pub fn interpolation(&self) -> InterpolationMode {
        self.interpolation
    }

    #[inline]
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.input.len()
    }

    #[must_use]
    pub fn start_time(&self) -> Option<f32> {
        self.input.first().copied()
    }

    #[must_use]
    pub fn end_time(&self) -> Option<f32> {
        self.input.last().copied()
    }

    #[inline]
    fn key_stride(&self) -> usize {
        self.component_count * stride(self.interpolation)
    }

    /// Value of key `index` (the middle element for cubic spline).
    #[must_use]
    pub fn value(&self, index: usize) -> &[f32] {
        let cc = self.component_count;
        let base = index * self.key_stride();
        match self.interpolation {
            InterpolationMode::CubicSpline => &self.output[base + cc..base + 2 * cc],
            _ => &self.output[base..base + cc],
        }
    }

    /// In-tangent of key `index`. Cubic spline only.
    pub(crate) fn in_tangent(&self, index: usize) -> &[f32] {
        let base = index * self.key_stride();
        &self.output[base..base + self.component_count]
    }

    /// Out-tangent of key `index`. Cubic spline only.
    pub(crate) fn out_tangent(&self, index: usize) -> &[f32] {
        let cc = self.component_count;
        let base = index * self.key_stride();
        &self.output[base + 2 * cc..base + 3 * cc]
    }

    /// Index of the key at `time`, within [`KEYFRAME_TIME_EPSILON`].
    #[must_use]
    pub fn key_index_at(&self, time: f32) -> Option<usize> {
        let next = self.input.partition_point(|&t| t < time - KEYFRAME_TIME_EPSILON);
        self.input
            .get(next)
            .filter(|&&t| (t - time).abs() <= KEYFRAME_TIME_EPSILON)
            .map(|_| next)
    }

    /// Writes `value` at `time`, overwriting an existing key there or
    /// inserting a new one in sorted position. Cubic-spline keys get zero
    /// tangents. Returns `false` if `value` has the wrong length.
    pub fn insert_key(&mut self, time: f32, value: &[f32]) -> bool {
        if value.len() != self.component_count || !time.is_finite() {
            return false;
        }

        let cc = self.component_count;
        let key_stride = self.key_stride();
        let value_offset = match self.interpolation {
            InterpolationMode::CubicSpline => cc,
            _ => 0,
        };

        if let Some(index) = self.key_index_at(time) {
            let base = index * key_stride + value_offset;
            self.output[base..base + cc].copy_from_slice(value);
            return true;
        }

        let index = self.input.partition_point(|&t| t < time);
        self.input.insert(index, time);

        let mut key = vec![0.0; key_stride];
        key[value_offset..value_offset + cc].copy_from_slice(value);
        let at = index * key_stride;
        self.output.splice(at..at, key);
        true
    }

    /// Removes key `index`. Returns the removed time.
    pub fn remove_key(&mut self, index: usize) -> Option<f32> {
        if index >= self.input.len() {
            return None;
        }
        let key_stride = self.key_stride();
        let at = index * key_stride;
        self.output.drain(at..at + key_stride);
        Some(self.input.remove(index))
    }
}

#[inline]
fn stride(interpolation: InterpolationMode) -> usize {
    match interpolation {
        InterpolationMode::CubicSpline => 3,
        _ => 1,
    }
}

/// A named bundle of channels for one entity, at most one per path.
#[derive(Debug, Clone, Default)]
pub struct AnimationTrack {
    pub name: String,
    channels: FxHashMap<AnimationPath, AnimationChannel>,
}

impl AnimationTrack {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            channels: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: AnimationChannel) -> Self {
        self.insert_channel(channel);
        self
    }

    /// Adds a channel, replacing any existing channel for the same path.
    pub fn insert_channel(&mut self, channel: AnimationChannel) -> Option<AnimationChannel> {
        self.channels.insert(channel.path, channel)
    }

    pub fn remove_channel(&mut self, path: AnimationPath) -> Option<AnimationChannel> {
        self.channels.remove(&path)
    }

    #[must_use]
    pub fn channel(&self, path: AnimationPath) -> Option<&AnimationChannel> {
        self.channels.get(&path)
    }

    pub fn channel_mut(&mut self, path: AnimationPath) -> Option<&mut AnimationChannel> {
        self.channels.get_mut(&path)
    }

    pub fn channels(&self) -> impl Iterator<Item = &AnimationChannel> {
        self.channels.values()
    }

    /// Earliest keyframe time across all channels.
    #[must_use]
    pub fn start_input_value(&self) -> Option<f32> {
        self.channels
            .values()
            .filter_map(AnimationChannel::start_time)
            .reduce(f32::min)
    }

    /// Latest keyframe time across all channels.
    #[must_use]
    pub fn end_input_value(&self) -> Option<f32> {
        self.channels
            .values()
            .filter_map(AnimationChannel::end_time)
            .reduce(f32::max)
    }
}
