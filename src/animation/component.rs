use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;

use crate::animation::channel::{AnimationChannel, AnimationPath, AnimationTrack, InterpolationMode};
use crate::animation::context::AnimationContext;
use crate::animation::sampler::{SampledValue, SearchStrategy, interpolate};
use crate::scene::transform::TransformComponent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    /// No active track; the transform holds the rest pose.
    Resting,
    /// An active track is sampled every frame.
    Animating,
}

/// Local transform captured before animation takes over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestPose {
    pub translate: Vec3,
    pub quaternion: Quat,
    pub scale: Vec3,
}

impl RestPose {
    #[must_use]
    pub fn from_transform(transform: &TransformComponent) -> Self {
        Self {
            translate: transform.translate(),
            quaternion: transform.quaternion(),
            scale: transform.scale(),
        }
    }
}

/// One frame's sampled values. Paths without a channel stay `None` and leave
/// the target untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationSample {
    pub translate: Option<Vec3>,
    pub quaternion: Option<Quat>,
    pub scale: Option<Vec3>,
    pub weights: Option<SampledValue>,
}

impl AnimationSample {
    fn from_track(track: &AnimationTrack, time: f32, strategy: SearchStrategy) -> Self {
        let sample = |path| {
            track
                .channel(path)
                .and_then(|channel| interpolate(channel, time, strategy))
        };
        Self {
            translate: sample(AnimationPath::Translate).map(|v| Vec3::from_slice(&v)),
            quaternion: sample(AnimationPath::Quaternion).map(|v| Quat::from_slice(&v).normalize()),
            scale: sample(AnimationPath::Scale).map(|v| Vec3::from_slice(&v)),
            weights: sample(AnimationPath::Weights),
        }
    }

    /// Blends toward `other` by `ratio`: lerp for vectors and weights, slerp
    /// for rotation. A path present on one side only keeps that side's value.
    #[must_use]
    pub fn blend(self, other: &AnimationSample, ratio: f32) -> Self {
        fn mix<T: Copy>(a: Option<T>, b: Option<T>, f: impl Fn(T, T) -> T) -> Option<T> {
            match (a, b) {
                (Some(a), Some(b)) => Some(f(a, b)),
                (a, b) => a.or(b),
            }
        }

        let weights = match (self.weights, &other.weights) {
            (Some(a), Some(b)) if a.len() == b.len() => {
                Some(a.iter().zip(b).map(|(&x, &y)| x + (y - x) * ratio).collect())
            }
            (a, b) => a.or_else(|| b.clone()),
        };

        Self {
            translate: mix(self.translate, other.translate, |a, b| a.lerp(b, ratio)),
            quaternion: mix(self.quaternion, other.quaternion, |a, b| a.slerp(b, ratio)),
            scale: mix(self.scale, other.scale, |a, b| a.lerp(b, ratio)),
            weights,
        }
    }
}

/// Per-entity animation orchestrator.
///
/// Owns the entity's named tracks and selects which one drives the transform.
/// Sampling itself is done by [`update_animations`](crate::animation::system::update_animations).
#[derive(Debug, Clone)]
pub struct AnimationComponent {
    tracks: FxHashMap<String, AnimationTrack>,
    active_track: Option<String>,
    second_active_track: Option<String>,

    /// Weight of the second active track, `0.0` = first track only.
    pub animation_blending_ratio: f32,
    /// Per-instance switch, overridden by [`AnimationContext::global_animating`].
    pub is_animating: bool,
    /// Sample at the context's global time instead of [`local_time`](Self::local_time).
    pub use_global_time: bool,
    pub local_time: f32,

    rest_pose: Option<RestPose>,
}

impl Default for AnimationComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationComponent {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracks: FxHashMap::default(),
            active_track: None,
            second_active_track: None,
            animation_blending_ratio: 0.0,
            is_animating: true,
            use_global_time: true,
            local_time: 0.0,
            rest_pose: None,
        }
    }

    #[must_use]
    pub fn with_track(mut self, track: AnimationTrack) -> Self {
        self.add_track(track);
        self
    }

    /// Adds a track, replacing any track with the same name.
    pub fn add_track(&mut self, track: AnimationTrack) -> Option<AnimationTrack> {
        self.tracks.insert(track.name.clone(), track)
    }

    /// Removes a track. Removing the active track returns to resting.
    pub fn remove_track(&mut self, name: &str) -> Option<AnimationTrack> {
        let track = self.tracks.remove(name)?;
        if self.active_track.as_deref() == Some(name) {
            self.active_track = None;
        }
        if self.second_active_track.as_deref() == Some(name) {
            self.second_active_track = None;
        }
        Some(track)
    }

    #[must_use]
    pub fn track(&self, name: &str) -> Option<&AnimationTrack> {
        self.tracks.get(name)
    }

    pub fn track_mut(&mut self, name: &str) -> Option<&mut AnimationTrack> {
        self.tracks.get_mut(name)
    }

    pub fn track_names(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }

    // ========================================================================
    // State Machine
    // ========================================================================

    #[must_use]
    pub fn state(&self) -> AnimationState {
        if self.active_track.is_some() {
            AnimationState::Animating
        } else {
            AnimationState::Resting
        }
    }

    #[must_use]
    pub fn active_track(&self) -> Option<&str> {
        self.active_track.as_deref()
    }

    /// Selects the track sampled each frame. Returns `false` and changes
    /// nothing if no track has that name.
    pub fn set_active_animation_track(&mut self, name: &str) -> bool {
        if !self.tracks.contains_key(name) {
            log::debug!("Unknown animation track '{name}'");
            return false;
        }
        self.active_track = Some(name.to_string());
        true
    }

    #[must_use]
    pub fn second_active_track(&self) -> Option<&str> {
        self.second_active_track.as_deref()
    }

    /// Selects the track blended in by [`animation_blending_ratio`](Self::animation_blending_ratio).
    pub fn set_second_active_animation_track(&mut self, name: Option<&str>) -> bool {
        match name {
            Some(name) if !self.tracks.contains_key(name) => {
                log::debug!("Unknown animation track '{name}'");
                false
            }
            _ => {
                self.second_active_track = name.map(str::to_string);
                true
            }
        }
    }

    /// Leaves the animating state and returns the pose the transform must be
    /// restored to. See [`World::set_animation_to_rest`](crate::core::World::set_animation_to_rest).
    pub fn set_animation_to_rest(&mut self) -> Option<RestPose> {
        self.active_track = None;
        self.second_active_track = None;
        self.rest_pose
    }

    #[must_use]
    pub fn rest_pose(&self) -> Option<RestPose> {
        self.rest_pose
    }

    pub(crate) fn backup_rest_pose(&mut self, transform: &TransformComponent) {
        self.rest_pose = Some(RestPose::from_transform(transform));
    }

    /// Keyed range of the active track.
    #[must_use]
    pub fn start_input_value(&self) -> Option<f32> {
        self.tracks.get(self.active_track.as_deref()?)?.start_input_value()
    }

    #[must_use]
    pub fn end_input_value(&self) -> Option<f32> {
        self.tracks.get(self.active_track.as_deref()?)?.end_input_value()
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    fn sample_time(&self, ctx: &AnimationContext, track: &AnimationTrack) -> f32 {
        let time = if self.use_global_time {
            ctx.global_time
        } else {
            self.local_time
        };
        match (track.start_input_value(), track.end_input_value()) {
            (Some(start), Some(end)) => ctx.resolve_time(time, start, end),
            _ => time,
        }
    }

    /// Samples the active track (blended with the second one, if any).
    /// `None` while resting.
    #[must_use]
    pub fn sample(&self, ctx: &AnimationContext, strategy: SearchStrategy) -> Option<AnimationSample> {
        let track = self.tracks.get(self.active_track.as_deref()?)?;
        let sample = AnimationSample::from_track(track, self.sample_time(ctx, track), strategy);

        let second = self
            .second_active_track
            .as_deref()
            .and_then(|name| self.tracks.get(name))
            .filter(|_| self.animation_blending_ratio > 0.0);

        Some(match second {
            Some(second) => {
                let other = AnimationSample::from_track(second, self.sample_time(ctx, second), strategy);
                sample.blend(&other, self.animation_blending_ratio)
            }
            None => sample,
        })
    }

    // ========================================================================
    // Keyframe Authoring
    // ========================================================================

    fn frame_time(frame: u32, fps: f32) -> Option<f32> {
        (fps > 0.0).then(|| frame as f32 / fps)
    }

    /// Keys the channel's current value at `frame`. Fails if the channel does
    /// not exist or a key is already there.
    pub fn add_key_frame(&mut self, track: &str, path: AnimationPath, frame: u32, fps: f32) -> bool {
        let Some(time) = Self::frame_time(frame, fps) else {
            return false;
        };
        let Some(channel) = self.tracks.get_mut(track).and_then(|t| t.channel_mut(path)) else {
            log::debug!("add_key_frame: no {path:?} channel in track '{track}'");
            return false;
        };
        if channel.key_index_at(time).is_some() {
            return false;
        }
        let Some(value) = interpolate(channel, time, SearchStrategy::Binary) else {
            return false;
        };
        channel.insert_key(time, &value)
    }

    /// Keys `value` at `frame`, overwriting an existing key. Missing tracks
    /// and channels are created (linear interpolation).
    pub fn add_key_frame_with_value(
        &mut self,
        track: &str,
        path: AnimationPath,
        frame: u32,
        fps: f32,
        value: &[f32],
    ) -> bool {
        let Some(time) = Self::frame_time(frame, fps) else {
            return false;
        };
        if let Some(channel) = self.tracks.get_mut(track).and_then(|t| t.channel_mut(path)) {
            return channel.insert_key(time, value);
        }

        let channel = match AnimationChannel::new(
            path,
            vec![time],
            value.to_vec(),
            value.len(),
            InterpolationMode::Linear,
        ) {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("add_key_frame_with_value: {e}");
                return false;
            }
        };
        self.tracks
            .entry(track.to_string())
            .or_insert_with(|| AnimationTrack::new(track))
            .insert_channel(channel);
        true
    }

    /// Removes the key at `frame`. A channel left without keys is removed.
    pub fn delete_keys_at_frame(&mut self, track: &str, path: AnimationPath, frame: u32, fps: f32) -> bool {
        let Some(time) = Self::frame_time(frame, fps) else {
            return false;
        };
        let Some(track) = self.tracks.get_mut(track) else {
            return false;
        };
        let Some(channel) = track.channel_mut(path) else {
            return false;
        };
        let Some(index) = channel.key_index_at(time) else {
            return false;
        };
        channel.remove_key(index);
        if channel.key_count() == 0 {
            track.remove_channel(path);
        }
        true
    }

    #[must_use]
    pub fn has_key_frames_at_frame(&self, track: &str, path: AnimationPath, frame: u32, fps: f32) -> bool {
        Self::frame_time(frame, fps).is_some_and(|time| {
            self.tracks
                .get(track)
                .and_then(|t| t.channel(path))
                .and_then(|c| c.key_index_at(time))
                .is_some()
        })
    }
}
