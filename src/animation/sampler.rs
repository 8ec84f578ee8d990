//! Keyframe sampling.
//!
//! Every search returns the largest index `i` with `times[i] <= t`, clamped
//! to `0` below the first key (or for NaN) and to `len - 1` at or past the
//! last. `times` must be sorted.

use glam::{Quat, Vec4};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::animation::channel::{AnimationChannel, AnimationPath, InterpolationMode};

/// Arrays up to this length are scanned linearly under [`SearchStrategy::Auto`].
const AUTO_BRUTE_FORCE_LIMIT: usize = 8;

/// Keyframe search algorithm. All strategies return the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Linear scan for short timelines, binary search otherwise.
    #[default]
    Auto,
    Binary,
    /// Suited to long, roughly uniformly spaced timelines.
    Interpolation,
    BruteForce,
}

/// Sampled channel value; up to four components stay inline.
pub type SampledValue = SmallVec<[f32; 4]>;

#[must_use]
pub fn binary_search(times: &[f32], t: f32) -> usize {
    times.partition_point(|&x| x <= t).saturating_sub(1)
}

#[must_use]
pub fn interpolation_search(times: &[f32], t: f32) -> usize {
    let len = times.len();
    if len == 0 || t.is_nan() || t < times[0] {
        return 0;
    }
    if t >= times[len - 1] {
        return len - 1;
    }

    // times[lo] <= t < times[hi]
    let (mut lo, mut hi) = (0, len - 1);
    while hi - lo > 1 {
        let span = times[hi] - times[lo];
        let fraction = if span > 0.0 { (t - times[lo]) / span } else { 0.0 };
        let estimate = lo + (fraction * (hi - lo) as f32) as usize;
        let pos = estimate.clamp(lo, hi - 1);

        if times[pos] <= t {
            if t < times[pos + 1] {
                return pos;
            }
            lo = pos + 1;
        } else {
            hi = pos;
        }
    }
    lo
}

#[must_use]
pub fn brute_force_search(times: &[f32], t: f32) -> usize {
    times
        .iter()
        .take_while(|&&x| x <= t)
        .count()
        .saturating_sub(1)
}

#[must_use]
pub fn search(times: &[f32], t: f32, strategy: SearchStrategy) -> usize {
    match strategy {
        SearchStrategy::Auto if times.len() <= AUTO_BRUTE_FORCE_LIMIT => {
            brute_force_search(times, t)
        }
        SearchStrategy::Auto | SearchStrategy::Binary => binary_search(times, t),
        SearchStrategy::Interpolation => interpolation_search(times, t),
        SearchStrategy::BruteForce => brute_force_search(times, t),
    }
}

/// Hermite spline between `p0` and `p1` with tangents `m0`, `m1` scaled by
/// the key interval `delta`. Returns `p0` at `t = 0` and `p1` at `t = 1`.
#[must_use]
pub fn cubic_spline(p0: f32, p1: f32, m0: f32, m1: f32, t: f32, delta: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let s2 = -2.0 * t3 + 3.0 * t2;
    let s3 = t3 - t2;
    let s0 = 1.0 - s2;
    let s1 = s3 - t2 + t;

    s0 * p0 + s1 * (m0 * delta) + s2 * p1 + s3 * (m1 * delta)
}

/// Samples `channel` at `time`, holding the first or last value outside the
/// keyed range. Returns `None` for a channel without keys.
#[must_use]
pub fn interpolate(channel: &AnimationChannel, time: f32, strategy: SearchStrategy) -> Option<SampledValue> {
    let len = channel.key_count();
    if len == 0 {
        return None;
    }

    let times = channel.input();
    if len == 1 || time.is_nan() || time <= times[0] {
        return Some(SampledValue::from_slice(channel.value(0)));
    }
    if time >= times[len - 1] {
        return Some(SampledValue::from_slice(channel.value(len - 1)));
    }

    let i = search(times, time, strategy).min(len - 2);
    let (t0, t1) = (times[i], times[i + 1]);
    let delta = t1 - t0;
    let v0 = channel.value(i);
    let v1 = channel.value(i + 1);
    // Duplicate times form a jump; hold the later key
    if delta <= 0.0 {
        return Some(SampledValue::from_slice(v1));
    }
    let u = ((time - t0) / delta).clamp(0.0, 1.0);
    let is_quaternion = channel.component_count() == 4;

    let value = match channel.interpolation() {
        InterpolationMode::Step => SampledValue::from_slice(v0),
        InterpolationMode::Linear if channel.path() == AnimationPath::Quaternion => slerp(v0, v1, u),
        InterpolationMode::Slerp if is_quaternion => slerp(v0, v1, u),
        InterpolationMode::Linear | InterpolationMode::Slerp => {
            v0.iter().zip(v1).map(|(&a, &b)| a + (b - a) * u).collect()
        }
        InterpolationMode::CubicSpline => {
            let m0 = channel.out_tangent(i);
            let m1 = channel.in_tangent(i + 1);
            let mut out: SampledValue = (0..v0.len())
                .map(|k| cubic_spline(v0[k], v1[k], m0[k], m1[k], u, delta))
                .collect();
            if channel.path() == AnimationPath::Quaternion {
                let q = Vec4::from_slice(&out).normalize_or_zero();
                out.copy_from_slice(&q.to_array());
            }
            out
        }
    };
    Some(value)
}

fn slerp(a: &[f32], b: &[f32], t: f32) -> SampledValue {
    let q = Quat::from_slice(a).slerp(Quat::from_slice(b), t);
    SampledValue::from_slice(&q.to_array())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn searches_clamp_outside_range() {
        let times = [0.0, 1.0, 2.0, 3.0];
        let strategies: [fn(&[f32], f32) -> usize; 3] =
            [binary_search, interpolation_search, brute_force_search];
        for find in strategies {
            assert_eq!(find(&times, -1.0), 0);
            assert_eq!(find(&times, 1.0), 1);
            assert_eq!(find(&times, 2.5), 2);
            assert_eq!(find(&times, 3.0), 3);
            assert_eq!(find(&times, 9.0), 3);
            assert_eq!(find(&times, f32::NAN), 0);
            assert_eq!(find(&[], 1.0), 0);
        }
    }

    #[test]
    fn duplicate_times_resolve_to_last_equal_key() {
        let times = [0.0, 1.0, 1.0, 2.0];
        for strategy in [
            SearchStrategy::Auto,
            SearchStrategy::Binary,
            SearchStrategy::Interpolation,
            SearchStrategy::BruteForce,
        ] {
            assert_eq!(search(&times, 0.5, strategy), 0);
            assert_eq!(search(&times, 1.0, strategy), 2);
            assert_eq!(search(&times, 1.5, strategy), 2);
        }
    }

    #[test]
    fn duplicate_times_sample_as_a_jump() {
        let channel = AnimationChannel::new(
            AnimationPath::Weights,
            vec![0.0, 1.0, 1.0, 2.0],
            vec![0.0, 1.0, 2.0, 3.0],
            1,
            InterpolationMode::Linear,
        )
        .unwrap();
        for strategy in [SearchStrategy::Binary, SearchStrategy::Interpolation, SearchStrategy::BruteForce] {
            let at = |t: f32| interpolate(&channel, t, strategy).unwrap()[0];
            assert!((at(0.5) - 0.5).abs() < 1e-6);
            assert!((at(1.0) - 2.0).abs() < 1e-6);
            assert!((at(1.5) - 2.5).abs() < 1e-6);
        }
    }

    #[test]
    fn cubic_spline_midpoint_with_zero_tangents() {
        assert!((cubic_spline(0.0, 1.0, 0.0, 0.0, 0.5, 1.0) - 0.5).abs() < 1e-6);
    }
}
