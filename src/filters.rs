//! Per-category effect filter settings
//!
//! A category may enable any combination of effect filters; the parameter
//! structs are carried by the category and copied onto the playback instance
//! when it is configured. Backends without a DSP chain are free to ignore
//! everything except the fades, which the director applies itself through
//! volume/pitch control.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Mask of filters enabled on a category
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FilterKind: u32 {
        /// Low-pass filter
        const LOW_PASS = 1 << 0;
        /// High-pass filter
        const HIGH_PASS = 1 << 1;
        /// Reverb
        const REVERB = 1 << 2;
        /// Echo
        const ECHO = 1 << 3;
        /// Distortion
        const DISTORTION = 1 << 4;
        /// Chorus
        const CHORUS = 1 << 5;
        /// Volume/pitch fade applied at playback start
        const FADE_IN = 1 << 6;
        /// Volume/pitch fade applied toward the end of the clip
        const FADE_OUT = 1 << 7;
    }
}

/// A key of a piecewise-linear curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    /// Time of this key in seconds
    pub time: f32,
    /// Curve value at `time`
    pub value: f32,
}

/// Piecewise-linear curve over time, used for fades.
///
/// Keys are kept sorted by time; evaluation clamps outside the key range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FadeCurve {
    keys: Vec<CurveKey>,
}

impl FadeCurve {
    /// Create a curve from `(time, value)` pairs; keys are sorted by time
    pub fn new(keys: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut keys: Vec<CurveKey> = keys
            .into_iter()
            .map(|(time, value)| CurveKey { time, value })
            .collect();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// A linear ramp from `from` to `to` over `duration` seconds
    pub fn linear(from: f32, to: f32, duration: f32) -> Self {
        Self::new([(0.0, from), (duration.max(0.0), to)])
    }

    /// Time of the last key, i.e. the duration of the fade
    pub fn duration(&self) -> f32 {
        self.keys.last().map_or(0.0, |k| k.time)
    }

    /// Evaluate the curve at time `t`, clamping outside the key range
    pub fn evaluate(&self, t: f32) -> f32 {
        let Some(first) = self.keys.first() else {
            return 0.0;
        };
        if t <= first.time {
            return first.value;
        }
        for pair in self.keys.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.time {
                let span = b.time - a.time;
                if span <= f32::EPSILON {
                    return b.value;
                }
                let alpha = (t - a.time) / span;
                return a.value + (b.value - a.value) * alpha;
            }
        }
        self.keys.last().map_or(0.0, |k| k.value)
    }

    /// Whether the curve has no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// What a fade curve drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FadeTarget {
    /// Fade modulates the instance volume
    #[default]
    Volume,
    /// Fade modulates the instance pitch
    Pitch,
}

/// Fade-in or fade-out settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FadeParams {
    /// Curve evaluated over the fade duration
    pub curve: FadeCurve,
    /// Whether the curve drives volume or pitch
    pub target: FadeTarget,
}

impl Default for FadeParams {
    fn default() -> Self {
        Self {
            curve: FadeCurve::linear(0.0, 1.0, 1.0),
            target: FadeTarget::Volume,
        }
    }
}

/// Low-pass filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowPassParams {
    /// Cutoff frequency in Hz
    pub cutoff_hz: f32,
    /// Self-resonance dampening
    pub resonance_q: f32,
}

impl Default for LowPassParams {
    fn default() -> Self {
        Self {
            cutoff_hz: 5000.0,
            resonance_q: 1.0,
        }
    }
}

/// High-pass filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighPassParams {
    /// Cutoff frequency in Hz
    pub cutoff_hz: f32,
    /// Self-resonance dampening
    pub resonance_q: f32,
}

impl Default for HighPassParams {
    fn default() -> Self {
        Self {
            cutoff_hz: 5000.0,
            resonance_q: 1.0,
        }
    }
}

/// Echo filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EchoParams {
    /// Echo delay in milliseconds
    pub delay_ms: f32,
    /// Decay per delay, 0 = total decay, 1 = no decay
    pub decay_ratio: f32,
    /// Volume of the original signal passed to output
    pub dry_mix: f32,
    /// Volume of the echo signal passed to output
    pub wet_mix: f32,
}

impl Default for EchoParams {
    fn default() -> Self {
        Self {
            delay_ms: 500.0,
            decay_ratio: 0.5,
            dry_mix: 1.0,
            wet_mix: 1.0,
        }
    }
}

/// Distortion filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionParams {
    /// Distortion amount, 0 to 1
    pub level: f32,
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self { level: 0.5 }
    }
}

/// Reverb filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParams {
    /// Dry signal level in mB
    pub dry_level: f32,
    /// Room effect level in mB
    pub room_level: f32,
    /// Reverberation decay time in seconds
    pub decay_time: f32,
    /// Echo density in percent
    pub diffusion: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            dry_level: 0.0,
            room_level: 0.0,
            decay_time: 1.0,
            diffusion: 100.0,
        }
    }
}

/// Chorus filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChorusParams {
    /// Volume of the original signal passed to output
    pub dry_mix: f32,
    /// Volume of the first chorus tap
    pub wet_mix_1: f32,
    /// Volume of the second chorus tap
    pub wet_mix_2: f32,
    /// Volume of the third chorus tap
    pub wet_mix_3: f32,
    /// Chorus delay in milliseconds
    pub delay_ms: f32,
    /// Modulation rate in Hz
    pub rate_hz: f32,
    /// Modulation depth
    pub depth: f32,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            dry_mix: 0.5,
            wet_mix_1: 0.5,
            wet_mix_2: 0.5,
            wet_mix_3: 0.5,
            delay_ms: 40.0,
            rate_hz: 0.8,
            depth: 0.03,
        }
    }
}

/// Full set of filter parameters carried by a category.
///
/// Present on a category only while at least one filter is enabled; the
/// persist layer drops the bank when the enabled mask is empty so it takes
/// no space in saved data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterBank {
    /// Low-pass settings
    pub low_pass: LowPassParams,
    /// High-pass settings
    pub high_pass: HighPassParams,
    /// Reverb settings
    pub reverb: ReverbParams,
    /// Echo settings
    pub echo: EchoParams,
    /// Distortion settings
    pub distortion: DistortionParams,
    /// Chorus settings
    pub chorus: ChorusParams,
    /// Fade applied when the instance starts
    pub fade_in: FadeParams,
    /// Fade applied toward the end of the clip
    pub fade_out: FadeParams,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_curve_evaluate_interpolates() {
        let curve = FadeCurve::linear(0.0, 1.0, 2.0);
        assert_relative_eq!(curve.evaluate(0.0), 0.0);
        assert_relative_eq!(curve.evaluate(1.0), 0.5);
        assert_relative_eq!(curve.evaluate(2.0), 1.0);
    }

    #[test]
    fn test_curve_clamps_outside_range() {
        let curve = FadeCurve::linear(0.2, 0.8, 1.0);
        assert_relative_eq!(curve.evaluate(-1.0), 0.2);
        assert_relative_eq!(curve.evaluate(5.0), 0.8);
    }

    #[test]
    fn test_curve_duration_is_last_key() {
        let curve = FadeCurve::new([(0.0, 0.0), (0.5, 1.0), (1.5, 0.0)]);
        assert_relative_eq!(curve.duration(), 1.5);
    }

    #[test]
    fn test_unsorted_keys_are_sorted() {
        let curve = FadeCurve::new([(1.0, 1.0), (0.0, 0.0)]);
        assert_relative_eq!(curve.evaluate(0.5), 0.5);
    }

    #[test]
    fn test_filter_mask_combination() {
        let mask = FilterKind::LOW_PASS | FilterKind::FADE_IN;
        assert!(mask.contains(FilterKind::LOW_PASS));
        assert!(!mask.contains(FilterKind::ECHO));
    }
}
