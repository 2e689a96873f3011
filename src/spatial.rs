//! Spatial playback parameters
//!
//! 3D source settings inherited from preferences or supplied per request,
//! plus the reference-settings copy used when a caller wants a new instance
//! to sound exactly like an existing configured source.

use serde::{Deserialize, Serialize};

/// How volume attenuates over distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RolloffMode {
    /// Logarithmic falloff (halved volume per doubled distance)
    #[default]
    Logarithmic,
    /// Linear falloff toward `max_distance`
    Linear,
    /// Backend-defined custom falloff curve
    Custom,
}

/// Global playback mode of a director
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioMode {
    /// Plain 2D playback
    #[default]
    Audio2d,
    /// 3D playback; unresolved requests receive the default 3D settings
    Audio3d,
    /// 2D playback with per-category stereo panning applied
    StereoControl,
}

/// Hard left/right pan shorthand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StereoSide {
    /// Full left pan (-1.0)
    Left,
    /// Full right pan (1.0)
    Right,
}

impl StereoSide {
    /// Stereo pan value for this side
    pub fn pan(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

/// 3D parameters for one playback instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spatial3d {
    /// Doppler scale
    pub doppler_level: f32,
    /// Distance below which the source stops growing louder
    pub min_distance: f32,
    /// Distance at which the source stops attenuating
    pub max_distance: f32,
    /// Attenuation mode over distance
    pub rolloff: RolloffMode,
    /// Spread angle of a multichannel source, in degrees
    pub spread: f32,
    /// 0.0 full 2D, 1.0 full 3D
    pub spatial_blend: f32,
    /// Whether spatialization is enabled at all
    pub spatialize: bool,
    /// Whether the spatializer runs after the effect filters
    pub spatialize_post_effects: bool,
}

impl Default for Spatial3d {
    fn default() -> Self {
        Self {
            doppler_level: 1.0,
            min_distance: 100.0,
            max_distance: 20_000.0,
            rolloff: RolloffMode::Logarithmic,
            spread: 0.0,
            spatial_blend: 1.0,
            spatialize: true,
            spatialize_post_effects: true,
        }
    }
}

/// Snapshot of an already-configured source, copied wholesale onto a new
/// instance when supplied in a play request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Playback pitch multiplier
    pub pitch: f32,
    /// 0.0 full 2D, 1.0 full 3D
    pub spatial_blend: f32,
    /// Distance below which the source stops growing louder
    pub min_distance: f32,
    /// Distance at which the source stops attenuating
    pub max_distance: f32,
    /// Attenuation mode over distance
    pub rolloff: RolloffMode,
    /// Doppler scale
    pub doppler_level: f32,
    /// Spread angle in degrees
    pub spread: f32,
    /// Whether spatialization is enabled
    pub spatialize: bool,
    /// Whether the spatializer runs after the effect filters
    pub spatialize_post_effects: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            spatial_blend: 0.0,
            min_distance: 1.0,
            max_distance: 500.0,
            rolloff: RolloffMode::Logarithmic,
            doppler_level: 1.0,
            spread: 0.0,
            spatialize: false,
            spatialize_post_effects: false,
        }
    }
}

impl SourceSettings {
    /// Expand the snapshot into instance 3D parameters
    pub fn to_spatial(&self) -> Spatial3d {
        Spatial3d {
            doppler_level: self.doppler_level,
            min_distance: self.min_distance,
            max_distance: self.max_distance,
            rolloff: self.rolloff,
            spread: self.spread,
            spatial_blend: self.spatial_blend,
            spatialize: self.spatialize,
            spatialize_post_effects: self.spatialize_post_effects,
        }
    }
}
