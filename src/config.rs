//! Playback requests and global preferences

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::AudioError;
use crate::spatial::{RolloffMode, SourceSettings, Spatial3d};

/// A world position another system keeps up to date; playing instances
/// bound to one follow it every tick
pub type SharedPosition = Rc<Cell<[f32; 3]>>;

/// Global preferences, loadable from RON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioPreferences {
    /// Trigger played when a requested trigger cannot be resolved
    pub missing_sound_trigger: String,
    /// Whether the missing-sound fallback plays at all
    pub play_missing_sound: bool,
    /// Spatial defaults applied in 3D mode when a request sets none
    pub default_3d: Spatial3d,
}

impl Default for AudioPreferences {
    fn default() -> Self {
        Self {
            missing_sound_trigger: "GEN_Missing_Sound".to_owned(),
            play_missing_sound: false,
            default_3d: Spatial3d::default(),
        }
    }
}

impl AudioPreferences {
    /// Load preferences from a RON file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let text = fs::read_to_string(path)?;
        Ok(ron::from_str(&text)?)
    }
}

/// A single playback request.
///
/// Only the trigger is required; every other field overrides the leaf
/// category's configuration when set.
#[derive(Debug, Clone, Default)]
pub struct PlayConfig {
    /// Leaf category id to play
    pub trigger: String,
    /// Volume override, 0..=1
    pub volume: Option<f32>,
    /// Seconds to wait before audio starts
    pub delay: Option<f32>,
    /// Force 3D positioning regardless of the director's mode
    pub in_3d: Option<bool>,
    /// Fixed world position for 3D playback
    pub position: Option<[f32; 3]>,
    /// Distance below which volume stops increasing
    pub min_distance: Option<f32>,
    /// Distance beyond which attenuation stops
    pub max_distance: Option<f32>,
    /// Attenuation curve override
    pub rolloff: Option<RolloffMode>,
    /// Pitch randomization amplitude override
    pub pitch_randomization: Option<f32>,
    /// Looping override
    pub looped: Option<bool>,
    /// Configure the instance fully but leave it paused before first start
    pub start_paused: bool,
    /// Position cell to follow while playing
    pub tracked: Option<SharedPosition>,
    /// Snapshot of an emitter's source settings, copied wholesale
    pub reference: Option<SourceSettings>,
}

impl PlayConfig {
    /// Request `trigger` with no overrides
    pub fn trigger(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            ..Self::default()
        }
    }

    /// Override the volume
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Delay the start by `delay` seconds of game time
    #[must_use]
    pub fn with_delay(mut self, delay: f32) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Play at a fixed 3D position
    #[must_use]
    pub fn with_position(mut self, position: [f32; 3]) -> Self {
        self.position = Some(position);
        self.in_3d = Some(true);
        self
    }

    /// Follow a shared position cell while playing
    #[must_use]
    pub fn with_tracked(mut self, tracked: SharedPosition) -> Self {
        self.tracked = Some(tracked);
        self.in_3d = Some(true);
        self
    }

    /// Override the attenuation distances
    #[must_use]
    pub fn with_distances(mut self, min: f32, max: f32) -> Self {
        self.min_distance = Some(min);
        self.max_distance = Some(max);
        self
    }

    /// Override the attenuation curve
    #[must_use]
    pub fn with_rolloff(mut self, rolloff: RolloffMode) -> Self {
        self.rolloff = Some(rolloff);
        self
    }

    /// Override the pitch randomization amplitude
    #[must_use]
    pub fn with_pitch_randomization(mut self, amplitude: f32) -> Self {
        self.pitch_randomization = Some(amplitude);
        self
    }

    /// Override looping
    #[must_use]
    pub fn with_looped(mut self, looped: bool) -> Self {
        self.looped = Some(looped);
        self
    }

    /// Configure but do not start; resume the handle to begin playback
    #[must_use]
    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }

    /// Copy an emitter's source settings wholesale
    #[must_use]
    pub fn with_reference(mut self, reference: SourceSettings) -> Self {
        self.reference = Some(reference);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_defaults() {
        let prefs = AudioPreferences::default();
        assert_eq!(prefs.missing_sound_trigger, "GEN_Missing_Sound");
        assert!(!prefs.play_missing_sound);
    }

    #[test]
    fn test_preferences_partial_ron() {
        let prefs: AudioPreferences =
            ron::from_str("(play_missing_sound: true)").unwrap();
        assert!(prefs.play_missing_sound);
        assert_eq!(prefs.missing_sound_trigger, "GEN_Missing_Sound");
    }

    #[test]
    fn test_builder_chain() {
        let config = PlayConfig::trigger("SFX_Boom")
            .with_volume(0.5)
            .with_delay(0.25)
            .with_position([1.0, 2.0, 3.0]);
        assert_eq!(config.trigger, "SFX_Boom");
        assert_eq!(config.volume, Some(0.5));
        assert_eq!(config.in_3d, Some(true));
        assert_eq!(config.position, Some([1.0, 2.0, 3.0]));
    }
}
