//! Recording backend with no audio output
//!
//! Sounds never finish on their own, so tests control lifetime explicitly
//! through the director's release scheduling.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::AudioClip;
use crate::error::AudioError;

use super::{AudioBackend, BackendConfig, SoundHandle, StartParams};

/// State the null backend records per sound
#[derive(Debug, Clone)]
pub struct NullSound {
    /// Path of the clip that was started
    pub clip_path: String,
    /// Last volume set
    pub volume: f32,
    /// Last pitch set
    pub pitch: f32,
    /// Last pan set
    pub pan: f32,
    /// Whether the sound loops
    pub looped: bool,
    /// Bus the sound was routed to
    pub bus: Option<String>,
    /// Last position set, if any
    pub position: Option<[f32; 3]>,
    /// Whether the sound is currently paused
    pub paused: bool,
}

/// Backend that records every call instead of producing audio
#[derive(Default)]
pub struct NullBackend {
    initialized: bool,
    sounds: HashMap<SoundHandle, NullSound>,
    next_id: u32,
    started_count: u32,
}

impl NullBackend {
    /// Create an uninitialized null backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded state for a live sound
    pub fn sound_state(&self, handle: SoundHandle) -> Option<&NullSound> {
        self.sounds.get(&handle)
    }

    /// Total number of sounds ever started
    pub fn started_count(&self) -> u32 {
        self.started_count
    }

    /// Number of currently live sounds
    pub fn live_count(&self) -> usize {
        self.sounds.len()
    }
}

impl AudioBackend for NullBackend {
    fn initialize(&mut self, _config: &BackendConfig) -> Result<(), AudioError> {
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.stop_all();
        self.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn update(&mut self) {}

    fn start_clip(
        &mut self,
        clip: &Arc<AudioClip>,
        params: &StartParams,
    ) -> Result<SoundHandle, AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }
        let handle = SoundHandle {
            id: self.next_id,
            generation: 0,
        };
        self.next_id += 1;
        self.started_count += 1;
        self.sounds.insert(
            handle,
            NullSound {
                clip_path: clip.path().to_owned(),
                volume: params.volume,
                pitch: params.pitch,
                pan: params.pan,
                looped: params.looped,
                bus: params.bus.clone(),
                position: params.position,
                paused: false,
            },
        );
        Ok(handle)
    }

    fn pause(&mut self, handle: SoundHandle) {
        if let Some(sound) = self.sounds.get_mut(&handle) {
            sound.paused = true;
        }
    }

    fn resume(&mut self, handle: SoundHandle) {
        if let Some(sound) = self.sounds.get_mut(&handle) {
            sound.paused = false;
        }
    }

    fn stop(&mut self, handle: SoundHandle) {
        self.sounds.remove(&handle);
    }

    fn stop_all(&mut self) {
        self.sounds.clear();
    }

    fn set_volume(&mut self, handle: SoundHandle, volume: f32) {
        if let Some(sound) = self.sounds.get_mut(&handle) {
            sound.volume = volume;
        }
    }

    fn set_pitch(&mut self, handle: SoundHandle, pitch: f32) {
        if let Some(sound) = self.sounds.get_mut(&handle) {
            sound.pitch = pitch;
        }
    }

    fn set_pan(&mut self, handle: SoundHandle, pan: f32) {
        if let Some(sound) = self.sounds.get_mut(&handle) {
            sound.pan = pan;
        }
    }

    fn set_position(&mut self, handle: SoundHandle, position: [f32; 3]) {
        if let Some(sound) = self.sounds.get_mut(&handle) {
            sound.position = Some(position);
        }
    }

    fn is_playing(&self, handle: SoundHandle) -> bool {
        self.sounds.get(&handle).is_some_and(|s| !s.paused)
    }
}
