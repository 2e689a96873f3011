//! Audio output backends
//!
//! The director talks to the platform through the [`AudioBackend`] trait.
//! The [`null`] backend records state for tests and headless runs; the
//! rodio backend (feature `rodio-backend`) produces real output.

use std::sync::Arc;

use crate::cache::AudioClip;
use crate::error::AudioError;
use crate::spatial::Spatial3d;

pub mod null;

#[cfg(feature = "rodio-backend")]
pub mod rodio_backend;

pub use null::NullBackend;

#[cfg(feature = "rodio-backend")]
pub use rodio_backend::RodioBackend;

/// Opaque handle to a sound playing on a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle {
    /// Backend-local slot id
    pub id: u32,
    /// Bumped each time the slot is reused
    pub generation: u32,
}

/// Device configuration hints for backend initialization
#[derive(Debug, Clone, Copy)]
pub struct BackendConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u16,
    /// Device buffer size in frames
    pub buffer_size: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            buffer_size: 4096,
        }
    }
}

/// Everything a backend needs to start one sound
#[derive(Debug, Clone, Default)]
pub struct StartParams {
    /// Linear volume, 0..=1
    pub volume: f32,
    /// Playback rate multiplier
    pub pitch: f32,
    /// Stereo pan, -1..=1
    pub pan: f32,
    /// Restart from the top on completion
    pub looped: bool,
    /// Mixer bus to route through, when the backend has buses
    pub bus: Option<String>,
    /// Initial world position for 3D playback
    pub position: Option<[f32; 3]>,
    /// 3D attenuation settings; `None` plays flat 2D
    pub spatial: Option<Spatial3d>,
}

/// Platform audio output abstraction
pub trait AudioBackend {
    /// Bring up the output device
    fn initialize(&mut self, config: &BackendConfig) -> Result<(), AudioError>;

    /// Tear down the output device, stopping everything
    fn shutdown(&mut self);

    /// Whether [`initialize`](Self::initialize) has succeeded
    fn is_initialized(&self) -> bool;

    /// Per-tick housekeeping (reaping finished sounds etc.)
    fn update(&mut self);

    /// Start a clip; the handle stays valid until the sound is stopped
    fn start_clip(&mut self, clip: &Arc<AudioClip>, params: &StartParams)
        -> Result<SoundHandle, AudioError>;

    /// Pause a playing sound; unknown handles are ignored
    fn pause(&mut self, handle: SoundHandle);

    /// Resume a paused sound; unknown handles are ignored
    fn resume(&mut self, handle: SoundHandle);

    /// Stop a sound and free its slot; unknown handles are ignored
    fn stop(&mut self, handle: SoundHandle);

    /// Stop every sound
    fn stop_all(&mut self);

    /// Set linear volume on a sound
    fn set_volume(&mut self, handle: SoundHandle, volume: f32);

    /// Set the playback rate multiplier on a sound
    fn set_pitch(&mut self, handle: SoundHandle, pitch: f32);

    /// Set stereo pan on a sound
    fn set_pan(&mut self, handle: SoundHandle, pan: f32);

    /// Move a 3D sound
    fn set_position(&mut self, handle: SoundHandle, position: [f32; 3]);

    /// Whether the handle refers to a live, unpaused sound
    fn is_playing(&self, handle: SoundHandle) -> bool;
}
