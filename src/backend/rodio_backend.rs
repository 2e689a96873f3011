//! Rodio audio backend
//!
//! Uses the Rodio library for cross-platform output. Rodio is pure Rust
//! and decodes WAV, OGG Vorbis, MP3, and FLAC.
//!
//! Pan, bus routing, and 3D positioning are accepted but not rendered;
//! rodio sinks expose volume and speed only. Positional mixes need a
//! platform backend behind the same trait.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::cache::AudioClip;
use crate::error::AudioError;

use super::{AudioBackend, BackendConfig, SoundHandle, StartParams};

/// Rodio-based audio backend
pub struct RodioBackend {
    /// Must be kept alive for the duration of playback
    _output_stream: Option<OutputStream>,
    stream_handle: Option<OutputStreamHandle>,
    active_sounds: HashMap<SoundHandle, Sink>,
    next_id: u32,
    initialized: bool,
}

impl RodioBackend {
    /// Create an uninitialized backend
    pub fn new() -> Self {
        Self {
            _output_stream: None,
            stream_handle: None,
            active_sounds: HashMap::new(),
            next_id: 0,
            initialized: false,
        }
    }

    fn next_handle(&mut self) -> SoundHandle {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        SoundHandle { id, generation: 0 }
    }
}

impl AudioBackend for RodioBackend {
    fn initialize(&mut self, _config: &BackendConfig) -> Result<(), AudioError> {
        if self.initialized {
            return Ok(());
        }
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            AudioError::BackendInitFailed(format!("Failed to create audio output: {e}"))
        })?;
        self._output_stream = Some(stream);
        self.stream_handle = Some(stream_handle);
        self.initialized = true;
        log::info!("Rodio audio backend initialized");
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.stop_all();
        self.stream_handle = None;
        self._output_stream = None;
        self.initialized = false;
        log::info!("Rodio audio backend shutdown");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn update(&mut self) {
        // Reap finished sounds
        self.active_sounds.retain(|_handle, sink| !sink.empty());
    }

    fn start_clip(
        &mut self,
        clip: &Arc<AudioClip>,
        params: &StartParams,
    ) -> Result<SoundHandle, AudioError> {
        let stream_handle = self
            .stream_handle
            .as_ref()
            .ok_or(AudioError::BackendNotInitialized)?;

        let sink = Sink::try_new(stream_handle)
            .map_err(|e| AudioError::PlaybackFailed(format!("Failed to create sink: {e}")))?;

        let cursor = Cursor::new(clip.data().to_vec());
        let source = Decoder::new(cursor)
            .map_err(|e| AudioError::PlaybackFailed(format!("Failed to decode audio: {e}")))?;

        sink.set_volume(params.volume);
        sink.set_speed(params.pitch.max(0.01));
        if params.looped {
            sink.append(source.repeat_infinite());
        } else {
            sink.append(source);
        }

        let handle = self.next_handle();
        self.active_sounds.insert(handle, sink);
        Ok(handle)
    }

    fn pause(&mut self, handle: SoundHandle) {
        if let Some(sink) = self.active_sounds.get(&handle) {
            sink.pause();
        }
    }

    fn resume(&mut self, handle: SoundHandle) {
        if let Some(sink) = self.active_sounds.get(&handle) {
            sink.play();
        }
    }

    fn stop(&mut self, handle: SoundHandle) {
        if let Some(sink) = self.active_sounds.remove(&handle) {
            sink.stop();
        }
    }

    fn stop_all(&mut self) {
        for (_handle, sink) in self.active_sounds.drain() {
            sink.stop();
        }
    }

    fn set_volume(&mut self, handle: SoundHandle, volume: f32) {
        if let Some(sink) = self.active_sounds.get(&handle) {
            sink.set_volume(volume);
        }
    }

    fn set_pitch(&mut self, handle: SoundHandle, pitch: f32) {
        if let Some(sink) = self.active_sounds.get(&handle) {
            sink.set_speed(pitch.max(0.01));
        }
    }

    fn set_pan(&mut self, _handle: SoundHandle, _pan: f32) {
        // Not supported by rodio sinks
    }

    fn set_position(&mut self, _handle: SoundHandle, _position: [f32; 3]) {
        // Not supported by rodio sinks
    }

    fn is_playing(&self, handle: SoundHandle) -> bool {
        self.active_sounds
            .get(&handle)
            .is_some_and(|sink| !sink.is_paused() && !sink.empty())
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
