//! Playback clocks
//!
//! The director runs on two timelines: *game time*, which always advances,
//! and *audio time*, which freezes while the director is globally paused.
//! Cooldown windows and pre-play delays use game time; realtime release
//! timers and fades use audio time so that paused sounds never self-release
//! mid-pause.

/// Dual game/audio timeline advanced once per update tick.
#[derive(Debug, Clone)]
pub struct AudioClock {
    game_time: f64,
    audio_time: f64,
    paused: bool,
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock {
    /// Create a clock with both timelines at zero
    pub fn new() -> Self {
        Self {
            game_time: 0.0,
            audio_time: 0.0,
            paused: false,
        }
    }

    /// Advance the clock by one tick of `delta_time` seconds
    pub fn advance(&mut self, delta_time: f32) {
        self.game_time += f64::from(delta_time);
        if !self.paused {
            self.audio_time += f64::from(delta_time);
        }
    }

    /// Pause or resume the audio timeline
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            log::debug!("Audio time paused set to: {paused}");
        }
    }

    /// Whether the audio timeline is currently frozen
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Seconds of game time elapsed since creation
    pub fn game_time(&self) -> f32 {
        self.game_time as f32
    }

    /// Seconds of unpaused audio time elapsed since creation
    pub fn audio_time(&self) -> f32 {
        self.audio_time as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_advance_both_timelines() {
        let mut clock = AudioClock::new();
        clock.advance(0.5);
        clock.advance(0.25);
        assert_relative_eq!(clock.game_time(), 0.75);
        assert_relative_eq!(clock.audio_time(), 0.75);
    }

    #[test]
    fn test_pause_freezes_audio_time_only() {
        let mut clock = AudioClock::new();
        clock.advance(1.0);
        clock.set_paused(true);
        clock.advance(2.0);
        clock.set_paused(false);
        clock.advance(0.5);

        assert_relative_eq!(clock.game_time(), 3.5);
        assert_relative_eq!(clock.audio_time(), 1.5);
    }
}
