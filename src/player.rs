//! Pooled playback instances
//!
//! A [`ClipPlayer`] is one recyclable playback slot. Players are created
//! once, rented from the [`ClipPlayerPool`], reset in place on release,
//! and never destroyed. The director owns all mutation; this module only
//! holds the state.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::backend::SoundHandle;
use crate::cache::AudioClip;
use crate::config::SharedPosition;
use crate::filters::{
    ChorusParams, DistortionParams, EchoParams, FadeParams, FilterKind, HighPassParams,
    LowPassParams, ReverbParams,
};
use crate::spatial::Spatial3d;

/// Completion signal handed out by wait operations.
///
/// The flag flips exactly once; polling after that keeps returning `true`.
#[derive(Debug, Clone)]
pub struct WaitToken(pub(crate) Rc<Cell<bool>>);

impl WaitToken {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(false)))
    }

    pub(crate) fn signalled() -> Self {
        let token = Self::new();
        token.0.set(true);
        token
    }

    /// Whether the awaited milestone has happened
    pub fn is_done(&self) -> bool {
        self.0.get()
    }
}

/// Parameters for one enabled per-instance filter slot
#[derive(Debug, Clone)]
pub enum FilterParams {
    /// Low-pass cutoff settings
    LowPass(LowPassParams),
    /// High-pass cutoff settings
    HighPass(HighPassParams),
    /// Echo delay settings
    Echo(EchoParams),
    /// Distortion level
    Distortion(DistortionParams),
    /// Reverb room settings
    Reverb(ReverbParams),
    /// Chorus voice settings
    Chorus(ChorusParams),
}

/// One filter slot on a player; disabled slots keep their parameters
#[derive(Debug, Clone)]
pub struct FilterSlot {
    /// Whether the filter is applied
    pub enabled: bool,
    /// Filter parameters, retained across disable/enable
    pub params: FilterParams,
}

/// A running or scheduled fade on a player
#[derive(Debug, Clone)]
pub struct ActiveFade {
    /// Curve and target parameter
    pub params: FadeParams,
    /// Audio-time seconds elapsed since the fade began
    pub elapsed: f32,
    /// Release the player when the curve completes
    pub release_after: bool,
}

/// One recyclable playback instance.
///
/// `empty` is the pool contract: a player in the free list must have it
/// set, and a rented player must not. All fields are reset in place when
/// the player returns to the pool; only `generation` survives, bumped so
/// stale handles stop matching.
pub struct ClipPlayer {
    /// Whether this slot is in the free list
    pub empty: bool,
    /// Bumped on every recycle
    pub generation: u32,

    /// Retained clip, present from configuration until release
    pub clip: Option<Arc<AudioClip>>,
    /// Cache path of the retained clip, for the paired release
    pub clip_path: String,
    /// Leaf category this instance was triggered from
    pub category: i32,
    /// Trigger id, echoed in lifecycle events
    pub trigger: String,
    /// Bus resolved from the category chain
    pub bus: Option<String>,

    /// Live backend sound, present once started
    pub sound: Option<SoundHandle>,
    /// Linear volume
    pub volume: f32,
    /// Playback rate multiplier
    pub pitch: f32,
    /// Stereo pan
    pub pan: f32,
    /// Whether the instance loops
    pub looped: bool,

    /// Whether the backend sound has been started
    pub started: bool,
    /// Whether the instance is paused (pre-start or mid-play)
    pub paused: bool,
    /// Configured with `start_paused`; the first resume performs the start
    pub start_deferred: bool,
    /// Game-time seconds left before the deferred/delayed start
    pub start_delay: f32,
    /// Whether a cooldown stamp was consumed and must be freed on release
    pub cooldown_consumed: bool,

    /// Game-time seconds of the auto-release countdown's first phase
    pub release_game: f32,
    /// Audio-time seconds of the auto-release countdown's second phase
    pub release_real: f32,
    /// Whether the release countdown runs at all (off for loops)
    pub auto_release: bool,

    /// Position cell followed every tick, for moving emitters
    pub tracked: Option<SharedPosition>,
    /// Fixed position, pushed once at start
    pub position: Option<[f32; 3]>,
    /// 3D settings, `None` for flat 2D playback
    pub spatial: Option<Spatial3d>,

    /// Per-instance filter state copied from the category
    pub filter_slots: HashMap<FilterKind, FilterSlot>,
    /// Fade-in applied at start, if configured
    pub fade_in: Option<FadeParams>,
    /// Fade-out applied near the end, if configured
    pub fade_out: Option<FadeParams>,
    /// Currently running fade
    pub active_fade: Option<ActiveFade>,
    /// Audio-time seconds until the scheduled fade-out begins
    pub fade_out_countdown: Option<f32>,

    /// Signalled when the backend sound starts
    pub waiting_started: Vec<Rc<Cell<bool>>>,
    /// Signalled when the instance is released
    pub waiting_finished: Vec<Rc<Cell<bool>>>,
}

impl ClipPlayer {
    fn new() -> Self {
        Self {
            empty: true,
            generation: 0,
            clip: None,
            clip_path: String::new(),
            category: -1,
            trigger: String::new(),
            bus: None,
            sound: None,
            volume: 1.0,
            pitch: 1.0,
            pan: 0.0,
            looped: false,
            started: false,
            paused: false,
            start_deferred: false,
            start_delay: 0.0,
            cooldown_consumed: false,
            release_game: 0.0,
            release_real: 0.0,
            auto_release: false,
            tracked: None,
            position: None,
            spatial: None,
            filter_slots: HashMap::new(),
            fade_in: None,
            fade_out: None,
            active_fade: None,
            fade_out_countdown: None,
            waiting_started: Vec::new(),
            waiting_finished: Vec::new(),
        }
    }

    /// Reset every field except the generation, readying the slot for the
    /// free list
    pub fn reset(&mut self) {
        let generation = self.generation;
        *self = Self::new();
        self.generation = generation;
    }

    /// Length of the configured clip in seconds, zero when unknown
    pub fn clip_length(&self) -> f32 {
        self.clip.as_ref().map_or(0.0, |c| c.length_secs())
    }
}

/// Fixed-size pool of recyclable players
pub struct ClipPlayerPool {
    players: Vec<ClipPlayer>,
    free: Vec<usize>,
}

impl ClipPlayerPool {
    /// Create a pool of `capacity` players, all free
    pub fn new(capacity: usize) -> Self {
        let players = (0..capacity).map(|_| ClipPlayer::new()).collect();
        let free = (0..capacity).rev().collect();
        Self { players, free }
    }

    /// Rent a free player, returning its index.
    ///
    /// `None` when the pool is exhausted. A free-list entry that is not
    /// actually empty is a recycling bug; it is logged and skipped rather
    /// than silently reused over a live sound.
    pub fn rent(&mut self) -> Option<usize> {
        while let Some(index) = self.free.pop() {
            let player = &mut self.players[index];
            if !player.empty {
                log::error!("Pool free list held a non-empty player at slot {index}");
                continue;
            }
            player.empty = false;
            return Some(index);
        }
        log::warn!("Clip player pool exhausted ({} players)", self.players.len());
        None
    }

    /// Reset a rented player and put it back on the free list
    pub fn return_player(&mut self, index: usize) {
        let Some(player) = self.players.get_mut(index) else {
            return;
        };
        if player.empty {
            return;
        }
        player.reset();
        player.generation = player.generation.wrapping_add(1);
        self.free.push(index);
    }

    /// Access a rented player
    pub fn get(&self, index: usize) -> Option<&ClipPlayer> {
        self.players.get(index).filter(|p| !p.empty)
    }

    /// Mutable access to a rented player
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ClipPlayer> {
        self.players.get_mut(index).filter(|p| !p.empty)
    }

    /// Indices of every rented player
    pub fn rented_indices(&self) -> Vec<usize> {
        self.players
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.empty)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of players currently rented
    pub fn rented_count(&self) -> usize {
        self.players.len() - self.free.len()
    }

    /// Total pool capacity
    pub fn capacity(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_and_return_cycles() {
        let mut pool = ClipPlayerPool::new(2);
        let a = pool.rent().unwrap();
        let b = pool.rent().unwrap();
        assert_ne!(a, b);
        assert!(pool.rent().is_none(), "pool of 2 must exhaust");

        pool.return_player(a);
        let c = pool.rent().unwrap();
        assert_eq!(c, a, "freed slot is reused");
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_generation_bumps_on_return() {
        let mut pool = ClipPlayerPool::new(1);
        let index = pool.rent().unwrap();
        let gen_before = pool.get(index).unwrap().generation;
        pool.return_player(index);
        pool.rent().unwrap();
        assert_eq!(pool.get(index).unwrap().generation, gen_before + 1);
    }

    #[test]
    fn test_reset_clears_state_keeps_generation() {
        let mut pool = ClipPlayerPool::new(1);
        let index = pool.rent().unwrap();
        {
            let player = pool.get_mut(index).unwrap();
            player.volume = 0.3;
            player.looped = true;
            player.trigger = "SFX_Boom".into();
            player.generation = 7;
        }
        pool.return_player(index);
        pool.rent().unwrap();
        let player = pool.get(index).unwrap();
        assert!((player.volume - 1.0).abs() < f32::EPSILON);
        assert!(!player.looped);
        assert!(player.trigger.is_empty());
        assert_eq!(player.generation, 8);
    }

    #[test]
    fn test_rent_never_hands_out_live_player() {
        let mut pool = ClipPlayerPool::new(2);
        let live = pool.rent().unwrap();
        pool.get_mut(live).unwrap().trigger = "SFX_Boom".into();
        // Corrupt the free list the way a double-return bug would
        pool.free.push(live);

        let rented = pool.rent().unwrap();
        assert_ne!(rented, live, "live player must be skipped, not recycled");
        assert_eq!(pool.get(live).unwrap().trigger, "SFX_Boom");
    }

    #[test]
    fn test_double_return_is_harmless() {
        let mut pool = ClipPlayerPool::new(1);
        let index = pool.rent().unwrap();
        pool.return_player(index);
        pool.return_player(index);
        assert!(pool.rent().is_some());
        assert!(pool.rent().is_none());
    }

    #[test]
    fn test_wait_token_signalling() {
        let token = WaitToken::signalled();
        assert!(token.is_done());
        let token = WaitToken::new();
        assert!(!token.is_done());
        token.0.set(true);
        assert!(token.is_done());
    }
}
