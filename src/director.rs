//! Playback orchestration
//!
//! The [`AudioDirector`] ties the subsystems together: it resolves triggers
//! against the category tree, enforces cooldowns and blocking, selects and
//! retains clips, rents pooled players, drives start delays, fades, and
//! auto-release countdowns from [`update`](AudioDirector::update), and
//! publishes lifecycle events.

use std::collections::{HashMap, VecDeque};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::backend::{AudioBackend, BackendConfig, StartParams};
use crate::cache::ClipCache;
use crate::clock::AudioClock;
use crate::config::{AudioPreferences, PlayConfig};
use crate::cooldown::CooldownLedger;
use crate::error::AudioError;
use crate::events::{AudioEvent, AudioEventBus, AudioEventHandler};
use crate::filters::{FadeParams, FadeTarget, FilterBank, FilterKind};
use crate::handle::ClipHandle;
use crate::player::{ActiveFade, ClipPlayerPool, FilterParams, FilterSlot, WaitToken};
use crate::spatial::{AudioMode, Spatial3d};
use crate::tree::{persist, Category, CategoryTree};

const DEFAULT_POOL_CAPACITY: usize = 32;

/// Extra seconds added to a clip's length before auto-release, covering
/// decoder latency and rounding in reported lengths
const RELEASE_SLACK_SECS: f32 = 0.1;

/// Central audio playback service.
///
/// One director owns one category tree, one clip cache, one player pool,
/// and one backend. Call [`update`](Self::update) once per frame.
pub struct AudioDirector {
    tree: CategoryTree,
    triggers: HashMap<String, i32>,
    preloaded: HashMap<String, Vec<String>>,
    cooldown: CooldownLedger,
    pool: ClipPlayerPool,
    cache: ClipCache,
    events: AudioEventBus,
    backend: Box<dyn AudioBackend>,
    prefs: AudioPreferences,
    clock: AudioClock,
    queued: VecDeque<PlayConfig>,
    queue_current: Option<WaitToken>,
    rng: SmallRng,
    mode: AudioMode,
}

impl AudioDirector {
    /// Build a director from saved category records
    pub fn new(
        records: Vec<Category>,
        prefs: AudioPreferences,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self, AudioError> {
        let tree = persist::reconstruct(records)?;
        Self::with_tree(tree, prefs, backend)
    }

    /// Build a director around an existing tree, initializing the backend
    pub fn with_tree(
        tree: CategoryTree,
        prefs: AudioPreferences,
        mut backend: Box<dyn AudioBackend>,
    ) -> Result<Self, AudioError> {
        backend.initialize(&BackendConfig::default())?;
        let triggers = tree.leaf_table();
        Ok(Self {
            tree,
            triggers,
            preloaded: HashMap::new(),
            cooldown: CooldownLedger::new(),
            pool: ClipPlayerPool::new(DEFAULT_POOL_CAPACITY),
            cache: ClipCache::empty(),
            events: AudioEventBus::new(),
            backend,
            prefs,
            clock: AudioClock::new(),
            queued: VecDeque::new(),
            queue_current: None,
            rng: SmallRng::from_entropy(),
            mode: AudioMode::Audio2d,
        })
    }

    /// Replace the player pool; only valid before anything plays
    #[must_use]
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool = ClipPlayerPool::new(capacity);
        self
    }

    /// The category tree
    pub fn tree(&self) -> &CategoryTree {
        &self.tree
    }

    /// Mutable tree access; call [`rebuild_triggers`](Self::rebuild_triggers)
    /// after structural edits
    pub fn tree_mut(&mut self) -> &mut CategoryTree {
        &mut self.tree
    }

    /// Refresh the trigger lookup table after tree edits
    pub fn rebuild_triggers(&mut self) {
        self.triggers = self.tree.leaf_table();
    }

    /// The clip cache, for registering sources
    pub fn cache_mut(&mut self) -> &mut ClipCache {
        &mut self.cache
    }

    /// Subscribe to playback lifecycle events
    pub fn subscribe(&mut self, handler: Box<dyn AudioEventHandler>) {
        self.events.subscribe(handler);
    }

    /// The positioning mode applied to new requests
    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    /// Change the positioning mode; running instances are unaffected
    pub fn set_mode(&mut self, mode: AudioMode) {
        self.mode = mode;
    }

    /// Pause or unpause the whole director.
    ///
    /// Freezes the audio clock, so auto-release countdowns and fades stop
    /// advancing; start delays keep running on game time.
    pub fn set_paused(&mut self, paused: bool) {
        self.clock.set_paused(paused);
        for index in self.pool.rented_indices() {
            let Some(player) = self.pool.get(index) else {
                continue;
            };
            if !player.started || player.paused {
                continue;
            }
            if let Some(sound) = player.sound {
                if paused {
                    self.backend.pause(sound);
                } else {
                    self.backend.resume(sound);
                }
            }
        }
    }

    /// Whether the director is globally paused
    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// Pause or unpause instances by bus.
    ///
    /// `include: None` matches every bus. Instances whose bus appears in
    /// `exclude` are left alone either way.
    pub fn set_group_paused(
        &mut self,
        paused: bool,
        include: Option<&[&str]>,
        exclude: &[&str],
    ) {
        for index in self.pool.rented_indices() {
            let Some(player) = self.pool.get_mut(index) else {
                continue;
            };
            let bus = player.bus.as_deref().unwrap_or("");
            if exclude.contains(&bus) {
                continue;
            }
            if let Some(include) = include {
                if !include.contains(&bus) {
                    continue;
                }
            }
            if player.paused == paused || !player.started {
                player.paused = paused;
                continue;
            }
            player.paused = paused;
            if let Some(sound) = player.sound {
                if paused {
                    self.backend.pause(sound);
                } else {
                    self.backend.resume(sound);
                }
            }
        }
    }

    /// Request playback of a trigger.
    ///
    /// Returns `None` when the request is denied (unknown trigger, cooldown,
    /// blocking, missing clip, exhausted pool); the denial is logged, never
    /// an error. A returned handle stays valid until the instance releases.
    pub fn play(&mut self, config: &PlayConfig) -> Option<ClipHandle> {
        if config.trigger.is_empty() {
            log::warn!("Ignoring playback request with an empty trigger");
            return None;
        }
        self.play_internal(config, false)
    }

    /// Enqueue a request; queued requests play one at a time in FIFO order,
    /// each starting when the previous one finishes
    pub fn play_queued(&mut self, config: PlayConfig) {
        self.queued.push_back(config);
    }

    fn play_internal(&mut self, config: &PlayConfig, is_fallback: bool) -> Option<ClipHandle> {
        let Some(&leaf_id) = self.triggers.get(&config.trigger) else {
            log::warn!("Unknown audio trigger '{}'", config.trigger);
            return self.play_missing_fallback(config, is_fallback);
        };

        let now = self.clock.game_time();
        if !config.start_paused && !self.cooldown.check(&self.tree, leaf_id, now) {
            log::debug!("Trigger '{}' denied by cooldown/blocking", config.trigger);
            return None;
        }

        let Some(category) = self.tree.get_mut(leaf_id) else {
            // Trigger table points at a node that has since been removed
            log::warn!(
                "Trigger '{}' maps to missing category {leaf_id}; trigger table is stale",
                config.trigger
            );
            return self.play_missing_fallback(config, is_fallback);
        };
        let clip_path = category.select_clip(&mut self.rng);
        let Some(clip_path) = clip_path else {
            log::warn!("Trigger '{}' has no clip to play", config.trigger);
            return self.play_missing_fallback(config, is_fallback);
        };

        let Some(clip) = self.cache.retain(&clip_path) else {
            return self.play_missing_fallback(config, is_fallback);
        };

        let Some(index) = self.pool.rent() else {
            self.cache.release(&clip_path);
            return None;
        };

        // Snapshot category configuration before handing it to the player
        let Some(category) = self.tree.get(leaf_id) else {
            log::error!("Category {leaf_id} vanished mid-play");
            self.cache.release(&clip_path);
            self.pool.return_player(index);
            return None;
        };
        let cat_volume = category.volume;
        let cat_pan = category.stereo_pan;
        let cat_looped = category.looped;
        let cat_pitch_rand = category.pitch_randomization;
        let enabled_filters = category.enabled_filters;
        let bank = category
            .filters
            .as_deref()
            .cloned()
            .unwrap_or_default();
        let bus = self.tree.closest_bus(leaf_id).map(str::to_owned);

        let volume = config.volume.unwrap_or(cat_volume);
        let looped = config.looped.unwrap_or(cat_looped);
        let delay = config.delay.unwrap_or(0.0).max(0.0);
        let base_pitch = config.reference.as_ref().map_or(1.0, |r| r.pitch);
        let amplitude = config.pitch_randomization.unwrap_or(cat_pitch_rand).abs();
        let pitch = if amplitude > 0.0 {
            base_pitch + self.rng.gen_range(-amplitude..=amplitude)
        } else {
            base_pitch
        };
        let pan = if matches!(self.mode, AudioMode::StereoControl) {
            cat_pan
        } else {
            0.0
        };
        let spatial = self.resolve_spatial(config);

        let length = clip.length_secs();
        let generation;
        {
            let Some(player) = self.pool.get_mut(index) else {
                self.cache.release(&clip_path);
                return None;
            };
            player.clip = Some(clip);
            player.clip_path = clip_path;
            player.category = leaf_id;
            player.trigger = config.trigger.clone();
            player.bus = bus;
            player.volume = volume;
            player.pitch = pitch;
            player.pan = pan;
            player.looped = looped;
            player.tracked = config.tracked.clone();
            player.position = config.position;
            player.spatial = spatial;
            player.start_delay = delay;

            if !looped {
                player.auto_release = true;
                player.release_game = delay;
                player.release_real = length + RELEASE_SLACK_SECS;
            }

            if enabled_filters.contains(FilterKind::FADE_IN) {
                player.fade_in = Some(bank.fade_in.clone());
            }
            if enabled_filters.contains(FilterKind::FADE_OUT) {
                player.fade_out = Some(bank.fade_out.clone());
            }
            copy_filter_slots(&mut player.filter_slots, enabled_filters, &bank);

            if config.start_paused {
                player.paused = true;
                player.start_deferred = true;
            }
            generation = player.generation;
        }

        if !config.start_paused {
            self.cooldown.update(&self.tree, leaf_id, now);
            if let Some(player) = self.pool.get_mut(index) {
                player.cooldown_consumed = true;
            }
            if delay <= 0.0 {
                self.start_playing(index);
            }
        }

        Some(ClipHandle::new(index, generation))
    }

    fn play_missing_fallback(
        &mut self,
        config: &PlayConfig,
        is_fallback: bool,
    ) -> Option<ClipHandle> {
        if is_fallback
            || !self.prefs.play_missing_sound
            || config.trigger == self.prefs.missing_sound_trigger
        {
            return None;
        }
        let fallback = PlayConfig::trigger(self.prefs.missing_sound_trigger.clone());
        self.play_internal(&fallback, true)
    }

    fn resolve_spatial(&self, config: &PlayConfig) -> Option<Spatial3d> {
        let mut spatial = if let Some(reference) = &config.reference {
            reference.to_spatial()
        } else {
            let wants_3d = config
                .in_3d
                .unwrap_or(matches!(self.mode, AudioMode::Audio3d));
            if !wants_3d {
                return None;
            }
            if matches!(self.mode, AudioMode::Audio3d) {
                self.prefs.default_3d
            } else {
                Spatial3d {
                    min_distance: 1.0,
                    max_distance: 500.0,
                    ..Spatial3d::default()
                }
            }
        };
        if let Some(min) = config.min_distance {
            spatial.min_distance = min;
        }
        if let Some(max) = config.max_distance {
            spatial.max_distance = max;
        }
        if let Some(rolloff) = config.rolloff {
            spatial.rolloff = rolloff;
        }
        Some(spatial)
    }

    fn start_playing(&mut self, index: usize) {
        let params;
        let trigger;
        {
            let Some(player) = self.pool.get_mut(index) else {
                return;
            };
            let Some(clip) = player.clip.clone() else {
                log::error!("Player {index} started without a clip configured");
                return;
            };
            let mut volume = player.volume;
            let mut pitch = player.pitch;
            if let Some(fade) = &player.fade_in {
                match fade.target {
                    FadeTarget::Volume => volume *= fade.curve.evaluate(0.0),
                    FadeTarget::Pitch => pitch *= fade.curve.evaluate(0.0),
                }
            }
            params = StartParams {
                volume,
                pitch,
                pan: player.pan,
                looped: player.looped,
                bus: player.bus.clone(),
                position: player
                    .tracked
                    .as_ref()
                    .map(|cell| cell.get())
                    .or(player.position),
                spatial: player.spatial,
            };
            trigger = player.trigger.clone();

            match self.backend.start_clip(&clip, &params) {
                Ok(sound) => {
                    player.sound = Some(sound);
                    player.started = true;
                    player.start_delay = 0.0;
                    player.release_game = 0.0;
                    if let Some(fade) = player.fade_in.take() {
                        player.active_fade = Some(ActiveFade {
                            params: fade,
                            elapsed: 0.0,
                            release_after: false,
                        });
                    }
                    if let Some(fade) = &player.fade_out {
                        let lead = player.clip_length() - fade.curve.duration();
                        if lead > 0.0 {
                            player.fade_out_countdown = Some(lead);
                        }
                    }
                    for waiter in player.waiting_started.drain(..) {
                        waiter.set(true);
                    }
                }
                Err(err) => {
                    log::error!("Failed to start '{trigger}': {err}");
                    self.release_player(index);
                    return;
                }
            }
        }
        self.events
            .publish(&AudioEvent::BeganPlaying { clip_id: trigger });
    }

    /// Stop a started instance and recycle its player slot. Safe to call
    /// with an already-released index.
    fn release_player(&mut self, index: usize) {
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        let trigger = std::mem::take(&mut player.trigger);
        let clip_path = std::mem::take(&mut player.clip_path);
        let category = player.category;
        let started = player.started;
        let cooldown_consumed = player.cooldown_consumed;
        let sound = player.sound.take();
        for waiter in player.waiting_started.drain(..) {
            waiter.set(true);
        }
        for waiter in player.waiting_finished.drain(..) {
            waiter.set(true);
        }

        if let Some(sound) = sound {
            self.backend.stop(sound);
        }
        if cooldown_consumed {
            self.cooldown.free(&self.tree, category);
        }
        if !clip_path.is_empty() {
            self.cache.release(&clip_path);
        }
        self.pool.return_player(index);

        if started {
            self.events
                .publish(&AudioEvent::StoppedPlaying { clip_id: trigger });
        }
    }

    /// Drive the director one tick.
    ///
    /// Advances clocks, resolves async cache loads, ticks start delays on
    /// game time and fades/auto-release countdowns on pausable audio time,
    /// follows tracked positions, and drains the play queue.
    pub fn update(&mut self, delta_time: f32) {
        self.clock.advance(delta_time);
        self.cache.update();
        self.backend.update();

        let audio_dt = if self.clock.is_paused() {
            0.0
        } else {
            delta_time
        };

        for index in self.pool.rented_indices() {
            self.update_player(index, delta_time, audio_dt);
        }
        self.drain_queue();
    }

    fn update_player(&mut self, index: usize, game_dt: f32, audio_dt: f32) {
        // Tracked emitters move even while countdowns are frozen
        if let Some(player) = self.pool.get(index) {
            if player.started {
                if let (Some(cell), Some(sound)) = (&player.tracked, player.sound) {
                    let position = cell.get();
                    self.backend.set_position(sound, position);
                }
            }
        }

        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        if !player.started {
            if player.start_deferred || player.paused {
                return;
            }
            player.start_delay -= game_dt;
            if player.start_delay <= 0.0 {
                self.start_playing(index);
            }
            return;
        }
        if player.paused {
            return;
        }

        // Fades run on pausable audio time
        let mut fade_updates: Option<(FadeTarget, f32)> = None;
        let mut release = false;
        if let Some(fade) = player.active_fade.as_mut() {
            fade.elapsed += audio_dt;
            let value = fade.params.curve.evaluate(fade.elapsed);
            fade_updates = Some((fade.params.target, value));
            if fade.elapsed >= fade.params.curve.duration() {
                release = fade.release_after;
                player.active_fade = None;
            }
        }
        if let Some(countdown) = player.fade_out_countdown.as_mut() {
            *countdown -= audio_dt;
            if *countdown <= 0.0 {
                player.fade_out_countdown = None;
                if let Some(fade) = player.fade_out.take() {
                    player.active_fade = Some(ActiveFade {
                        params: fade,
                        elapsed: 0.0,
                        release_after: true,
                    });
                }
            }
        }

        if player.auto_release && !release {
            if player.release_game > 0.0 {
                player.release_game -= game_dt;
            } else {
                player.release_real -= audio_dt;
                if player.release_real <= 0.0 {
                    release = true;
                }
            }
        }

        let base_volume = player.volume;
        let base_pitch = player.pitch;
        let sound = player.sound;
        if let (Some((target, value)), Some(sound)) = (fade_updates, sound) {
            match target {
                FadeTarget::Volume => self.backend.set_volume(sound, base_volume * value),
                FadeTarget::Pitch => self.backend.set_pitch(sound, base_pitch * value),
            }
        }
        if release {
            self.release_player(index);
        }
    }

    fn drain_queue(&mut self) {
        if let Some(token) = &self.queue_current {
            if !token.is_done() {
                return;
            }
            self.queue_current = None;
        }
        // One attempt per tick; a denied request is simply dropped and the
        // next one gets its chance on the following update
        if let Some(config) = self.queued.pop_front() {
            if let Some(handle) = self.play(&config) {
                self.queue_current = Some(self.wait_for_finished(handle));
            }
        }
    }

    fn resolve(&self, handle: ClipHandle) -> Option<usize> {
        let player = self.pool.get(handle.index)?;
        (player.generation == handle.generation).then_some(handle.index)
    }

    /// Stop an instance immediately and recycle its slot.
    ///
    /// Stale handles are ignored, like every handle operation.
    pub fn stop_and_release(&mut self, handle: ClipHandle) {
        if let Some(index) = self.resolve(handle) {
            self.release_player(index);
        }
    }

    /// Stop and recycle every live instance
    pub fn stop_all(&mut self) {
        for index in self.pool.rented_indices() {
            self.release_player(index);
        }
        self.queued.clear();
        self.queue_current = None;
    }

    /// Pause an instance, freezing its countdowns and fades
    pub fn pause(&mut self, handle: ClipHandle) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        player.paused = true;
        if let Some(sound) = player.sound {
            self.backend.pause(sound);
        }
    }

    /// Resume a paused instance.
    ///
    /// On an instance configured with `start_paused` that has never played,
    /// this performs the deferred start: the start delay begins counting
    /// from here. The deferred start does not consume a cooldown stamp.
    pub fn resume(&mut self, handle: ClipHandle) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        player.paused = false;
        if player.start_deferred && !player.started {
            player.start_deferred = false;
            if player.start_delay <= 0.0 {
                self.start_playing(index);
            }
            return;
        }
        if let Some(sound) = player.sound {
            self.backend.resume(sound);
        }
    }

    /// Whether the handle refers to a live, started, unpaused instance
    pub fn is_playing(&self, handle: ClipHandle) -> bool {
        self.resolve(handle)
            .and_then(|index| self.pool.get(index))
            .is_some_and(|player| player.started && !player.paused)
    }

    /// Set the instance volume; the change reaches the backend immediately
    /// when the sound has started
    pub fn set_volume(&mut self, handle: ClipHandle, volume: f32) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        player.volume = volume;
        if let Some(sound) = player.sound {
            self.backend.set_volume(sound, volume);
        }
    }

    /// Set the playback rate multiplier
    pub fn set_pitch(&mut self, handle: ClipHandle, pitch: f32) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        player.pitch = pitch;
        if let Some(sound) = player.sound {
            self.backend.set_pitch(sound, pitch);
        }
    }

    /// Set the stereo pan
    pub fn set_pan(&mut self, handle: ClipHandle, pan: f32) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        player.pan = pan;
        if let Some(sound) = player.sound {
            self.backend.set_pan(sound, pan);
        }
    }

    /// Ramp the instance's volume or pitch along `params.curve`, optionally
    /// releasing the instance when the ramp completes.
    ///
    /// The ramp runs on pausable audio time and replaces any fade already in
    /// flight, including a pending category fade-out. The instance's base
    /// volume/pitch stays untouched; the curve value multiplies it each tick.
    pub fn fade(&mut self, handle: ClipHandle, params: FadeParams, release_when_done: bool) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        if params.curve.is_empty() {
            log::warn!("Fade with an empty curve on '{}'", player.trigger);
            return;
        }
        player.fade_out_countdown = None;
        player.active_fade = Some(ActiveFade {
            params,
            elapsed: 0.0,
            release_after: release_when_done,
        });
    }

    /// Change looping. Disabling a loop starts the auto-release countdown
    /// from the full clip length; enabling one on a started instance only
    /// affects bookkeeping, the backend sound keeps its original mode.
    pub fn set_looping(&mut self, handle: ClipHandle, looped: bool) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        if player.looped == looped {
            return;
        }
        if player.started {
            log::debug!("Loop mode change on a started instance only affects release timing");
        }
        player.looped = looped;
        if looped {
            player.auto_release = false;
        } else {
            player.auto_release = true;
            player.release_game = 0.0;
            player.release_real = player.clip_length() + RELEASE_SLACK_SECS;
        }
    }

    /// Length of the instance's clip in seconds; zero (logged) for a stale
    /// handle or an unknown-length clip
    pub fn clip_length(&self, handle: ClipHandle) -> f32 {
        match self.resolve(handle).and_then(|index| self.pool.get(index)) {
            Some(player) => player.clip_length(),
            None => {
                log::warn!("clip_length on a stale handle");
                0.0
            }
        }
    }

    /// Toggle one of the instance's effect filters; parameters persist
    /// across disable/enable
    pub fn set_filter_enabled(&mut self, handle: ClipHandle, kind: FilterKind, enabled: bool) {
        let Some(index) = self.resolve(handle) else {
            return;
        };
        let Some(player) = self.pool.get_mut(index) else {
            return;
        };
        let bank = FilterBank::default();
        if let Some(slot) = player.filter_slots.get_mut(&kind) {
            slot.enabled = enabled;
        } else if enabled {
            if let Some(params) = default_filter_params(kind, &bank) {
                player.filter_slots.insert(
                    kind,
                    FilterSlot {
                        enabled: true,
                        params,
                    },
                );
            }
        }
    }

    /// Whether one of the instance's effect filters is enabled
    pub fn filter_enabled(&self, handle: ClipHandle, kind: FilterKind) -> bool {
        self.resolve(handle)
            .and_then(|index| self.pool.get(index))
            .and_then(|player| player.filter_slots.get(&kind))
            .is_some_and(|slot| slot.enabled)
    }

    /// Token that flips once the instance's backend sound starts.
    ///
    /// Already-started instances and stale handles yield a signalled token.
    pub fn wait_for_started(&mut self, handle: ClipHandle) -> WaitToken {
        let Some(index) = self.resolve(handle) else {
            return WaitToken::signalled();
        };
        let Some(player) = self.pool.get_mut(index) else {
            return WaitToken::signalled();
        };
        if player.started {
            return WaitToken::signalled();
        }
        let token = WaitToken::new();
        player.waiting_started.push(std::rc::Rc::clone(&token.0));
        token
    }

    /// Token that flips once the instance is released.
    ///
    /// Stale handles yield a signalled token.
    pub fn wait_for_finished(&mut self, handle: ClipHandle) -> WaitToken {
        let Some(index) = self.resolve(handle) else {
            return WaitToken::signalled();
        };
        let Some(player) = self.pool.get_mut(index) else {
            return WaitToken::signalled();
        };
        let token = WaitToken::new();
        player.waiting_finished.push(std::rc::Rc::clone(&token.0));
        token
    }

    /// Load every clip under a trigger prefix into the cache.
    ///
    /// The prefix is the part of a trigger id before the first underscore,
    /// matched case-insensitively. A `Preloaded` event fires even when the
    /// prefix matches nothing, so loading screens can await it blindly.
    pub fn preload(&mut self, prefix: &str) {
        let prefix = prefix.to_uppercase();
        let mut retained = Vec::new();
        if let Some(leaf_ids) = self.tree.leaves_by_prefix().get(&prefix) {
            for &leaf_id in leaf_ids {
                let paths: Vec<String> = self
                    .tree
                    .get(leaf_id)
                    .map(|cat| cat.audio_data.iter().flatten().cloned().collect())
                    .unwrap_or_default();
                for path in paths {
                    if self.cache.retain(&path).is_some() {
                        retained.push(path);
                    }
                }
            }
        }
        self.preloaded
            .entry(prefix.clone())
            .or_default()
            .extend(retained);
        self.events.publish(&AudioEvent::Preloaded { prefix });
    }

    /// Release the clips a matching [`preload`](Self::preload) retained
    pub fn unload(&mut self, prefix: &str) {
        let prefix = prefix.to_uppercase();
        if let Some(paths) = self.preloaded.remove(&prefix) {
            for path in paths {
                self.cache.release(&path);
            }
        }
        self.events.publish(&AudioEvent::Unloaded { prefix });
    }

    /// Stop everything and shut the backend down
    pub fn shutdown(&mut self) {
        self.stop_all();
        self.cache.clear_all();
        self.backend.shutdown();
    }
}

fn copy_filter_slots(
    slots: &mut HashMap<FilterKind, FilterSlot>,
    enabled: FilterKind,
    bank: &FilterBank,
) {
    for (kind, params) in [
        (FilterKind::LOW_PASS, FilterParams::LowPass(bank.low_pass)),
        (FilterKind::HIGH_PASS, FilterParams::HighPass(bank.high_pass)),
        (FilterKind::REVERB, FilterParams::Reverb(bank.reverb)),
        (FilterKind::ECHO, FilterParams::Echo(bank.echo)),
        (
            FilterKind::DISTORTION,
            FilterParams::Distortion(bank.distortion),
        ),
        (FilterKind::CHORUS, FilterParams::Chorus(bank.chorus)),
    ] {
        if enabled.contains(kind) {
            slots.insert(
                kind,
                FilterSlot {
                    enabled: true,
                    params,
                },
            );
        }
    }
}

fn default_filter_params(kind: FilterKind, bank: &FilterBank) -> Option<FilterParams> {
    if kind == FilterKind::LOW_PASS {
        Some(FilterParams::LowPass(bank.low_pass))
    } else if kind == FilterKind::HIGH_PASS {
        Some(FilterParams::HighPass(bank.high_pass))
    } else if kind == FilterKind::REVERB {
        Some(FilterParams::Reverb(bank.reverb))
    } else if kind == FilterKind::ECHO {
        Some(FilterParams::Echo(bank.echo))
    } else if kind == FilterKind::DISTORTION {
        Some(FilterParams::Distortion(bank.distortion))
    } else if kind == FilterKind::CHORUS {
        Some(FilterParams::Chorus(bank.chorus))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::backend::NullBackend;
    use crate::cache::{AudioClip, MemorySource};

    use super::*;

    fn base_tree() -> CategoryTree {
        let mut tree = CategoryTree::new(Category::new("Master", 1));
        tree.add_child(1, Category::new("SFX", 2));
        let mut boom = Category::new("SFX_Boom", 3);
        boom.push_clip("boom.wav", 1);
        tree.add_child(2, boom);
        tree
    }

    fn director_with(tree: CategoryTree, clips: &[(&str, f32)]) -> AudioDirector {
        crate::logging::try_init();
        let mut source = MemorySource::new();
        for (path, length) in clips {
            source.insert(AudioClip::with_length(*path, vec![0u8; 8], *length));
        }
        let mut director = AudioDirector::with_tree(
            tree,
            AudioPreferences::default(),
            Box::new(NullBackend::new()),
        )
        .unwrap();
        director.cache_mut().add_source(Box::new(source));
        director
    }

    fn boom_director(length: f32) -> AudioDirector {
        director_with(base_tree(), &[("boom.wav", length)])
    }

    #[test]
    fn test_play_starts_immediately() {
        let mut director = boom_director(1.0);
        let handle = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        assert!(director.is_playing(handle));
        assert_eq!(director.pool.rented_count(), 1);
        assert!(director.cache.resident("boom.wav"));
    }

    #[test]
    fn test_unknown_trigger_returns_none() {
        let mut director = boom_director(1.0);
        assert!(director.play(&PlayConfig::trigger("Nope")).is_none());
        assert_eq!(director.pool.rented_count(), 0);
    }

    #[test]
    fn test_auto_release_after_clip_length() {
        let mut director = boom_director(1.0);
        let handle = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();

        director.update(0.5);
        assert!(director.is_playing(handle));

        // Past length + slack
        director.update(0.7);
        assert!(!director.is_playing(handle));
        assert_eq!(director.pool.rented_count(), 0);
        assert!(!director.cache.resident("boom.wav"));
    }

    #[test]
    fn test_looped_instance_never_auto_releases() {
        let mut director = boom_director(1.0);
        let handle = director
            .play(&PlayConfig::trigger("SFX_Boom").with_looped(true))
            .unwrap();
        director.update(100.0);
        assert!(director.is_playing(handle));
    }

    #[test]
    fn test_cooldown_denies_then_allows() {
        let mut tree = base_tree();
        tree.get_mut(3).unwrap().next_allowed_delay = 2.0;
        let mut director = director_with(tree, &[("boom.wav", 10.0)]);

        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_some());
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_none());

        director.update(1.0);
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_none());

        director.update(1.2);
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_some());
    }

    #[test]
    fn test_blocking_category_denies_until_release() {
        let mut tree = base_tree();
        tree.add_child(1, Category::new("VO", 4));
        let mut line = Category::new("VO_Line", 5);
        line.push_clip("line.wav", 1);
        tree.add_child(4, line);
        tree.get_mut(2).unwrap().blocked_by = vec![4];
        let mut director =
            director_with(tree, &[("boom.wav", 10.0), ("line.wav", 10.0)]);

        let vo = director.play(&PlayConfig::trigger("VO_Line")).unwrap();
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_none());

        director.stop_and_release(vo);
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_some());
    }

    #[test]
    fn test_missing_fallback_plays_designated_trigger() {
        let mut tree = base_tree();
        let mut missing = Category::new("GEN_Missing_Sound", 4);
        missing.push_clip("missing.wav", 1);
        tree.add_child(1, missing);
        let mut director =
            director_with(tree, &[("boom.wav", 1.0), ("missing.wav", 1.0)]);
        director.prefs.play_missing_sound = true;

        let handle = director.play(&PlayConfig::trigger("Nope")).unwrap();
        assert!(director.is_playing(handle));
        assert!(director.cache.resident("missing.wav"));
    }

    #[test]
    fn test_stale_trigger_table_routes_to_fallback() {
        let mut tree = base_tree();
        let mut missing = Category::new("GEN_Missing_Sound", 4);
        missing.push_clip("missing.wav", 1);
        tree.add_child(1, missing);
        let mut director =
            director_with(tree, &[("boom.wav", 1.0), ("missing.wav", 1.0)]);
        director.prefs.play_missing_sound = true;

        // A table entry left behind by tree edits, pointing at no category
        director.triggers.insert("SFX_Ghost".into(), 999);
        let handle = director.play(&PlayConfig::trigger("SFX_Ghost")).unwrap();
        assert!(director.is_playing(handle));
        assert!(director.cache.resident("missing.wav"));
        assert!(!director.cache.resident("boom.wav"));
    }

    #[test]
    fn test_missing_fallback_never_recurses() {
        let mut director = boom_director(1.0);
        director.prefs.play_missing_sound = true;
        // Fallback trigger itself does not exist; must not loop or panic
        assert!(director.play(&PlayConfig::trigger("Nope")).is_none());
        assert!(director
            .play(&PlayConfig::trigger("GEN_Missing_Sound"))
            .is_none());
    }

    #[test]
    fn test_stale_handle_operations_are_noops() {
        let mut director = boom_director(1.0);
        let handle = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        director.stop_and_release(handle);

        director.pause(handle);
        director.resume(handle);
        director.set_volume(handle, 0.2);
        director.set_pitch(handle, 2.0);
        assert!(!director.is_playing(handle));
        assert!((director.clip_length(handle) - 0.0).abs() < f32::EPSILON);
        assert!(director.wait_for_finished(handle).is_done());
    }

    #[test]
    fn test_recycled_slot_invalidates_old_handle() {
        let mut director = boom_director(10.0);
        let first = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        director.stop_and_release(first);
        let second = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        assert_eq!(first.index, second.index);
        assert!(!director.is_playing(first));
        assert!(director.is_playing(second));
    }

    #[test]
    fn test_delayed_start() {
        let mut director = boom_director(1.0);
        let handle = director
            .play(&PlayConfig::trigger("SFX_Boom").with_delay(0.5))
            .unwrap();
        assert!(!director.is_playing(handle));

        director.update(0.3);
        assert!(!director.is_playing(handle));

        director.update(0.3);
        assert!(director.is_playing(handle));
    }

    #[test]
    fn test_start_paused_skips_cooldown_until_resume() {
        let mut tree = base_tree();
        tree.get_mut(3).unwrap().next_allowed_delay = 5.0;
        let mut director = director_with(tree, &[("boom.wav", 10.0)]);

        let deferred = director
            .play(&PlayConfig::trigger("SFX_Boom").paused())
            .unwrap();
        assert!(!director.is_playing(deferred));

        // The paused instance consumed no cooldown stamp
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_some());

        director.resume(deferred);
        assert!(director.is_playing(deferred));
    }

    #[test]
    fn test_pool_exhaustion_denies() {
        let mut director = boom_director(10.0).with_pool_capacity(1);
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_some());
        assert!(director.play(&PlayConfig::trigger("SFX_Boom")).is_none());
        // The denied request must not leak a cache retain
        assert_eq!(director.cache.usages("boom.wav"), 1);
    }

    #[test]
    fn test_queued_requests_play_in_order() {
        let mut director = boom_director(1.0);
        director.play_queued(PlayConfig::trigger("SFX_Boom"));
        director.play_queued(PlayConfig::trigger("SFX_Boom"));

        director.update(0.0);
        assert_eq!(director.pool.rented_count(), 1);

        // Second stays queued until the first finishes
        director.update(0.5);
        assert_eq!(director.pool.rented_count(), 1);
        assert_eq!(director.queued.len(), 1);

        // First releases this tick; the queue drains the second right after
        director.update(0.7);
        assert_eq!(director.pool.rented_count(), 1);
        assert!(director.queued.is_empty());

        director.update(1.2);
        assert_eq!(director.pool.rented_count(), 0);
    }

    #[test]
    fn test_global_pause_freezes_release() {
        let mut director = boom_director(1.0);
        let handle = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();

        director.set_paused(true);
        director.update(5.0);
        assert_eq!(director.pool.rented_count(), 1);

        director.set_paused(false);
        assert!(director.is_playing(handle));
        director.update(1.2);
        assert!(!director.is_playing(handle));
    }

    #[test]
    fn test_instance_pause_freezes_release() {
        let mut director = boom_director(1.0);
        let handle = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        director.pause(handle);
        director.update(5.0);
        assert!(!director.is_playing(handle));
        assert_eq!(director.pool.rented_count(), 1);

        director.resume(handle);
        director.update(1.2);
        assert_eq!(director.pool.rented_count(), 0);
    }

    #[test]
    fn test_events_began_and_stopped() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut director = boom_director(1.0);
        {
            let seen = Rc::clone(&seen);
            director.subscribe(Box::new(move |event: &AudioEvent| {
                seen.borrow_mut().push(event.clone());
            }));
        }

        director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        director.update(1.2);

        let seen = seen.borrow();
        assert_eq!(
            seen.as_slice(),
            &[
                AudioEvent::BeganPlaying {
                    clip_id: "SFX_Boom".into()
                },
                AudioEvent::StoppedPlaying {
                    clip_id: "SFX_Boom".into()
                },
            ]
        );
    }

    #[test]
    fn test_preload_and_unload() {
        let mut director = boom_director(1.0);
        director.preload("sfx");
        assert!(director.cache.resident("boom.wav"));

        director.unload("SFX");
        assert!(!director.cache.resident("boom.wav"));
    }

    #[test]
    fn test_preload_unknown_prefix_still_fires_event() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut director = boom_director(1.0);
        {
            let seen = Rc::clone(&seen);
            director.subscribe(Box::new(move |event: &AudioEvent| {
                seen.borrow_mut().push(event.clone());
            }));
        }
        director.preload("bogus");
        assert_eq!(
            seen.borrow().as_slice(),
            &[AudioEvent::Preloaded {
                prefix: "BOGUS".into()
            }]
        );
    }

    #[test]
    fn test_wait_tokens() {
        let mut director = boom_director(1.0);
        let handle = director
            .play(&PlayConfig::trigger("SFX_Boom").with_delay(0.5))
            .unwrap();
        let started = director.wait_for_started(handle);
        let finished = director.wait_for_finished(handle);
        assert!(!started.is_done());
        assert!(!finished.is_done());

        director.update(0.6);
        assert!(started.is_done());
        assert!(!finished.is_done());

        director.update(1.2);
        assert!(finished.is_done());
    }

    #[test]
    fn test_volume_override_beats_category() {
        let mut tree = base_tree();
        tree.get_mut(3).unwrap().volume = 0.8;
        let mut director = director_with(tree, &[("boom.wav", 1.0)]);

        let handle = director
            .play(&PlayConfig::trigger("SFX_Boom").with_volume(0.25))
            .unwrap();
        let index = director.resolve(handle).unwrap();
        assert!((director.pool.get(index).unwrap().volume - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_group_pause_by_bus() {
        let mut tree = base_tree();
        tree.get_mut(2).unwrap().default_bus = Some("sfx-bus".into());
        tree.add_child(1, {
            let mut music = Category::new("Music", 4);
            music.default_bus = Some("music-bus".into());
            music
        });
        let mut track = Category::new("MUS_Theme", 5);
        track.push_clip("theme.wav", 1);
        tree.add_child(4, track);
        let mut director =
            director_with(tree, &[("boom.wav", 10.0), ("theme.wav", 10.0)]);

        let boom = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        let theme = director.play(&PlayConfig::trigger("MUS_Theme")).unwrap();

        director.set_group_paused(true, Some(&["sfx-bus"]), &[]);
        assert!(!director.is_playing(boom));
        assert!(director.is_playing(theme));

        director.set_group_paused(false, None, &["music-bus"]);
        assert!(director.is_playing(boom));
        assert!(director.is_playing(theme));
    }

    /// Forwards to a shared [`NullBackend`] so tests can inspect what the
    /// director sent down
    struct SharedBackend(Rc<RefCell<NullBackend>>);

    impl AudioBackend for SharedBackend {
        fn initialize(&mut self, config: &BackendConfig) -> Result<(), AudioError> {
            self.0.borrow_mut().initialize(config)
        }
        fn shutdown(&mut self) {
            self.0.borrow_mut().shutdown();
        }
        fn is_initialized(&self) -> bool {
            self.0.borrow().is_initialized()
        }
        fn update(&mut self) {
            self.0.borrow_mut().update();
        }
        fn start_clip(
            &mut self,
            clip: &std::sync::Arc<AudioClip>,
            params: &StartParams,
        ) -> Result<crate::backend::SoundHandle, AudioError> {
            self.0.borrow_mut().start_clip(clip, params)
        }
        fn pause(&mut self, handle: crate::backend::SoundHandle) {
            self.0.borrow_mut().pause(handle);
        }
        fn resume(&mut self, handle: crate::backend::SoundHandle) {
            self.0.borrow_mut().resume(handle);
        }
        fn stop(&mut self, handle: crate::backend::SoundHandle) {
            self.0.borrow_mut().stop(handle);
        }
        fn stop_all(&mut self) {
            self.0.borrow_mut().stop_all();
        }
        fn set_volume(&mut self, handle: crate::backend::SoundHandle, volume: f32) {
            self.0.borrow_mut().set_volume(handle, volume);
        }
        fn set_pitch(&mut self, handle: crate::backend::SoundHandle, pitch: f32) {
            self.0.borrow_mut().set_pitch(handle, pitch);
        }
        fn set_pan(&mut self, handle: crate::backend::SoundHandle, pan: f32) {
            self.0.borrow_mut().set_pan(handle, pan);
        }
        fn set_position(&mut self, handle: crate::backend::SoundHandle, position: [f32; 3]) {
            self.0.borrow_mut().set_position(handle, position);
        }
        fn is_playing(&self, handle: crate::backend::SoundHandle) -> bool {
            self.0.borrow().is_playing(handle)
        }
    }

    #[test]
    fn test_tracked_position_follows_cell() {
        let shared = Rc::new(RefCell::new(NullBackend::new()));
        let mut source = MemorySource::new();
        source.insert(AudioClip::with_length("boom.wav", vec![0u8; 8], 10.0));
        let mut director = AudioDirector::with_tree(
            base_tree(),
            AudioPreferences::default(),
            Box::new(SharedBackend(Rc::clone(&shared))),
        )
        .unwrap();
        director.cache_mut().add_source(Box::new(source));

        let cell: crate::config::SharedPosition =
            Rc::new(std::cell::Cell::new([0.0, 0.0, 0.0]));
        let handle = director
            .play(&PlayConfig::trigger("SFX_Boom").with_tracked(Rc::clone(&cell)))
            .unwrap();
        cell.set([3.0, 0.0, 4.0]);
        director.update(0.1);

        let index = director.resolve(handle).unwrap();
        let sound = director.pool.get(index).unwrap().sound.unwrap();
        let backend = shared.borrow();
        assert_eq!(
            backend.sound_state(sound).unwrap().position,
            Some([3.0, 0.0, 4.0])
        );
    }

    #[test]
    fn test_fade_out_directive_releases_when_done() {
        let mut director = boom_director(10.0);
        let handle = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();

        director.fade(
            handle,
            FadeParams {
                curve: crate::filters::FadeCurve::linear(1.0, 0.0, 0.5),
                target: FadeTarget::Volume,
            },
            true,
        );
        director.update(0.25);
        assert_eq!(director.pool.rented_count(), 1);
        director.update(0.3);
        assert_eq!(director.pool.rented_count(), 0);
        assert!(director.resolve(handle).is_none());
    }

    #[test]
    fn test_fade_ignores_stale_handle() {
        let mut director = boom_director(10.0);
        let handle = director.play(&PlayConfig::trigger("SFX_Boom")).unwrap();
        director.stop_and_release(handle);

        director.fade(handle, FadeParams::default(), true);
        director.update(2.0);
        assert_eq!(director.pool.rented_count(), 0);
    }
}
