//! Audio event bus
//!
//! Playback milestones are published as typed events to registered
//! handlers. Delivery is synchronous and fire-and-forget; handlers cannot
//! veto or reorder anything.

/// A playback or cache lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    /// A clip started producing audio
    BeganPlaying {
        /// Trigger id of the leaf category that played
        clip_id: String,
    },
    /// A clip stopped, whether it finished or was cut off
    StoppedPlaying {
        /// Trigger id of the leaf category that played
        clip_id: String,
    },
    /// Clips under a trigger prefix were loaded into the cache
    Preloaded {
        /// Uppercased trigger prefix
        prefix: String,
    },
    /// Preloaded clips under a trigger prefix were released
    Unloaded {
        /// Uppercased trigger prefix
        prefix: String,
    },
}

/// Receiver of [`AudioEvent`]s
pub trait AudioEventHandler {
    /// Called for every published event
    fn on_audio_event(&mut self, event: &AudioEvent);
}

impl<F: FnMut(&AudioEvent)> AudioEventHandler for F {
    fn on_audio_event(&mut self, event: &AudioEvent) {
        self(event);
    }
}

/// Synchronous pub/sub dispatcher for audio events
#[derive(Default)]
pub struct AudioEventBus {
    handlers: Vec<Box<dyn AudioEventHandler>>,
}

impl AudioEventBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it stays subscribed for the bus's lifetime
    pub fn subscribe(&mut self, handler: Box<dyn AudioEventHandler>) {
        self.handlers.push(handler);
    }

    /// Deliver an event to every subscriber in registration order
    pub fn publish(&mut self, event: &AudioEvent) {
        log::trace!("Audio event: {event:?}");
        for handler in &mut self.handlers {
            handler.on_audio_event(event);
        }
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the bus has no subscribers
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
