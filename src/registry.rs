//! Named director registry
//!
//! Applications that run several independent audio setups (menu vs. game,
//! split-screen players) register each director under a name and look it
//! up where it is needed, instead of reaching for a global.

use std::collections::HashMap;

use crate::director::AudioDirector;

/// Owns named [`AudioDirector`]s
#[derive(Default)]
pub struct DirectorRegistry {
    directors: HashMap<String, AudioDirector>,
}

impl DirectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a director under `name`, replacing (and logging) any
    /// previous holder of the name
    pub fn register(&mut self, name: impl Into<String>, director: AudioDirector) {
        let name = name.into();
        if self.directors.insert(name.clone(), director).is_some() {
            log::warn!("Replacing audio director registered as '{name}'");
        }
    }

    /// Look up a director by name
    pub fn get(&self, name: &str) -> Option<&AudioDirector> {
        self.directors.get(name)
    }

    /// Look up a director mutably by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut AudioDirector> {
        self.directors.get_mut(name)
    }

    /// Remove and return a director
    pub fn remove(&mut self, name: &str) -> Option<AudioDirector> {
        self.directors.remove(name)
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.directors.keys().map(String::as_str)
    }

    /// Number of registered directors
    pub fn len(&self) -> usize {
        self.directors.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.directors.is_empty()
    }
}
