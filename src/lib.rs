//! # Audio Director
//!
//! Category-driven audio middleware: sounds are authored as a tree of
//! categories with inherited buses, cooldowns, and blocking rules, and
//! triggered by string id. The library handles weighted anti-repeat clip
//! selection, reference-counted clip caching, pooled playback instances,
//! start delays, fades, and automatic release.
//!
//! ## Quick Start
//!
//! ```rust
//! use audio_director::prelude::*;
//!
//! // Author a tree: Master -> SFX -> SFX_Explosion with two clips
//! let mut tree = CategoryTree::new(Category::new("Master", 1));
//! tree.add_child(1, Category::new("SFX", 2));
//! let mut explosion = Category::new("SFX_Explosion", 3);
//! explosion.push_clip("explosion_a.wav", 3);
//! explosion.push_clip("explosion_b.wav", 1);
//! explosion.sound_randomization = true;
//! tree.add_child(2, explosion);
//!
//! let mut director = AudioDirector::with_tree(
//!     tree,
//!     AudioPreferences::default(),
//!     Box::new(NullBackend::new()),
//! )?;
//! director.cache_mut().add_source(Box::new(FileSource::new("assets/audio")));
//!
//! // Trigger by id; denials (cooldown, missing clip) come back as None
//! if let Some(handle) = director.play(&PlayConfig::trigger("SFX_Explosion")) {
//!     director.set_volume(handle, 0.8);
//! }
//!
//! // Once per frame
//! director.update(1.0 / 60.0);
//! # Ok::<(), audio_director::AudioError>(())
//! ```

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod director;
pub mod error;
pub mod events;
pub mod filters;
pub mod handle;
pub mod logging;
pub mod player;
pub mod registry;
pub mod spatial;
pub mod tree;

pub use director::AudioDirector;
pub use error::AudioError;
pub use handle::ClipHandle;

/// Common imports for library users
pub mod prelude {
    pub use crate::{
        backend::{AudioBackend, BackendConfig, NullBackend},
        cache::{AudioClip, ClipCache, ClipSource, FileSource, MemorySource},
        config::{AudioPreferences, PlayConfig, SharedPosition},
        director::AudioDirector,
        error::AudioError,
        events::{AudioEvent, AudioEventHandler},
        filters::{FadeCurve, FadeParams, FilterKind},
        handle::ClipHandle,
        player::WaitToken,
        registry::DirectorRegistry,
        spatial::{AudioMode, RolloffMode, SourceSettings, Spatial3d, StereoSide},
        tree::{persist, Category, CategoryTree},
    };

    #[cfg(feature = "rodio-backend")]
    pub use crate::backend::RodioBackend;
}
