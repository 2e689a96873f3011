//! Reference-counted clip cache
//!
//! Clips are loaded through pluggable [`ClipSource`]s and shared as
//! `Arc<AudioClip>`. Every retain must be paired with a release; a clip is
//! evicted when its usage count drops to zero. An async retain path queues
//! the load and resolves it on a later [`ClipCache::update`] tick.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

/// Audio container format, detected from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipFormat {
    /// RIFF/WAVE
    Wav,
    /// Ogg container (Vorbis)
    Ogg,
    /// FLAC
    Flac,
    /// MPEG layer 3, with or without an ID3 tag
    Mp3,
    /// Unrecognized container
    Unknown,
}

impl ClipFormat {
    /// Detect the container format from the first bytes of a file
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return Self::Unknown;
        }
        match &bytes[0..4] {
            b"RIFF" => Self::Wav,
            b"OggS" => Self::Ogg,
            b"fLaC" => Self::Flac,
            [0xFF, 0xFB, _, _] | [0xFF, 0xFA, _, _] => Self::Mp3,
            [b'I', b'D', b'3', _] => Self::Mp3,
            _ => Self::Unknown,
        }
    }
}

/// An immutable, shareable audio clip
#[derive(Debug, Clone)]
pub struct AudioClip {
    path: String,
    data: Vec<u8>,
    length_secs: f32,
    format: ClipFormat,
}

impl AudioClip {
    /// Wrap raw file bytes, probing the format and length.
    ///
    /// Length is only probed for WAV data; other formats report zero, which
    /// callers treat as "unknown" when scheduling releases.
    pub fn from_bytes(path: impl Into<String>, data: Vec<u8>) -> Self {
        let format = ClipFormat::detect(&data);
        let length_secs = match format {
            ClipFormat::Wav => probe_wav_length(&data).unwrap_or(0.0),
            _ => 0.0,
        };
        Self {
            path: path.into(),
            data,
            length_secs,
            format,
        }
    }

    /// Build a clip with an explicit length, for sources that know it
    pub fn with_length(path: impl Into<String>, data: Vec<u8>, length_secs: f32) -> Self {
        let format = ClipFormat::detect(&data);
        Self {
            path: path.into(),
            data,
            length_secs,
            format,
        }
    }

    /// The path this clip was loaded under
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Clip length in seconds, zero when unknown
    pub fn length_secs(&self) -> f32 {
        self.length_secs
    }

    /// Detected container format
    pub fn format(&self) -> ClipFormat {
        self.format
    }
}

fn probe_wav_length(data: &[u8]) -> Option<f32> {
    let reader = hound::WavReader::new(Cursor::new(data)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f32 / spec.sample_rate as f32)
}

/// A provider of clip bytes, queried by path
pub trait ClipSource {
    /// Human-readable source name, for logging
    fn name(&self) -> &str;

    /// Load the clip at `path`, or `None` if this source does not have it
    fn load(&mut self, path: &str) -> Option<Arc<AudioClip>>;
}

/// Loads clips from files under a root directory
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    /// Create a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ClipSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&mut self, path: &str) -> Option<Arc<AudioClip>> {
        let full = self.root.join(path);
        match fs::read(&full) {
            Ok(bytes) => Some(Arc::new(AudioClip::from_bytes(path, bytes))),
            Err(err) => {
                log::debug!("File source could not read {}: {err}", full.display());
                None
            }
        }
    }
}

/// In-memory source, mainly for tests and procedurally generated clips
#[derive(Default)]
pub struct MemorySource {
    clips: HashMap<String, Arc<AudioClip>>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip under a path
    pub fn insert(&mut self, clip: AudioClip) {
        self.clips.insert(clip.path().to_owned(), Arc::new(clip));
    }
}

impl ClipSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&mut self, path: &str) -> Option<Arc<AudioClip>> {
        self.clips.get(path).cloned()
    }
}

/// Token for an async retain in flight; redeem with [`ClipCache::take_result`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetainTicket(u64);

/// Outcome of an async retain
#[derive(Debug, Clone)]
pub enum AsyncLoad {
    /// The load has not resolved yet
    Pending,
    /// The clip is resident and retained
    Ready(Arc<AudioClip>),
    /// No source could provide the clip; nothing was retained
    NotFound,
}

struct CacheEntry {
    clip: Arc<AudioClip>,
    usages: i32,
}

/// Reference-counted store of loaded clips.
///
/// Lookup order on a miss: additional sources in registration order, then
/// the main source. A repeated retain of a resident clip only bumps the
/// usage count.
#[derive(Default)]
pub struct ClipCache {
    main: Option<Box<dyn ClipSource>>,
    additional: Vec<Box<dyn ClipSource>>,
    entries: HashMap<String, CacheEntry>,
    pending: Vec<(RetainTicket, String)>,
    results: HashMap<RetainTicket, AsyncLoad>,
    next_ticket: u64,
}

impl ClipCache {
    /// Create a cache with a main source
    pub fn new(main: Box<dyn ClipSource>) -> Self {
        Self {
            main: Some(main),
            ..Self::default()
        }
    }

    /// Create a cache with no sources; every retain misses
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register an extra source consulted before the main one
    pub fn add_source(&mut self, source: Box<dyn ClipSource>) {
        self.additional.push(source);
    }

    /// Retain a clip, loading it if it is not resident.
    ///
    /// Returns `None` (logged) when no source can provide the path.
    pub fn retain(&mut self, path: &str) -> Option<Arc<AudioClip>> {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.usages += 1;
            return Some(Arc::clone(&entry.clip));
        }
        let clip = self.load_from_sources(path)?;
        self.entries.insert(
            path.to_owned(),
            CacheEntry {
                clip: Arc::clone(&clip),
                usages: 1,
            },
        );
        Some(clip)
    }

    fn load_from_sources(&mut self, path: &str) -> Option<Arc<AudioClip>> {
        for source in &mut self.additional {
            if let Some(clip) = source.load(path) {
                log::debug!("Loaded '{path}' from {} source", source.name());
                return Some(clip);
            }
        }
        if let Some(main) = self.main.as_mut() {
            if let Some(clip) = main.load(path) {
                return Some(clip);
            }
        }
        log::warn!("No clip source could provide '{path}'");
        None
    }

    /// Drop one usage of a clip, evicting it at zero.
    ///
    /// Releasing a path that is not resident is a bookkeeping bug in the
    /// caller; it is logged and ignored.
    pub fn release(&mut self, path: &str) {
        let Some(entry) = self.entries.get_mut(path) else {
            log::warn!("Released clip '{path}' that is not in the cache");
            return;
        };
        entry.usages -= 1;
        if entry.usages <= 0 {
            self.entries.remove(path);
        }
    }

    /// Queue a retain that resolves on a later [`update`](Self::update) tick
    pub fn retain_async(&mut self, path: &str) -> RetainTicket {
        let ticket = RetainTicket(self.next_ticket);
        self.next_ticket += 1;
        self.pending.push((ticket, path.to_owned()));
        self.results.insert(ticket, AsyncLoad::Pending);
        ticket
    }

    /// Resolve queued async retains
    pub fn update(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (ticket, path) in pending {
            let outcome = match self.retain(&path) {
                Some(clip) => AsyncLoad::Ready(clip),
                None => AsyncLoad::NotFound,
            };
            self.results.insert(ticket, outcome);
        }
    }

    /// Check an async retain; a resolved result is consumed on read
    pub fn take_result(&mut self, ticket: RetainTicket) -> AsyncLoad {
        match self.results.get(&ticket) {
            Some(AsyncLoad::Pending) => AsyncLoad::Pending,
            Some(_) => self.results.remove(&ticket).unwrap_or(AsyncLoad::NotFound),
            None => AsyncLoad::NotFound,
        }
    }

    /// Evict everything regardless of usage counts
    pub fn clear_all(&mut self) {
        if !self.entries.is_empty() {
            log::info!("Clearing {} cached clips", self.entries.len());
        }
        self.entries.clear();
    }

    /// Whether a clip is currently resident
    pub fn resident(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Current usage count for a resident clip
    pub fn usages(&self, path: &str) -> i32 {
        self.entries.get(path).map_or(0, |e| e.usages)
    }

    /// Number of resident clips
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no clips are resident
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_clip(path: &str) -> AudioClip {
        AudioClip::with_length(path, vec![0u8; 16], 1.5)
    }

    fn cache_with(paths: &[&str]) -> ClipCache {
        let mut source = MemorySource::new();
        for p in paths {
            source.insert(test_clip(p));
        }
        ClipCache::new(Box::new(source))
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ClipFormat::detect(b"RIFF....WAVE"), ClipFormat::Wav);
        assert_eq!(ClipFormat::detect(b"OggS...."), ClipFormat::Ogg);
        assert_eq!(ClipFormat::detect(b"fLaC...."), ClipFormat::Flac);
        assert_eq!(ClipFormat::detect(b"ID3\x04...."), ClipFormat::Mp3);
        assert_eq!(ClipFormat::detect(&[0xFF, 0xFB, 0x90, 0x00]), ClipFormat::Mp3);
        assert_eq!(ClipFormat::detect(b"??"), ClipFormat::Unknown);
    }

    #[test]
    fn test_retain_release_refcount() {
        let mut cache = cache_with(&["boom.wav"]);
        assert!(cache.retain("boom.wav").is_some());
        assert!(cache.retain("boom.wav").is_some());
        assert_eq!(cache.usages("boom.wav"), 2);

        cache.release("boom.wav");
        assert!(cache.resident("boom.wav"));
        cache.release("boom.wav");
        assert!(!cache.resident("boom.wav"));
    }

    #[test]
    fn test_release_unknown_is_ignored() {
        let mut cache = cache_with(&[]);
        cache.release("nope.wav");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_miss_returns_none() {
        let mut cache = cache_with(&["boom.wav"]);
        assert!(cache.retain("missing.wav").is_none());
        assert!(!cache.resident("missing.wav"));
    }

    #[test]
    fn test_additional_source_wins() {
        let mut cache = cache_with(&["boom.wav"]);
        let mut extra = MemorySource::new();
        extra.insert(AudioClip::with_length("boom.wav", vec![1u8; 8], 9.0));
        cache.add_source(Box::new(extra));

        let clip = cache.retain("boom.wav").unwrap();
        assert!((clip.length_secs() - 9.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_async_retain_resolves_on_update() {
        let mut cache = cache_with(&["boom.wav"]);
        let ticket = cache.retain_async("boom.wav");
        assert!(matches!(cache.take_result(ticket), AsyncLoad::Pending));

        cache.update();
        assert!(matches!(cache.take_result(ticket), AsyncLoad::Ready(_)));
        assert_eq!(cache.usages("boom.wav"), 1);
        // Consumed on read
        assert!(matches!(cache.take_result(ticket), AsyncLoad::NotFound));
    }

    #[test]
    fn test_async_retain_not_found() {
        let mut cache = cache_with(&[]);
        let ticket = cache.retain_async("missing.wav");
        cache.update();
        assert!(matches!(cache.take_result(ticket), AsyncLoad::NotFound));
    }

    #[test]
    fn test_clear_all() {
        let mut cache = cache_with(&["a.wav", "b.wav"]);
        cache.retain("a.wav");
        cache.retain("b.wav");
        cache.clear_all();
        assert!(cache.is_empty());
    }
}
