//! Handles to pooled playback instances

/// Handle to a playing (or scheduled) instance.
///
/// Handles are cheap copies of a pool slot plus a generation stamp. Once
/// the instance is released and the slot recycled, the stamp stops
/// matching and every operation through the handle becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipHandle {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl ClipHandle {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}
