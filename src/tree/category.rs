//! Category nodes
//!
//! A category is either a *trigger* (leaf, holds a list of clip paths with
//! selection weights) or a *bus/group* (branch, holds playback defaults its
//! subtree inherits). Nodes are owned by the [`CategoryTree`] arena and refer
//! to each other by unique id.
//!
//! [`CategoryTree`]: crate::tree::CategoryTree

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::filters::{FilterBank, FilterKind};

fn minus_one() -> i32 {
    -1
}

/// One node of the category tree.
///
/// Clip paths may contain `None` entries ("missing" slots, kept so authored
/// indices stay stable); selecting one routes the request to the
/// missing-sound fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    id: String,
    unique_id: i32,
    pub(crate) parent_unique_id: i32,
    pub(crate) order_idx: i32,

    /// Bus this category routes to; inherited from the nearest ancestor that
    /// defines one when unset
    pub default_bus: Option<String>,
    /// Default playback volume
    pub volume: f32,
    /// Default stereo pan, -1.0 left to 1.0 right
    pub stereo_pan: f32,
    /// Whether instances loop by default
    pub looped: bool,
    /// Symmetric pitch randomization range around the base pitch
    pub pitch_randomization: f32,
    /// Minimum seconds before this category (or its subtree) may play again;
    /// negative disables the cooldown
    pub next_allowed_delay: f32,
    /// Unique ids of categories whose active instances block this subtree
    pub blocked_by: Vec<i32>,
    /// Weighted-random clip selection instead of round robin
    pub sound_randomization: bool,

    /// Clip asset paths (leaf categories only)
    pub audio_data: Vec<Option<String>>,
    /// Selection weights parallel to `audio_data`
    pub audio_weights: Vec<i32>,

    /// Mask of enabled effect filters
    pub enabled_filters: FilterKind,
    /// Filter parameters, present only while any filter is enabled
    pub filters: Option<Box<FilterBank>>,

    // Runtime selection state, rebuilt on load
    #[serde(skip, default = "minus_one")]
    last_selected: i32,
    #[serde(skip, default = "minus_one")]
    total_weight: i32,

    #[serde(skip)]
    pub(crate) children: Vec<i32>,
}

impl Category {
    /// Create a detached category with the given id and globally unique id
    pub fn new(id: impl Into<String>, unique_id: i32) -> Self {
        Self {
            id: id.into(),
            unique_id,
            parent_unique_id: -1,
            order_idx: -1,
            default_bus: None,
            volume: 1.0,
            stereo_pan: 0.0,
            looped: false,
            pitch_randomization: 0.0,
            next_allowed_delay: -1.0,
            blocked_by: Vec::new(),
            sound_randomization: false,
            audio_data: Vec::new(),
            audio_weights: Vec::new(),
            enabled_filters: FilterKind::empty(),
            filters: None,
            last_selected: -1,
            total_weight: -1,
            children: Vec::new(),
        }
    }

    /// The sibling-unique id of this category
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The globally unique, immutable id of this category
    pub fn unique_id(&self) -> i32 {
        self.unique_id
    }

    /// Unique id of the parent, or -1 when detached or root
    pub fn parent_unique_id(&self) -> i32 {
        self.parent_unique_id
    }

    /// Position among siblings as recorded by the last save
    pub fn order_idx(&self) -> i32 {
        self.order_idx
    }

    /// Unique ids of the children, in sibling order
    pub fn child_ids(&self) -> &[i32] {
        &self.children
    }

    /// A category is a leaf (trigger) iff it has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The trigger-id prefix, i.e. the part before the first underscore.
    /// Used to group leaves for preloading.
    pub fn id_prefix(&self) -> &str {
        self.id.split('_').next().unwrap_or(&self.id)
    }

    /// The id with any trailing digits stripped; sibling-collision suffixes
    /// are appended digits, so this recovers the authored base name.
    pub fn base_id(&self) -> &str {
        self.id.trim_end_matches(|c: char| c.is_ascii_digit())
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Append a clip path with the given selection weight
    pub fn push_clip(&mut self, path: impl Into<String>, weight: i32) {
        self.audio_data.push(Some(path.into()));
        self.audio_weights.push(weight.max(0));
        self.total_weight = -1;
    }

    /// Append an empty ("missing") clip slot with weight 1
    pub fn push_empty_clip(&mut self) {
        self.audio_data.push(None);
        self.audio_weights.push(1);
        self.total_weight = -1;
    }

    /// Remove the clip at `index`, keeping weights parallel
    pub fn remove_clip(&mut self, index: usize) {
        if index < self.audio_data.len() {
            self.audio_data.remove(index);
            self.audio_weights.remove(index);
            self.total_weight = -1;
            self.last_selected = -1;
        }
    }

    /// Invalidate the cached total weight after editing `audio_weights`
    pub fn invalidate_weight_cache(&mut self) {
        self.total_weight = -1;
    }

    /// Mutable access to the filter bank, creating a default one on demand
    pub fn filter_bank(&mut self) -> &mut FilterBank {
        self.filters.get_or_insert_with(Box::default)
    }

    /// Drop the filter bank when no filter is enabled, so it takes no space
    /// in saved data
    pub fn trim_filters(&mut self) {
        if self.enabled_filters.is_empty() {
            self.filters = None;
        }
    }

    /// Select the next clip path for this leaf.
    ///
    /// Uses weighted-random selection when `sound_randomization` is set and
    /// more than one clip exists, round robin otherwise. Returns `None` for
    /// an empty list or a missing slot.
    pub fn select_clip<R: Rng>(&mut self, rng: &mut R) -> Option<String> {
        if self.sound_randomization && self.audio_data.len() > 1 {
            self.select_weighted(rng)
        } else {
            self.next_ordered()
        }
    }

    /// Deterministic round-robin selection: advances a cursor modulo the
    /// list length, starting at index 0 on the first call.
    pub fn next_ordered(&mut self) -> Option<String> {
        if self.audio_data.is_empty() {
            return None;
        }
        self.last_selected = (self.last_selected + 1) % self.audio_data.len() as i32;
        self.audio_data[self.last_selected as usize].clone()
    }

    /// Weighted-random selection with single-previous-pick suppression.
    ///
    /// The previously selected clip's weight is zeroed for the draw and
    /// restored to its configured value afterward, so the same clip is never
    /// chosen twice in a row while alternatives exist. Lists with one or no
    /// entries fall back to ordered selection.
    pub fn select_weighted<R: Rng>(&mut self, rng: &mut R) -> Option<String> {
        if self.audio_data.len() <= 1 {
            return self.next_ordered();
        }

        // Weights may have been edited out from under us; reinitialize when
        // the lists disagree.
        if self.audio_weights.len() != self.audio_data.len() {
            self.audio_weights.clear();
            self.audio_weights.resize(self.audio_data.len(), 1);
            self.total_weight = -1;
        }

        // A shrunken list can leave the cursor past the end; drop the
        // suppression and the cached total rather than index out of range.
        if self.last_selected >= self.audio_data.len() as i32 {
            self.last_selected = -1;
            self.total_weight = -1;
        }

        if self.total_weight < 0 {
            self.total_weight = self.audio_weights.iter().sum();
        }

        // Suppress the previous pick for this draw only; its configured
        // weight is untouched so later draws see it again.
        let previous = self.last_selected;
        let mut total = self.total_weight;
        if previous >= 0 {
            total -= self.audio_weights[previous as usize];
        }

        if total > 0 {
            let dice_roll = rng.gen_range(0..total);
            let mut cumulative = 0;
            for i in 0..self.audio_weights.len() {
                if previous == i as i32 {
                    continue;
                }
                cumulative += self.audio_weights[i];
                if dice_roll < cumulative {
                    self.last_selected = i as i32;
                    return self.audio_data[i].clone();
                }
            }
        }

        // All remaining weights were zero; fall back to round robin.
        self.next_ordered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn leaf_with_clips(paths: &[&str]) -> Category {
        let mut cat = Category::new("SFX_Test", 1);
        for p in paths {
            cat.push_clip(*p, 1);
        }
        cat
    }

    #[test]
    fn test_ordered_round_robin_wraps() {
        let mut cat = leaf_with_clips(&["a", "b", "c"]);
        assert_eq!(cat.next_ordered().as_deref(), Some("a"));
        assert_eq!(cat.next_ordered().as_deref(), Some("b"));
        assert_eq!(cat.next_ordered().as_deref(), Some("c"));
        assert_eq!(cat.next_ordered().as_deref(), Some("a"));
    }

    #[test]
    fn test_ordered_empty_list() {
        let mut cat = Category::new("Empty", 1);
        assert!(cat.next_ordered().is_none());
    }

    #[test]
    fn test_missing_slot_selects_none() {
        let mut cat = Category::new("SFX_Test", 1);
        cat.push_empty_clip();
        assert!(cat.next_ordered().is_none());
    }

    #[test]
    fn test_weighted_never_repeats() {
        let mut cat = leaf_with_clips(&["a", "b", "c", "d"]);
        cat.sound_randomization = true;
        let mut rng = SmallRng::seed_from_u64(7);

        let mut previous = cat.select_clip(&mut rng);
        for _ in 0..200 {
            let next = cat.select_clip(&mut rng);
            assert!(next.is_some());
            assert_ne!(next, previous, "anti-repeat bias violated");
            previous = next;
        }
    }

    #[test]
    fn test_weighted_survives_truncated_clip_lists() {
        let mut cat = leaf_with_clips(&["a", "b", "c", "d", "e"]);
        cat.sound_randomization = true;
        let mut rng = SmallRng::seed_from_u64(11);

        // Park the cursor somewhere past where the shortened list will end.
        while cat.select_clip(&mut rng).as_deref() != Some("e") {}

        cat.audio_data.truncate(2);
        cat.audio_weights.truncate(2);
        for _ in 0..50 {
            let picked = cat.select_clip(&mut rng);
            assert!(matches!(picked.as_deref(), Some("a" | "b")));
        }
    }

    #[test]
    fn test_weighted_single_entry_uses_ordered() {
        let mut cat = leaf_with_clips(&["only"]);
        cat.sound_randomization = true;
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(cat.select_clip(&mut rng).as_deref(), Some("only"));
        assert_eq!(cat.select_clip(&mut rng).as_deref(), Some("only"));
    }

    #[test]
    fn test_weighted_restores_original_weight() {
        let mut cat = Category::new("SFX_Test", 1);
        cat.push_clip("heavy", 10);
        cat.push_clip("light", 1);
        cat.sound_randomization = true;
        let mut rng = SmallRng::seed_from_u64(3);

        // Drawing many times must keep alternating (two entries plus
        // anti-repeat forces a strict alternation) and never lose the
        // configured weights.
        let first = cat.select_clip(&mut rng).unwrap();
        for _ in 0..20 {
            cat.select_clip(&mut rng).unwrap();
        }
        assert_eq!(cat.audio_weights, vec![10, 1]);
        assert!(first == "heavy" || first == "light");
    }

    #[test]
    fn test_weight_reinit_on_length_mismatch() {
        let mut cat = leaf_with_clips(&["a", "b", "c"]);
        cat.sound_randomization = true;
        cat.audio_weights.truncate(1);
        let mut rng = SmallRng::seed_from_u64(11);
        assert!(cat.select_clip(&mut rng).is_some());
        assert_eq!(cat.audio_weights.len(), 3);
    }

    #[test]
    fn test_id_prefix() {
        let cat = Category::new("UI_Click_Soft", 1);
        assert_eq!(cat.id_prefix(), "UI");
        let plain = Category::new("Music", 2);
        assert_eq!(plain.id_prefix(), "Music");
    }

    #[test]
    fn test_base_id_strips_suffix_digits() {
        let cat = Category::new("Explosion2", 1);
        assert_eq!(cat.base_id(), "Explosion");
    }
}
