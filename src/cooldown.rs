//! Hierarchical cooldown and blocking bookkeeping
//!
//! Every category level can carry a minimum re-trigger delay and a list of
//! categories that block it while they have active instances. State lives
//! outside the tree so the tree itself stays pure configuration.

use std::collections::HashMap;

use crate::tree::CategoryTree;

/// Tracks last-played times and active instance counts per category
#[derive(Debug, Default)]
pub struct CooldownLedger {
    last_played: HashMap<i32, f32>,
    active_counts: HashMap<i32, i32>,
}

impl CooldownLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a sound in `leaf_id` may start at time `now`.
    ///
    /// Walks from the leaf to the root. The re-trigger delay is checked at
    /// every level, the leaf included; blocking is checked on strict
    /// ancestors only, so a category never blocks itself.
    pub fn check(&self, tree: &CategoryTree, leaf_id: i32, now: f32) -> bool {
        let mut current = Some(leaf_id);
        while let Some(id) = current {
            let Some(node) = tree.get(id) else {
                return true;
            };
            if node.next_allowed_delay >= 0.0 {
                if let Some(last) = self.last_played.get(&id) {
                    if last + node.next_allowed_delay >= now {
                        return false;
                    }
                }
            }
            current = tree.parent_of(id);
            if let Some(ancestor) = current.and_then(|a| tree.get(a)) {
                for blocker in &ancestor.blocked_by {
                    if self.active_count(*blocker) > 0 {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Record a start: stamp the last-played time at every level from the
    /// leaf up, and bump active counts on strict ancestors
    pub fn update(&mut self, tree: &CategoryTree, leaf_id: i32, now: f32) {
        let mut current = Some(leaf_id);
        while let Some(id) = current {
            self.last_played.insert(id, now);
            current = tree.parent_of(id);
        }
        for ancestor in tree.ancestors(leaf_id) {
            *self.active_counts.entry(ancestor).or_insert(0) += 1;
        }
    }

    /// Record a release: drop active counts on strict ancestors.
    ///
    /// Counts never go below zero; an underflow means paired update/free
    /// calls got out of sync and is logged.
    pub fn free(&mut self, tree: &CategoryTree, leaf_id: i32) {
        for ancestor in tree.ancestors(leaf_id) {
            let count = self.active_counts.entry(ancestor).or_insert(0);
            if *count <= 0 {
                log::warn!("Active count underflow for category {ancestor}");
                *count = 0;
            } else {
                *count -= 1;
            }
        }
    }

    /// Current active instance count for a category
    pub fn active_count(&self, unique_id: i32) -> i32 {
        self.active_counts.get(&unique_id).copied().unwrap_or(0)
    }

    /// Forget all cooldown and blocking state
    pub fn clear(&mut self) {
        self.last_played.clear();
        self.active_counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::Category;

    use super::*;

    fn tree_with_delay(delay: f32) -> CategoryTree {
        let mut tree = CategoryTree::new(Category::new("Master", 1));
        tree.add_child(1, Category::new("SFX", 2));
        let mut leaf = Category::new("SFX_Boom", 3);
        leaf.next_allowed_delay = delay;
        tree.add_child(2, leaf);
        tree
    }

    #[test]
    fn test_leaf_delay_blocks_then_allows() {
        let tree = tree_with_delay(2.0);
        let mut ledger = CooldownLedger::new();

        assert!(ledger.check(&tree, 3, 10.0));
        ledger.update(&tree, 3, 10.0);

        assert!(!ledger.check(&tree, 3, 11.9));
        assert!(!ledger.check(&tree, 3, 12.0), "boundary counts as too soon");
        assert!(ledger.check(&tree, 3, 12.1));
    }

    #[test]
    fn test_ancestor_delay_covers_siblings() {
        let mut tree = tree_with_delay(-1.0);
        if let Some(group) = tree.get_mut(2) {
            group.next_allowed_delay = 5.0;
        }
        tree.add_child(2, Category::new("SFX_Zap", 4));
        let mut ledger = CooldownLedger::new();

        ledger.update(&tree, 3, 0.0);
        // Sibling shares the group-level delay
        assert!(!ledger.check(&tree, 4, 3.0));
        assert!(ledger.check(&tree, 4, 5.5));
    }

    #[test]
    fn test_blocking_on_ancestor() {
        let mut tree = tree_with_delay(-1.0);
        tree.add_child(1, Category::new("VO", 5));
        tree.add_child(5, Category::new("VO_Line", 6));
        // SFX is blocked while anything under VO is active
        if let Some(sfx) = tree.get_mut(2) {
            sfx.blocked_by = vec![5];
        }
        let mut ledger = CooldownLedger::new();

        assert!(ledger.check(&tree, 3, 0.0));
        ledger.update(&tree, 6, 0.0);
        assert!(!ledger.check(&tree, 3, 1.0));

        ledger.free(&tree, 6);
        assert!(ledger.check(&tree, 3, 1.0));
    }

    #[test]
    fn test_blocking_ignored_on_leaf_itself() {
        let mut tree = tree_with_delay(-1.0);
        // A leaf listing a blocker only matters when the leaf is someone's
        // ancestor, which it never is
        if let Some(leaf) = tree.get_mut(3) {
            leaf.blocked_by = vec![2];
        }
        let mut ledger = CooldownLedger::new();
        ledger.update(&tree, 3, 0.0);
        assert!(ledger.check(&tree, 3, 100.0));
    }

    #[test]
    fn test_free_clamps_at_zero() {
        let tree = tree_with_delay(-1.0);
        let mut ledger = CooldownLedger::new();
        ledger.free(&tree, 3);
        assert_eq!(ledger.active_count(2), 0);
        assert_eq!(ledger.active_count(1), 0);
    }

    #[test]
    fn test_nested_counts() {
        let tree = tree_with_delay(-1.0);
        let mut ledger = CooldownLedger::new();
        ledger.update(&tree, 3, 0.0);
        ledger.update(&tree, 3, 1.0);
        assert_eq!(ledger.active_count(2), 2);
        assert_eq!(ledger.active_count(1), 2);
        // The leaf itself is not counted
        assert_eq!(ledger.active_count(3), 0);

        ledger.free(&tree, 3);
        assert_eq!(ledger.active_count(2), 1);
    }
}
