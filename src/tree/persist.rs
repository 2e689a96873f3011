//! Flat-record persistence for category trees
//!
//! Trees save as a flat list of categories carrying `parent_unique_id` and
//! `order_idx` links, serialized as RON. Reconstruction is tolerant:
//! records with a missing parent are logged and left detached rather than
//! failing the whole load.

use std::fs;
use std::path::Path;

use rand::Rng;

use crate::error::AudioError;

use super::arena::CategoryTree;
use super::category::Category;

/// Flatten a tree into persistable records.
///
/// Records come out in depth-first order with link fields rewritten from
/// the live tree, so a hand-edited or stale `order_idx` never survives a
/// save. Runtime selection state is skipped by serde.
pub fn save_tree(tree: &CategoryTree) -> Vec<Category> {
    let mut records = Vec::with_capacity(tree.len());
    flatten(tree, tree.root_id(), -1, -1, &mut records);
    records
}

fn flatten(tree: &CategoryTree, unique_id: i32, parent: i32, order: i32, out: &mut Vec<Category>) {
    let Some(node) = tree.get(unique_id) else {
        return;
    };
    let mut record = node.clone();
    record.parent_unique_id = parent;
    record.order_idx = order;
    record.children.clear();
    record.trim_filters();
    out.push(record);
    for (idx, child) in node.child_ids().iter().enumerate() {
        flatten(tree, *child, unique_id, idx as i32, out);
    }
}

/// Rebuild a tree from flat records.
///
/// Three phases: index every record by unique id, attach each to its
/// parent, then sort sibling lists by `order_idx`. A record whose parent is
/// missing is logged and stays detached; a duplicate unique id overwrites
/// the earlier record (logged). The root is the record with a negative
/// `parent_unique_id`; a record set with no root is corrupt.
pub fn reconstruct(records: Vec<Category>) -> Result<CategoryTree, AudioError> {
    let mut root_id = None;
    let mut nodes: std::collections::HashMap<i32, Category> = std::collections::HashMap::new();

    for mut record in records {
        record.children.clear();
        if record.parent_unique_id < 0 {
            root_id = Some(record.unique_id());
        }
        if let Some(previous) = nodes.insert(record.unique_id(), record) {
            log::error!(
                "Duplicate unique id {} ('{}') in saved tree; keeping the later record",
                previous.unique_id(),
                previous.id()
            );
        }
    }

    let root_id = root_id.ok_or_else(|| {
        AudioError::CorruptTree("no root category (parent_unique_id < 0) found".into())
    })?;

    // Attach children to parents
    let ids: Vec<i32> = nodes.keys().copied().collect();
    for id in ids {
        let parent_id = nodes[&id].parent_unique_id;
        if parent_id < 0 {
            continue;
        }
        match nodes.get_mut(&parent_id) {
            Some(parent) => parent.children.push(id),
            None => log::error!(
                "Category {id} references missing parent {parent_id}; leaving it detached"
            ),
        }
    }

    // Restore sibling order
    let order: std::collections::HashMap<i32, i32> =
        nodes.iter().map(|(id, n)| (*id, n.order_idx)).collect();
    for node in nodes.values_mut() {
        node.children.sort_by_key(|c| order.get(c).copied().unwrap_or(0));
    }

    let Some(root) = nodes.remove(&root_id) else {
        return Err(AudioError::CorruptTree("root category vanished".into()));
    };
    let mut tree = CategoryTree::new(root);
    for node in nodes.into_values() {
        tree.adopt(node);
    }
    Ok(tree)
}

/// Serialize a tree to pretty-printed RON
pub fn to_ron(tree: &CategoryTree) -> Result<String, AudioError> {
    let records = save_tree(tree);
    let text = ron::ser::to_string_pretty(&records, ron::ser::PrettyConfig::default())?;
    Ok(text)
}

/// Parse a tree from RON produced by [`to_ron`]
pub fn from_ron(text: &str) -> Result<CategoryTree, AudioError> {
    let records: Vec<Category> = ron::from_str(text)?;
    reconstruct(records)
}

/// Load a tree from a RON file on disk
pub fn load_file(path: impl AsRef<Path>) -> Result<CategoryTree, AudioError> {
    let text = fs::read_to_string(path)?;
    from_ron(&text)
}

/// Write a tree to a RON file on disk
pub fn save_file(tree: &CategoryTree, path: impl AsRef<Path>) -> Result<(), AudioError> {
    let text = to_ron(tree)?;
    fs::write(path, text)?;
    Ok(())
}

/// Draw a unique id not yet present in the tree
pub fn create_unique_id<R: Rng>(tree: &CategoryTree, rng: &mut R) -> i32 {
    loop {
        let candidate = rng.gen_range(1..i32::MAX);
        if !tree.contains_unique_id(candidate) {
            return candidate;
        }
    }
}

/// Build a fresh category with a collision-free unique id
pub fn create_category<R: Rng>(tree: &CategoryTree, id: &str, rng: &mut R) -> Category {
    Category::new(id, create_unique_id(tree, rng))
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn sample_tree() -> CategoryTree {
        let mut tree = CategoryTree::new(Category::new("Master", 1));
        tree.add_child(1, Category::new("SFX", 2));
        tree.add_child(1, Category::new("Music", 3));
        tree.add_child(2, Category::new("SFX_Boom", 4));
        tree.add_child(2, Category::new("SFX_Zap", 5));
        tree
    }

    #[test]
    fn test_save_assigns_order() {
        let records = save_tree(&sample_tree());
        assert_eq!(records.len(), 5);
        let root = records.iter().find(|r| r.unique_id() == 1).unwrap();
        assert_eq!(root.parent_unique_id(), -1);
        let music = records.iter().find(|r| r.unique_id() == 3).unwrap();
        assert_eq!(music.order_idx(), 1);
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let tree = sample_tree();
        let rebuilt = reconstruct(save_tree(&tree)).unwrap();
        assert_eq!(rebuilt.root_id(), 1);
        assert_eq!(rebuilt.get(2).unwrap().child_ids(), &[4, 5]);
        assert_eq!(rebuilt.get(1).unwrap().child_ids(), &[2, 3]);
        assert_eq!(rebuilt.leaf_table(), tree.leaf_table());
    }

    #[test]
    fn test_ron_round_trip() {
        let tree = sample_tree();
        let text = to_ron(&tree).unwrap();
        let rebuilt = from_ron(&text).unwrap();
        assert_eq!(rebuilt.leaf_table(), tree.leaf_table());
    }

    #[test]
    fn test_order_idx_restores_sibling_order() {
        let mut records = save_tree(&sample_tree());
        // Shuffle the record order; sibling order must come from order_idx
        records.reverse();
        let rebuilt = reconstruct(records).unwrap();
        assert_eq!(rebuilt.get(2).unwrap().child_ids(), &[4, 5]);
    }

    #[test]
    fn test_missing_parent_detaches() {
        let mut records = save_tree(&sample_tree());
        // Point one leaf at a parent that does not exist
        let zap = records.iter_mut().find(|r| r.unique_id() == 5).unwrap();
        zap.parent_unique_id = 999;
        let rebuilt = reconstruct(records).unwrap();
        assert!(rebuilt.contains_unique_id(5));
        assert!(!rebuilt.reachable_ids().contains(&5));
    }

    #[test]
    fn test_no_root_is_corrupt() {
        let mut records = save_tree(&sample_tree());
        for r in &mut records {
            if r.parent_unique_id() < 0 {
                r.parent_unique_id = 1;
            }
        }
        assert!(matches!(
            reconstruct(records),
            Err(AudioError::CorruptTree(_))
        ));
    }

    #[test]
    fn test_create_unique_id_avoids_collisions() {
        let tree = sample_tree();
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..100 {
            let id = create_unique_id(&tree, &mut rng);
            assert!(!tree.contains_unique_id(id));
        }
    }
}
