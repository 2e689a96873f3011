//! Category tree arena
//!
//! Nodes are stored in one map keyed by unique id; parent/child links are
//! ids rather than references, matching the flat persisted format and
//! avoiding back-reference cycles. Detached nodes stay in the arena but are
//! unreachable from the root.

use std::collections::HashMap;

use super::category::Category;

/// Hierarchical audio category configuration.
///
/// Trees are small (hundreds of nodes) and edited at authoring time, so
/// traversals are plain recursion over child-id lists.
#[derive(Debug, Clone)]
pub struct CategoryTree {
    nodes: HashMap<i32, Category>,
    root: i32,
}

impl CategoryTree {
    /// Create a tree from a root category
    pub fn new(root: Category) -> Self {
        let root_id = root.unique_id();
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            nodes,
            root: root_id,
        }
    }

    /// The default authoring scaffold: a Master bus with the usual groups
    pub fn starter() -> Self {
        let mut tree = Self::new(Category::new("Master", 1));
        for (idx, name) in ["Music", "SFX", "Characters", "VO"].iter().enumerate() {
            tree.add_child(1, Category::new(*name, idx as i32 + 2));
        }
        tree
    }

    /// Unique id of the root category
    pub fn root_id(&self) -> i32 {
        self.root
    }

    /// Number of categories in the arena, including detached ones
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no categories
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a category by unique id
    pub fn get(&self, unique_id: i32) -> Option<&Category> {
        self.nodes.get(&unique_id)
    }

    /// Look up a category mutably by unique id
    pub fn get_mut(&mut self, unique_id: i32) -> Option<&mut Category> {
        self.nodes.get_mut(&unique_id)
    }

    /// Whether a category with this unique id exists anywhere in the arena
    pub fn contains_unique_id(&self, unique_id: i32) -> bool {
        self.nodes.contains_key(&unique_id)
    }

    /// Iterate over every category in the arena, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.nodes.values()
    }

    /// Unique id of a node's attached parent, if any
    pub fn parent_of(&self, unique_id: i32) -> Option<i32> {
        let node = self.nodes.get(&unique_id)?;
        if unique_id == self.root || node.parent_unique_id < 0 {
            return None;
        }
        self.nodes
            .contains_key(&node.parent_unique_id)
            .then_some(node.parent_unique_id)
    }

    /// The chain of ancestor ids from `unique_id`'s parent up to the root
    pub fn ancestors(&self, unique_id: i32) -> Vec<i32> {
        let mut chain = Vec::new();
        let mut current = self.parent_of(unique_id);
        while let Some(id) = current {
            chain.push(id);
            current = self.parent_of(id);
        }
        chain
    }

    /// Find a child of `parent_id` by its sibling id
    pub fn child_by_id(&self, parent_id: i32, id: &str) -> Option<i32> {
        let parent = self.nodes.get(&parent_id)?;
        parent
            .children
            .iter()
            .copied()
            .find(|child| self.nodes.get(child).is_some_and(|c| c.id() == id))
    }

    /// Count existing children of `parent_id` whose base id (suffix digits
    /// stripped) matches `id`. Used to disambiguate sibling name collisions.
    fn count_id_in_children(&self, parent_id: i32, id: &str) -> usize {
        let Some(parent) = self.nodes.get(&parent_id) else {
            return 0;
        };
        parent
            .children
            .iter()
            .filter(|child| {
                self.nodes
                    .get(child)
                    .is_some_and(|c| c.base_id() == id)
            })
            .count()
    }

    /// Attach a new category under `parent_id`, appending it to the sibling
    /// order.
    ///
    /// The child inherits the parent's bus when it has none of its own; a
    /// sibling id collision is resolved by appending the running duplicate
    /// count as a numeric suffix. Returns the child's unique id, or `None`
    /// (logged) when the parent is unknown or the unique id is taken.
    pub fn add_child(&mut self, parent_id: i32, child: Category) -> Option<i32> {
        self.add_child_at(parent_id, child, usize::MAX)
    }

    /// Attach a new category under `parent_id` at the given sibling index
    /// (clamped to the end)
    pub fn add_child_at(&mut self, parent_id: i32, mut child: Category, index: usize) -> Option<i32> {
        if !self.nodes.contains_key(&parent_id) {
            log::error!("Cannot attach '{}': unknown parent {parent_id}", child.id());
            return None;
        }
        let child_id = child.unique_id();
        if self.nodes.contains_key(&child_id) {
            log::error!(
                "Cannot attach '{}': unique id {child_id} already present in tree",
                child.id()
            );
            return None;
        }

        let duplicates = self.count_id_in_children(parent_id, child.id());
        if duplicates > 0 {
            child.set_id(format!("{}{duplicates}", child.id()));
        }

        let parent = self.nodes.get_mut(&parent_id)?;
        if child.default_bus.is_none() {
            child.default_bus = parent.default_bus.clone();
        }
        child.parent_unique_id = parent_id;
        let at = index.min(parent.children.len());
        parent.children.insert(at, child_id);
        self.nodes.insert(child_id, child);
        Some(child_id)
    }

    /// Move an attached category under a new parent at the given sibling
    /// index. Detaches from the old parent first; sibling-id disambiguation
    /// and bus inheritance apply as on a fresh attach.
    pub fn reparent_at(&mut self, child_id: i32, new_parent_id: i32, index: usize) -> bool {
        if child_id == self.root {
            return false;
        }
        if !self.nodes.contains_key(&child_id) || !self.nodes.contains_key(&new_parent_id) {
            log::error!("Reparent failed: unknown category {child_id} or parent {new_parent_id}");
            return false;
        }

        self.detach(child_id);

        let base = self.nodes[&child_id].base_id().to_owned();
        let duplicates = self.count_id_in_children(new_parent_id, &base);
        let parent_bus = self.nodes[&new_parent_id].default_bus.clone();
        let Some(parent) = self.nodes.get_mut(&new_parent_id) else {
            return false;
        };
        let at = index.min(parent.children.len());
        parent.children.insert(at, child_id);

        let Some(child) = self.nodes.get_mut(&child_id) else {
            return false;
        };
        child.parent_unique_id = new_parent_id;
        if duplicates > 0 {
            child.set_id(format!("{base}{duplicates}"));
        }
        if child.default_bus.is_none() {
            child.default_bus = parent_bus;
        }
        true
    }

    /// Insert a node whose link fields are already set, without touching
    /// any parent's child list. Used when rebuilding from saved records.
    pub(crate) fn adopt(&mut self, node: Category) {
        self.nodes.insert(node.unique_id(), node);
    }

    /// Detach `unique_id` from its parent's child list, leaving it in the
    /// arena with no parent link
    fn detach(&mut self, unique_id: i32) {
        let Some(parent_id) = self.parent_of(unique_id) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.retain(|c| *c != unique_id);
        }
        if let Some(node) = self.nodes.get_mut(&unique_id) {
            node.parent_unique_id = -1;
        }
    }

    /// Detach a category (and orphan its subtree) from the tree.
    ///
    /// Fails silently returning `false` when called on the root. The node
    /// and its descendants stay in the arena but become unreachable from
    /// the root.
    pub fn remove_from_tree(&mut self, unique_id: i32) -> bool {
        if unique_id == self.root || !self.nodes.contains_key(&unique_id) {
            return false;
        }
        self.detach(unique_id);
        if let Some(node) = self.nodes.get_mut(&unique_id) {
            node.children.clear();
        }
        true
    }

    /// The bus this category routes to: its own, or the nearest ancestor's
    pub fn closest_bus(&self, unique_id: i32) -> Option<&str> {
        let mut current = Some(unique_id);
        while let Some(id) = current {
            let node = self.nodes.get(&id)?;
            if let Some(bus) = node.default_bus.as_deref() {
                return Some(bus);
            }
            current = self.parent_of(id);
        }
        None
    }

    /// Flatten every leaf reachable from the root into a lookup table keyed
    /// by leaf id.
    ///
    /// A duplicate leaf id across different branches is a configuration
    /// error: it is logged and the later entry is dropped.
    pub fn leaf_table(&self) -> HashMap<String, i32> {
        let mut table = HashMap::new();
        self.collect_leaves(self.root, &mut table);
        table
    }

    fn collect_leaves(&self, unique_id: i32, table: &mut HashMap<String, i32>) {
        let Some(node) = self.nodes.get(&unique_id) else {
            return;
        };
        if node.is_leaf() && unique_id != self.root {
            if table.contains_key(node.id()) {
                log::error!("Sound ID already present: {}", node.id());
                return;
            }
            table.insert(node.id().to_owned(), unique_id);
            return;
        }
        for child in &node.children {
            self.collect_leaves(*child, table);
        }
    }

    /// All leaf ids reachable from the root, grouped by case-insensitive
    /// trigger prefix (the part before the first underscore, uppercased)
    pub fn leaves_by_prefix(&self) -> HashMap<String, Vec<i32>> {
        let mut groups: HashMap<String, Vec<i32>> = HashMap::new();
        for (id, unique_id) in self.leaf_table() {
            let prefix = id
                .split('_')
                .next()
                .unwrap_or(&id)
                .to_uppercase();
            groups.entry(prefix).or_default().push(unique_id);
        }
        groups
    }

    /// Ids reachable from the root via parent/child links, root included.
    /// Detached (orphaned) arena nodes are not listed.
    pub fn reachable_ids(&self) -> Vec<i32> {
        let mut out = Vec::new();
        self.collect_reachable(self.root, &mut out);
        out
    }

    fn collect_reachable(&self, unique_id: i32, out: &mut Vec<i32>) {
        let Some(node) = self.nodes.get(&unique_id) else {
            return;
        };
        out.push(unique_id);
        for child in &node.children {
            self.collect_reachable(*child, out);
        }
    }
}
