//! Item trees for volume snapshot scenarios.
//!
//! Provides ready-made snapshots and the paths the binding is expected to
//! reconstruct for them.

use std::collections::BTreeMap;

use crate::mock::MockItem;

/// Id of the root directory in every tree.
pub const ROOT: i32 = 0;

/// A volume snapshot as a map of item id to item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTree {
    items: BTreeMap<i32, MockItem>,
}

impl ItemTree {
    /// A tree holding only the root directory.
    pub fn new() -> Self {
        let mut items = BTreeMap::new();
        items.insert(ROOT, MockItem::directory("(Root directory)", -1));
        Self { items }
    }

    /// Adds a directory.
    #[must_use]
    pub fn add(mut self, id: i32, parent: i32, name: &str) -> Self {
        self.items.insert(id, MockItem::directory(name, parent));
        self
    }

    /// Adds a file with contents.
    #[must_use]
    pub fn add_file(mut self, id: i32, parent: i32, name: &str, contents: &[u8]) -> Self {
        self.items.insert(id, MockItem::file(name, parent, contents));
        self
    }

    /// Replaces an item.
    #[must_use]
    pub fn with_item(mut self, id: i32, item: MockItem) -> Self {
        self.items.insert(id, item);
        self
    }

    /// The items by id.
    pub fn items(&self) -> &BTreeMap<i32, MockItem> {
        &self.items
    }

    /// Number of items, root included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; every tree has a root.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A small user profile:
    ///
    /// ```text
    /// \Users\alice\Documents\report.docx   (4)
    /// \Users\alice\notes.txt               (5)
    /// \Windows                             (6)
    /// ```
    pub fn sample() -> Self {
        Self::new()
            .add(1, ROOT, "Users")
            .add(2, 1, "alice")
            .add(3, 2, "Documents")
            .add_file(4, 3, "report.docx", b"PK\x03\x04 quarterly numbers")
            .add_file(5, 2, "notes.txt", b"call the lab before friday")
            .add(6, ROOT, "Windows")
    }

    /// A chain of `depth` nested directories below the root; the deepest has
    /// id `depth`.
    pub fn chain(depth: usize) -> Self {
        (1..=depth as i32).fold(Self::new(), |tree, id| {
            tree.add(id, id - 1, &format!("d{id}"))
        })
    }

    /// The sample tree with items 1 and 2 made each other's parent.
    pub fn with_cycle() -> Self {
        let mut tree = Self::sample();
        if let Some(users) = tree.items.get_mut(&1) {
            users.parent = 2;
        }
        tree
    }

    /// The path the binding should reconstruct for `id`: every name from
    /// below the root down to the item, each preceded by `separator`.
    ///
    /// Returns `None` for unknown ids and for chains that loop.
    pub fn expected_path(&self, id: i32, separator: char) -> Option<String> {
        let mut names = Vec::new();
        let mut current = id;
        loop {
            let item = self.items.get(&current)?;
            if item.parent < 0 {
                break;
            }
            if names.len() > self.items.len() {
                return None;
            }
            names.push(item.name.as_str());
            current = item.parent;
        }
        Some(names.iter().rev().fold(String::new(), |mut path, name| {
            path.push(separator);
            path.push_str(name);
            path
        }))
    }
}

impl Default for ItemTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_paths() {
        let tree = ItemTree::sample();
        assert_eq!(
            tree.expected_path(4, '\\').as_deref(),
            Some("\\Users\\alice\\Documents\\report.docx")
        );
        assert_eq!(tree.expected_path(6, '/').as_deref(), Some("/Windows"));
        assert_eq!(tree.expected_path(ROOT, '\\').as_deref(), Some(""));
        assert_eq!(tree.expected_path(99, '\\'), None);
    }

    #[test]
    fn chain_has_requested_depth() {
        let tree = ItemTree::chain(3);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.expected_path(3, '\\').as_deref(), Some("\\d1\\d2\\d3"));
    }

    #[test]
    fn cycle_has_no_expected_path() {
        assert_eq!(ItemTree::with_cycle().expected_path(4, '\\'), None);
    }
}
