//! Property-based test generators using proptest.
//!
//! Provides strategies for item names, acyclic item trees and report table
//! listings of arbitrary length.

use proptest::prelude::*;

use crate::fixtures::{ItemTree, ROOT};

/// Strategy for item names: non-empty, no separators, no NULs.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 _.\\-äöüß]{1,24}")
        .expect("Invalid regex")
        .prop_filter("Item name must not be blank", |s| !s.trim().is_empty())
}

/// Strategy for acyclic trees of up to `max_items` items below the root.
///
/// Item `n` always gets a parent with a smaller id, so every chain ends at
/// the root.
pub fn tree_strategy(max_items: usize) -> impl Strategy<Value = ItemTree> {
    prop::collection::vec((any::<prop::sample::Index>(), name_strategy()), 1..=max_items.max(1))
        .prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .fold(ItemTree::new(), |tree, (position, (parent, name))| {
                    let id = position as i32 + 1;
                    // Any earlier id, root included.
                    let parent = ROOT + parent.index(position + 1) as i32;
                    tree.add(id, parent, &name)
                })
        })
}

/// Strategy for report table names that never contain the list delimiter.
///
/// Names may start or end with a space.
pub fn report_table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex(" ?[A-Za-z][A-Za-z0-9 ]{0,30}")
        .expect("Invalid regex")
}

/// Strategy for the report tables of one item, with a combined listing
/// length anywhere from empty to several kilobytes.
pub fn report_tables_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(report_table_name_strategy(), 0..200)
}

/// Strategy for item contents.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_trees_are_acyclic(tree in tree_strategy(32)) {
            for id in tree.items().keys() {
                prop_assert!(tree.expected_path(*id, '\\').is_some());
            }
        }

        #[test]
        fn generated_names_have_no_separator(name in name_strategy()) {
            prop_assert!(!name.contains('\\'));
            prop_assert!(!name.contains('\0'));
        }
    }
}
