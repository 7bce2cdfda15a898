//! Full path reconstruction from parent chains.

use proptest::prelude::*;
use xtension_core::{BindingConfig, ItemId, XwfError};
use xtension_testkit::prelude::*;

fn id(raw: i32) -> ItemId {
    ItemId::new(raw).unwrap()
}

#[test]
fn sample_paths() {
    let host = MockHost::new().tree(&ItemTree::sample()).bind().unwrap();
    assert_eq!(host.full_path(id(4)).unwrap(), "\\Users\\alice\\Documents\\report.docx");
    assert_eq!(host.full_path(id(5)).unwrap(), "\\Users\\alice\\notes.txt");
    assert_eq!(host.full_path(id(6)).unwrap(), "\\Windows");
}

#[test]
fn root_has_an_empty_path() {
    let host = MockHost::new().tree(&ItemTree::sample()).bind().unwrap();
    assert_eq!(host.full_path(id(ROOT)).unwrap(), "");
    assert_eq!(calls("XWF_GetItemName"), 0);
}

#[test]
fn custom_separator() {
    let host = MockHost::new()
        .tree(&ItemTree::sample())
        .bind_with(BindingConfig::new().path_separator('/'))
        .unwrap();
    assert_eq!(host.full_path(id(4)).unwrap(), "/Users/alice/Documents/report.docx");
}

#[test]
fn cycle_is_reported() {
    let host = MockHost::new().tree(&ItemTree::with_cycle()).bind().unwrap();
    match host.full_path(id(4)).unwrap_err() {
        XwfError::ParentCycle { item } => assert_eq!(item, 4),
        other => panic!("expected ParentCycle, got {other:?}"),
    }
    // Items outside the loop are unaffected.
    assert_eq!(host.full_path(id(6)).unwrap(), "\\Windows");
}

#[test]
fn depth_limit() {
    let tree = ItemTree::chain(12);
    let host = MockHost::new()
        .tree(&tree)
        .bind_with(BindingConfig::new().max_path_depth(8))
        .unwrap();
    match host.full_path(id(12)).unwrap_err() {
        XwfError::PathTooDeep { item, depth } => {
            assert_eq!(item, 12);
            assert_eq!(depth, 8);
        }
        other => panic!("expected PathTooDeep, got {other:?}"),
    }
    // The walk stops at the limit instead of following the whole chain.
    assert_eq!(calls("XWF_GetItemParent"), 9);
    assert_eq!(host.full_path(id(8)).unwrap(), tree.expected_path(8, '\\').unwrap());
}

#[test]
fn default_depth_handles_deep_chains() {
    let tree = ItemTree::chain(600);
    let host = MockHost::new().tree(&tree).bind().unwrap();
    let path = host.full_path(id(600)).unwrap();
    assert!(path.ends_with("\\d599\\d600"));
    assert_eq!(path.matches('\\').count(), 600);
}

#[test]
fn parent_fault_fails_the_path() {
    let host = MockHost::new()
        .tree(&ItemTree::sample())
        .fault("XWF_GetItemParent")
        .bind()
        .unwrap();
    assert!(matches!(
        host.full_path(id(4)),
        Err(XwfError::ForeignFault { symbol: "XWF_GetItemParent", .. })
    ));
}

proptest! {
    #[test]
    fn paths_match_the_tree(tree in tree_strategy(40)) {
        let host = MockHost::new().tree(&tree).bind().unwrap();
        for raw in tree.items().keys() {
            let expected = tree.expected_path(*raw, '\\').unwrap();
            prop_assert_eq!(host.full_path(id(*raw)).unwrap(), expected);
        }
    }

    #[test]
    fn renamed_items_show_up_in_paths(tree in tree_strategy(16), name in name_strategy()) {
        let last = *tree.items().keys().last().unwrap();
        let mut item = tree.items()[&last].clone();
        item.name = name.clone();
        let tree = tree.with_item(last, item);

        let host = MockHost::new().tree(&tree).bind().unwrap();
        let path = host.full_path(id(last)).unwrap();
        let expected_suffix = format!("\\{name}");
        prop_assert!(path.ends_with(&expected_suffix));
    }
}
