//! Growing retry for host outputs of unknown length.

use proptest::prelude::*;
use xtension_core::{BindingConfig, Growth, GrowthPolicy, ItemId, XwfError};
use xtension_testkit::prelude::*;

fn host_with_tables(tables: Vec<String>) -> xtension_core::Host {
    host_with_tables_and(tables, BindingConfig::default())
}

fn host_with_tables_and(tables: Vec<String>, config: BindingConfig) -> xtension_core::Host {
    let mut tagged = MockItem::file("tagged.jpg", ROOT, b"\xFF\xD8".to_vec());
    tagged.report_tables = tables;
    MockHost::new()
        .tree(&ItemTree::new().with_item(1, tagged))
        .bind_with(config)
        .unwrap()
}

/// Table names whose ", "-joined listing is exactly `units` long.
fn listing_of(units: usize) -> Vec<String> {
    let mut tables = Vec::new();
    let mut remaining = units;
    // Each full name takes 10 units plus the 2-unit delimiter after it.
    while remaining > 24 {
        tables.push(format!("Table{:05}", tables.len()));
        remaining -= 12;
    }
    tables.push("x".repeat(remaining));
    tables
}

#[test]
fn listing_helper_is_exact() {
    for units in [1, 11, 64, 150, 1000] {
        assert_eq!(listing_of(units).join(", ").len(), units, "{units}");
    }
}

#[test]
fn truncated_output_is_retried_with_doubled_buffers() {
    let tables = listing_of(150);
    let host = host_with_tables(tables.clone());

    assert_eq!(host.report_table_assocs(ItemId::new(1).unwrap()).unwrap(), tables);
    assert_eq!(calls("XWF_GetReportTableAssocs"), 3);
    assert_eq!(assoc_requests(), vec![64, 128, 256]);

    let stats = host.buffer_stats();
    assert_eq!(stats.acquired, 3);
    assert!(stats.is_balanced());
    assert_eq!(stats.peak_bytes, 512);
}

#[test]
fn output_filling_the_buffer_exactly_is_retried() {
    // 63 units plus the terminator fill a 64-unit buffer to the last slot.
    let tables = listing_of(63);
    let host = host_with_tables(tables.clone());
    assert_eq!(host.report_table_assocs(ItemId::new(1).unwrap()).unwrap(), tables);
    assert_eq!(assoc_requests(), vec![64, 128]);
}

#[test]
fn short_output_needs_one_call() {
    let host = host_with_tables(vec!["Notable".to_string()]);
    assert_eq!(host.report_table_assocs(ItemId::new(1).unwrap()).unwrap(), vec!["Notable"]);
    assert_eq!(assoc_requests(), vec![64]);
}

#[test]
fn table_names_keep_their_whitespace() {
    let tables = vec![" Leading".to_string(), "Trailing ".to_string(), "In between".to_string()];
    let host = host_with_tables(tables.clone());
    assert_eq!(host.report_table_assocs(ItemId::new(1).unwrap()).unwrap(), tables);
}

#[test]
fn no_data_ends_after_one_call() {
    let host = host_with_tables(Vec::new());
    assert!(host.report_table_assocs(ItemId::new(1).unwrap()).unwrap().is_empty());
    assert_eq!(assoc_requests(), vec![64]);
    assert!(host.buffer_stats().is_balanced());
}

#[test]
fn output_beyond_the_ceiling_fails() {
    let host = host_with_tables(listing_of(40_000));
    let err = host.report_table_assocs(ItemId::new(1).unwrap()).unwrap_err();
    match err {
        XwfError::BufferLimit { symbol, limit, attempts } => {
            assert_eq!(symbol, "XWF_GetReportTableAssocs");
            assert_eq!(limit, 64 * 1024);
            assert_eq!(attempts, 10);
        }
        other => panic!("expected BufferLimit, got {other:?}"),
    }
    assert_eq!(calls("XWF_GetReportTableAssocs"), 10);
    assert_eq!(assoc_requests().last(), Some(&(32 * 1024)));
    assert!(host.buffer_stats().is_balanced());
}

#[test]
fn linear_growth_policy() {
    let policy = GrowthPolicy {
        initial_bytes: 100,
        strategy: Growth::Linear(100),
        ceiling_bytes: 1000,
    };
    let tables = listing_of(120);
    let host = host_with_tables_and(tables.clone(), BindingConfig::new().growth(policy));
    assert_eq!(host.report_table_assocs(ItemId::new(1).unwrap()).unwrap(), tables);
    assert_eq!(assoc_requests(), vec![50, 100, 150]);
}

proptest! {
    #[test]
    fn any_listing_under_the_ceiling_is_recovered(tables in report_tables_strategy()) {
        let host = host_with_tables(tables.clone());
        let listed = host.report_table_assocs(ItemId::new(1).unwrap()).unwrap();
        prop_assert_eq!(listed, tables.clone());

        let needed = tables.join(", ").encode_utf16().count() + 1;
        let requests = assoc_requests();
        // Every request but the last was too small.
        for units in &requests[..requests.len() - 1] {
            prop_assert!((*units as usize) <= needed);
        }
        prop_assert!(*requests.last().unwrap() as usize > needed || tables.is_empty());
        prop_assert!(host.buffer_stats().is_balanced());
    }
}
