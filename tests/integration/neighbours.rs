#![allow(missing_docs)]

use cairn::{AttributeTable, TableError, TableOptions};
use tempfile::tempdir;

#[test]
fn neighbour_lists_roundtrip() {
    let dir = tempdir().expect("temp dir");
    let mut table = AttributeTable::create(
        5,
        &dir.path().join("roundtrip.cairn"),
        TableOptions::default(),
    )
    .expect("create");

    table.set_neighbours(2, &[1, 3]).expect("set");
    assert_eq!(table.neighbours(2).expect("get"), vec![1, 3]);
    assert!(table.neighbours(0).expect("get").is_empty());
}

#[test]
fn merge_update_leaves_no_stale_duplicate() {
    let dir = tempdir().expect("temp dir");
    let mut table = AttributeTable::create(
        5,
        &dir.path().join("merge.cairn"),
        TableOptions::default(),
    )
    .expect("create");

    // Rows 0..4; row 2 borders rows 1 and 3.
    table.set_neighbours(2, &[1, 3]).expect("set");

    // An external merge folds row 3 into row 1: row 2 now borders only 1.
    table.set_neighbours(2, &[1]).expect("rewrite");
    assert_eq!(table.neighbours(2).expect("get"), vec![1]);
}

#[test]
fn wide_lists_grow_the_matrix_and_persist() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("grow.cairn");
    let opts = TableOptions::new().initial_max_degree(4).max_degree_limit(64);

    let wide: Vec<u64> = (0..11).collect();
    {
        let mut table = AttributeTable::create(20, &path, opts.clone()).expect("create");
        assert_eq!(table.max_degree(), 4);
        table.set_neighbours(7, &wide).expect("set wide");
        assert_eq!(table.max_degree(), 16);
        assert_eq!(table.neighbours(7).expect("get"), wide);
        table.close().expect("close");
    }

    let mut table = AttributeTable::import(&path, opts).expect("import");
    assert_eq!(table.max_degree(), 16);
    assert_eq!(table.neighbours(7).expect("get"), wide);
    assert!(table.neighbours(6).expect("get").is_empty());
}

#[test]
fn lists_over_the_ceiling_are_rejected() {
    let dir = tempdir().expect("temp dir");
    let opts = TableOptions::new().initial_max_degree(4).max_degree_limit(8);
    let mut table = AttributeTable::create(
        5,
        &dir.path().join("ceiling.cairn"),
        opts,
    )
    .expect("create");

    let too_wide: Vec<u64> = (0..9).collect();
    assert!(matches!(
        table.set_neighbours(0, &too_wide),
        Err(TableError::CapacityExceeded {
            requested: 9,
            limit: 8
        })
    ));
    assert!(table.neighbours(0).expect("get").is_empty());
    assert_eq!(table.max_degree(), 4, "a rejected write must not widen");
}

#[test]
fn neighbours_written_through_checkout_sync() {
    let dir = tempdir().expect("temp dir");
    let mut table = AttributeTable::create(
        6,
        &dir.path().join("feature.cairn"),
        TableOptions::default(),
    )
    .expect("create");

    let mut feature = table.checkout(4).expect("checkout");
    feature.neighbours = vec![0, 2, 5];
    table.return_feature(feature, true).expect("return");

    assert_eq!(table.neighbours(4).expect("get"), vec![0, 2, 5]);
    assert_eq!(table.checkout(4).expect("checkout").neighbours, vec![0, 2, 5]);
}
