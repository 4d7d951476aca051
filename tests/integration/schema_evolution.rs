#![allow(missing_docs)]

use cairn::{AttributeTable, FieldDef, FieldType, TableError, TableOptions};
use tempfile::tempdir;

fn small_table(path: &std::path::Path) -> AttributeTable {
    // Tiny chunks so multi-batch backfill paths run even on small tables.
    let opts = TableOptions::new().chunk_rows(4);
    AttributeTable::create(10, path, opts).expect("create")
}

#[test]
fn new_fields_backfill_every_existing_row() {
    let dir = tempdir().expect("temp dir");
    let mut table = small_table(&dir.path().join("backfill.cairn"));

    table.add_bool_field("visited", false).expect("visited");
    table.add_int_field("area", 3).expect("area");
    table.add_float_field("mean_b1", 0.5).expect("mean_b1");

    for fid in 0..table.size() {
        let feature = table.checkout(fid).expect("checkout");
        assert_eq!(feature.bools, vec![false]);
        assert_eq!(feature.ints, vec![3]);
        assert_eq!(feature.floats, vec![0.5]);
    }
}

#[test]
fn second_field_of_a_type_appends_a_slot() {
    let dir = tempdir().expect("temp dir");
    let mut table = small_table(&dir.path().join("slots.cairn"));

    table.add_int_field("area", 0).expect("area");
    let mut feature = table.checkout(2).expect("checkout");
    feature.ints[0] = 77;
    table.return_feature(feature, true).expect("return");

    table.add_int_field("perimeter", -1).expect("perimeter");
    assert_eq!(table.field_count(FieldType::Int), 2);
    assert_eq!(
        table.field_names(FieldType::Int),
        ["area".to_string(), "perimeter".to_string()]
    );

    // Existing values keep their slot; the new slot reads its default.
    let feature = table.checkout(2).expect("checkout");
    assert_eq!(feature.ints, vec![77, -1]);
}

#[test]
fn duplicate_field_fails_and_leaves_the_table_unchanged() {
    let dir = tempdir().expect("temp dir");
    let mut table = small_table(&dir.path().join("dup.cairn"));

    table.add_int_field("area", 0).expect("area");
    assert!(matches!(
        table.add_int_field("area", 9),
        Err(TableError::DuplicateField(_))
    ));
    // Same name in a different type group is still a duplicate.
    assert!(matches!(
        table.add_float_field("area", 9.0),
        Err(TableError::DuplicateField(_))
    ));

    assert_eq!(table.field_count(FieldType::Int), 1);
    assert_eq!(table.field_count(FieldType::Float), 0);
    assert_eq!(table.checkout(0).expect("checkout").ints, vec![0]);
}

#[test]
fn string_fields_are_rejected() {
    let dir = tempdir().expect("temp dir");
    let mut table = small_table(&dir.path().join("string.cairn"));

    assert!(matches!(
        table.add_string_field("label", ""),
        Err(TableError::UnsupportedType(_))
    ));
    assert!(!table.has_field("label"));
}

#[test]
fn field_type_lookup() {
    let dir = tempdir().expect("temp dir");
    let mut table = small_table(&dir.path().join("lookup.cairn"));

    table.add_float_field("mean_b1", 0.0).expect("mean_b1");
    assert!(table.has_field("mean_b1"));
    assert_eq!(table.field_type("mean_b1").expect("type"), FieldType::Float);
    assert!(matches!(
        table.field_type("missing"),
        Err(TableError::UnknownField(_))
    ));
}

#[test]
fn bulk_add_fields_uses_zero_defaults() {
    let dir = tempdir().expect("temp dir");
    let mut table = small_table(&dir.path().join("bulk.cairn"));

    table
        .add_fields(&[
            FieldDef::new("visited", FieldType::Bool),
            FieldDef::new("area", FieldType::Int),
            FieldDef::new("mean_b1", FieldType::Float),
        ])
        .expect("bulk add");

    let feature = table.checkout(0).expect("checkout");
    assert_eq!(feature.bools, vec![false]);
    assert_eq!(feature.ints, vec![0]);
    assert_eq!(feature.floats, vec![0.0]);

    // A string entry fails, and the fields before it are already in.
    let result = table.add_fields(&[
        FieldDef::new("perimeter", FieldType::Int),
        FieldDef::new("label", FieldType::String),
    ]);
    assert!(matches!(result, Err(TableError::UnsupportedType(_))));
    assert!(table.has_field("perimeter"));
    assert!(!table.has_field("label"));
}

#[test]
fn schema_survives_reimport() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("reimport.cairn");

    {
        let mut table = AttributeTable::create(10, &path, TableOptions::new().chunk_rows(4))
            .expect("create");
        table.add_bool_field("visited", true).expect("visited");
        table.add_int_field("area", 0).expect("area");
        table.add_int_field("perimeter", 0).expect("perimeter");
        table.close().expect("close");
    }

    let mut table = AttributeTable::import(&path, TableOptions::default()).expect("import");
    assert_eq!(table.field_count(FieldType::Bool), 1);
    assert_eq!(table.field_count(FieldType::Int), 2);
    assert_eq!(
        table.field_names(FieldType::Int),
        ["area".to_string(), "perimeter".to_string()]
    );
    assert_eq!(table.checkout(3).expect("checkout").bools, vec![true]);

    // Growth continues from the imported slots.
    table.add_int_field("n_pixels", 0).expect("n_pixels");
    assert_eq!(table.field_count(FieldType::Int), 3);
}
