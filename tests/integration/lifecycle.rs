#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use cairn::{AttributeTable, FieldType, TableError, TableOptions};
use tempfile::tempdir;

#[test]
fn create_then_import_preserves_size_and_empty_schema() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("att.cairn");

    let table = AttributeTable::create(500, &path, TableOptions::default()).expect("create");
    assert_eq!(table.size(), 500);
    table.close().expect("close");

    let table = AttributeTable::import(&path, TableOptions::default()).expect("import");
    assert_eq!(table.size(), 500);
    assert_eq!(table.field_count(FieldType::Bool), 0);
    assert_eq!(table.field_count(FieldType::Int), 0);
    assert_eq!(table.field_count(FieldType::Float), 0);
    assert_eq!(table.max_degree(), 25);
}

#[test]
fn create_rejects_zero_rows() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("empty.cairn");
    assert!(matches!(
        AttributeTable::create(0, &path, TableOptions::default()),
        Err(TableError::InvalidArgument(_))
    ));
}

#[test]
fn import_of_missing_file_is_io_error() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("absent.cairn");
    assert!(matches!(
        AttributeTable::import(&path, TableOptions::default()),
        Err(TableError::Io(_))
    ));
}

#[test]
fn import_of_garbage_is_corruption() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("garbage.cairn");
    std::fs::write(&path, vec![0xABu8; 4096]).expect("write garbage");

    assert!(matches!(
        AttributeTable::import(&path, TableOptions::default()),
        Err(TableError::Corruption(_))
    ));
}

#[test]
fn header_size_disagreeing_with_datasets_is_corruption() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("mismatch.cairn");

    {
        let mut table =
            AttributeTable::create(10, &path, TableOptions::default()).expect("create");
        table.add_int_field("area", 0).expect("add field");
        table.close().expect("close");
    }

    // Bump the declared row count so the datasets no longer agree with it.
    {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .expect("reopen raw");
        let mut rows = [0u8; 8];
        file.seek(SeekFrom::Start(cairn::store::container::HEADER_ROWS_OFFSET as u64))
            .expect("seek");
        file.read_exact(&mut rows).expect("read rows");
        let declared = u64::from_le_bytes(rows);
        assert_eq!(declared, 10);
        file.seek(SeekFrom::Start(cairn::store::container::HEADER_ROWS_OFFSET as u64))
            .expect("seek");
        file.write_all(&(declared + 1).to_le_bytes()).expect("patch rows");
    }

    assert!(matches!(
        AttributeTable::import(&path, TableOptions::default()),
        Err(TableError::Corruption(_))
    ));
}

#[test]
fn values_survive_a_close_and_import_cycle() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("persist.cairn");

    {
        let mut table =
            AttributeTable::create(10, &path, TableOptions::default()).expect("create");
        table.add_int_field("area", 0).expect("area");
        table.add_float_field("mean_b1", -1.0).expect("mean_b1");

        let mut feature = table.checkout(4).expect("checkout");
        feature.ints[0] = 1234;
        feature.floats[0] = 0.25;
        feature.neighbours = vec![3, 5];
        table.return_feature(feature, true).expect("return");
        table.close().expect("close");
    }

    let mut table = AttributeTable::import(&path, TableOptions::default()).expect("import");
    assert!(table.has_field("area"));
    assert_eq!(table.field_type("mean_b1").expect("type"), FieldType::Float);

    let feature = table.checkout(4).expect("checkout");
    assert_eq!(feature.ints, vec![1234]);
    assert_eq!(feature.floats, vec![0.25]);
    assert_eq!(feature.neighbours, vec![3, 5]);

    // A row never written still carries the defaults.
    let other = table.checkout(9).expect("checkout");
    assert_eq!(other.ints, vec![0]);
    assert_eq!(other.floats, vec![-1.0]);
    assert!(other.neighbours.is_empty());
}

#[test]
fn drop_without_close_still_persists() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("dropped.cairn");

    {
        let mut table =
            AttributeTable::create(5, &path, TableOptions::default()).expect("create");
        table.add_int_field("area", 7).expect("area");
        // Dropped here without an explicit close.
    }

    let mut table = AttributeTable::import(&path, TableOptions::default()).expect("import");
    assert_eq!(table.field_count(FieldType::Int), 1);
    assert_eq!(table.checkout(0).expect("checkout").ints, vec![7]);
}
