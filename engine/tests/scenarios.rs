//! End-to-end scenarios exercising real files on disk (restart persistence
//! in particular needs more than an in-memory `Cursor`).

use rowstore::disk::RandomAccessFile;
use rowstore::{FieldInfo, FieldType, RelationInfo, Table};

fn people_relation(dir: &std::path::Path) -> RelationInfo {
    RelationInfo::new(
        "people",
        vec![
            FieldInfo::new("id", 0, 8, FieldType::BigInt),
            FieldInfo::new("phone", 1, 11, FieldType::Char),
            FieldInfo::new("name", 2, -440, FieldType::VarChar),
        ],
        0,
        dir.join("people.dat"),
        dir.join("people.idx"),
    )
}

fn phone_field() -> &'static [u8] {
    b"13534500702"
}

fn name_blob() -> Vec<u8> {
    vec![b'n'; 440]
}

#[test]
fn empty_scan_yields_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let relation = people_relation(dir.path());
    Table::<RandomAccessFile>::create(&relation, 0).unwrap();
    let mut table = Table::<RandomAccessFile>::open(relation, 0).unwrap();
    let rows: Vec<_> = table.scan().unwrap().collect();
    assert!(rows.is_empty());
}

#[test]
fn descending_insert_then_scan_is_ascending() {
    let dir = tempfile::tempdir().unwrap();
    let relation = people_relation(dir.path());
    Table::<RandomAccessFile>::create(&relation, 0).unwrap();
    let mut table = Table::<RandomAccessFile>::open(relation, 0).unwrap();

    let n = 2_000i64;
    let name = name_blob();
    for k in (1..=n).rev() {
        let kb = k.to_be_bytes();
        let fields: [&[u8]; 3] = [&kb, phone_field(), &name];
        table.insert(0, &fields).unwrap();
    }

    let rows: Vec<(i64, Vec<u8>)> = table
        .scan()
        .unwrap()
        .map(|r| {
            let (_, fields) = r.unwrap();
            (
                i64::from_be_bytes(fields[0].clone().try_into().unwrap()),
                fields[1].clone(),
            )
        })
        .collect();

    let keys: Vec<i64> = rows.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, (1..=n).collect::<Vec<_>>());
    assert!(rows.iter().all(|(_, phone)| phone == phone_field()));
}

#[test]
fn prefix_delete_advances_minimum_key() {
    let dir = tempfile::tempdir().unwrap();
    let relation = people_relation(dir.path());
    Table::<RandomAccessFile>::create(&relation, 0).unwrap();
    let mut table = Table::<RandomAccessFile>::open(relation, 0).unwrap();

    let n = 2_000i64;
    let name = name_blob();
    for k in 1..=n {
        let kb = k.to_be_bytes();
        let fields: [&[u8]; 3] = [&kb, phone_field(), &name];
        table.insert(0, &fields).unwrap();
    }

    for k in 1..n {
        table.remove(&k.to_be_bytes()).unwrap();
        let mut scan = table.scan().unwrap();
        let (_, first) = scan.next().unwrap().unwrap();
        let min_key = i64::from_be_bytes(first[0].clone().try_into().unwrap());
        assert_eq!(min_key, k + 1);
        assert_eq!(first[1], phone_field());
    }
}

#[test]
fn split_produces_single_parent_slot_with_matching_separator() {
    let dir = tempfile::tempdir().unwrap();
    let relation = people_relation(dir.path());
    Table::<RandomAccessFile>::create(&relation, 0).unwrap();
    let mut table = Table::<RandomAccessFile>::open(relation.clone(), 0).unwrap();

    // Each row is ~470 bytes on disk; 9 rows overflow one 4 KiB leaf, forcing
    // exactly one split.
    let name = name_blob();
    for k in 1..=9i64 {
        let kb = k.to_be_bytes();
        let fields: [&[u8]; 3] = [&kb, phone_field(), &name];
        table.insert(0, &fields).unwrap();
    }

    let entries = table.leaf_parent_entries(&1i64.to_be_bytes()).unwrap();
    assert_eq!(entries.len(), 1, "parent holds exactly one new slot");
    let (separator, new_leaf_id) = &entries[0];

    let new_leaf_buf = table.read_data_page(*new_leaf_id).unwrap();
    let min_key = rowstore::page::data_page::min_key(&new_leaf_buf, &relation);
    assert_eq!(min_key, separator.as_slice());
}

#[test]
fn split_then_merge_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let relation = people_relation(dir.path());
    Table::<RandomAccessFile>::create(&relation, 0).unwrap();
    let mut table = Table::<RandomAccessFile>::open(relation, 0).unwrap();

    let name = name_blob();
    for k in 1..=300i64 {
        let kb = k.to_be_bytes();
        let fields: [&[u8]; 3] = [&kb, phone_field(), &name];
        table.insert(0, &fields).unwrap();
    }
    let full: Vec<i64> = table
        .scan()
        .unwrap()
        .map(|r| i64::from_be_bytes(r.unwrap().1[0].clone().try_into().unwrap()))
        .collect();
    assert_eq!(full, (1..=300).collect::<Vec<_>>());

    for k in 1..=250i64 {
        table.remove(&k.to_be_bytes()).unwrap();
    }
    let remaining: Vec<i64> = table
        .scan()
        .unwrap()
        .map(|r| i64::from_be_bytes(r.unwrap().1[0].clone().try_into().unwrap()))
        .collect();
    assert_eq!(remaining, (251..=300).collect::<Vec<_>>());
}

#[test]
fn restart_persists_all_rows() {
    let dir = tempfile::tempdir().unwrap();
    let relation = people_relation(dir.path());
    Table::<RandomAccessFile>::create(&relation, 0).unwrap();

    let (data_pages_before, index_pages_before);
    {
        let mut table = Table::<RandomAccessFile>::open(relation.clone(), 0).unwrap();
        let name = name_blob();
        for k in (1..=500i64).rev() {
            let kb = k.to_be_bytes();
            let fields: [&[u8]; 3] = [&kb, phone_field(), &name];
            table.insert(0, &fields).unwrap();
        }
        data_pages_before = table.data_page_count();
        index_pages_before = table.index_page_count();
        table.close();
    }

    let mut table = Table::<RandomAccessFile>::open(relation, 0).unwrap();
    assert_eq!(table.data_page_count(), data_pages_before, "block_num bit-identical across restart");
    assert_eq!(table.index_page_count(), index_pages_before, "index_block_num bit-identical across restart");

    let rows: Vec<i64> = table
        .scan()
        .unwrap()
        .map(|r| i64::from_be_bytes(r.unwrap().1[0].clone().try_into().unwrap()))
        .collect();
    assert_eq!(rows, (1..=500).collect::<Vec<_>>());
}
