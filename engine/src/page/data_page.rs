//! Clustered leaf page: a data page both stores rows and acts as a B+ tree
//! leaf. Records are kept sorted by the relation's key column (D2).

use crate::page::{self, PageKind};
use crate::relation::RelationInfo;

pub const HEADER_SIZE: usize = page::DATA_HEADER_SIZE;

pub fn new(blockid: u32) -> Vec<u8> {
    let mut buf = vec![0u8; page::PAGE_SIZE];
    page::clear(&mut buf, PageKind::Data, blockid);
    buf
}

/// Inserts one row, keeping slots sorted by key. `false` means the page is
/// full even after compaction and the caller must split.
pub fn insert(buf: &mut [u8], relation: &RelationInfo, header: u8, fields: &[&[u8]]) -> bool {
    if !page::allocate(buf, HEADER_SIZE, header, fields) {
        return false;
    }
    page::sort_by_key(buf, relation.key, relation.key_field().field_type);
    true
}

/// Removes the row whose key field equals `key`. `Some(0)` means the page's
/// minimum key changed and the parent separator must be updated.
pub fn delete(buf: &mut [u8], relation: &RelationInfo, key: &[u8]) -> Option<usize> {
    page::rec_delete(buf, relation.key, relation.key_field().field_type, key)
}

pub fn slot_count(buf: &[u8]) -> usize {
    page::slots_num(buf) as usize
}

pub fn fill(buf: &[u8]) -> usize {
    page::usedspace(buf) as usize
}

/// Key of the first (lowest) row on the page.
pub fn min_key<'a>(buf: &'a [u8], relation: &RelationInfo) -> &'a [u8] {
    let off = page::get_slot(buf, 0) as usize;
    crate::record::field_at(&buf[off..], relation.key)
}

/// `(header_byte, field bytes)` for every row, in key order.
pub fn entries(buf: &[u8]) -> Vec<(u8, Vec<Vec<u8>>)> {
    let n = slot_count(buf);
    (0..n)
        .map(|i| {
            let off = page::get_slot(buf, i) as usize;
            let header = crate::record::header_byte(&buf[off..]);
            let fields = crate::record::fields(&buf[off..])
                .into_iter()
                .map(|f| f.to_vec())
                .collect();
            (header, fields)
        })
        .collect()
}

/// Rebuilds `buf` as a fresh data page holding exactly `rows`, in order.
pub fn rebuild_into(
    buf: &mut [u8],
    blockid: u32,
    nextid: u32,
    relation: &RelationInfo,
    rows: &[(u8, Vec<Vec<u8>>)],
) {
    page::clear(buf, PageKind::Data, blockid);
    page::set_nextid(buf, nextid);
    for (header, fields) in rows {
        let refs: Vec<&[u8]> = fields.iter().map(|f| f.as_slice()).collect();
        page::allocate(buf, HEADER_SIZE, *header, &refs);
    }
    page::sort_by_key(buf, relation.key, relation.key_field().field_type);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{FieldInfo, FieldType};
    use std::path::PathBuf;

    fn relation() -> RelationInfo {
        RelationInfo::new(
            "t",
            vec![
                FieldInfo::new("id", 0, 8, FieldType::BigInt),
                FieldInfo::new("name", 1, -32, FieldType::VarChar),
            ],
            0,
            PathBuf::from("t.dat"),
            PathBuf::from("t.idx"),
        )
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let relation = relation();
        let mut buf = new(1);
        for k in [3i64, 1, 2] {
            let kb = k.to_be_bytes();
            let fields: [&[u8]; 2] = [&kb, b"row"];
            assert!(insert(&mut buf, &relation, 0, &fields));
        }
        assert_eq!(min_key(&buf, &relation), 1i64.to_be_bytes());
        let rows = entries(&buf);
        let keys: Vec<i64> = rows
            .iter()
            .map(|(_, f)| i64::from_be_bytes(f[0].clone().try_into().unwrap()))
            .collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn delete_reports_min_changed() {
        let relation = relation();
        let mut buf = new(1);
        for k in [1i64, 2] {
            let kb = k.to_be_bytes();
            let fields: [&[u8]; 2] = [&kb, b"row"];
            insert(&mut buf, &relation, 0, &fields);
        }
        let idx = delete(&mut buf, &relation, &1i64.to_be_bytes());
        assert_eq!(idx, Some(0));
    }
}
