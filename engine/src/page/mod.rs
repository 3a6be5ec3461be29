//! Slotted page layout shared by meta, data, and index pages. The original
//! reference implementation copied these routines once per page kind; here
//! they are written once and parameterized by `PageKind::header_size`.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::record;
use crate::relation::FieldType;

pub mod data_page;
pub mod index_page;

pub const PAGE_SIZE: usize = 4096;
pub const ROOT_SIZE: usize = 256;
pub const ALIGN_SIZE: usize = 4;
pub const MAGIC: u32 = 0x4254_5245; // "BTRE"
pub const NONE_ID: u32 = u32::MAX;

pub const SPACEID_META: u32 = 0xFFFF_FFFF;
pub const SPACEID_DATA: u32 = 1;
pub const SPACEID_INDEX: u32 = 2;

pub const NODE_TYPE_INTERNAL: u8 = 0;
pub const NODE_TYPE_POINT_TO_LEAF: u8 = 1;

const MAGIC_OFF: usize = 0;
const SPACEID_OFF: usize = 4;
const BLOCKID_OFF: usize = 8;
const NEXTID_OFF: usize = 12;
const FREESPACE_OFF: usize = 16;
const USEDSPACE_OFF: usize = 18;
const CHECKSUM_OFF: usize = 20;
pub const COMMON_HEADER_SIZE: usize = 24;

const SLOTS_NUM_OFF: usize = COMMON_HEADER_SIZE;
pub const DATA_HEADER_SIZE: usize = SLOTS_NUM_OFF + 2;

const NODE_TYPE_OFF: usize = DATA_HEADER_SIZE;
pub const INDEX_HEADER_SIZE: usize = NODE_TYPE_OFF + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Meta,
    Data,
    Index,
}

impl PageKind {
    pub fn spaceid(self) -> u32 {
        match self {
            PageKind::Meta => SPACEID_META,
            PageKind::Data => SPACEID_DATA,
            PageKind::Index => SPACEID_INDEX,
        }
    }

    pub fn header_size(self) -> usize {
        match self {
            PageKind::Meta => COMMON_HEADER_SIZE,
            PageKind::Data => DATA_HEADER_SIZE,
            PageKind::Index => INDEX_HEADER_SIZE,
        }
    }

    pub fn initial_free_space(self) -> usize {
        PAGE_SIZE - self.header_size()
    }
}

pub fn magic(buf: &[u8]) -> u32 {
    BigEndian::read_u32(&buf[MAGIC_OFF..])
}

pub fn spaceid(buf: &[u8]) -> u32 {
    BigEndian::read_u32(&buf[SPACEID_OFF..])
}

pub fn blockid(buf: &[u8]) -> u32 {
    BigEndian::read_u32(&buf[BLOCKID_OFF..])
}

pub fn set_blockid(buf: &mut [u8], id: u32) {
    BigEndian::write_u32(&mut buf[BLOCKID_OFF..], id);
}

pub fn nextid(buf: &[u8]) -> u32 {
    BigEndian::read_u32(&buf[NEXTID_OFF..])
}

pub fn set_nextid(buf: &mut [u8], id: u32) {
    BigEndian::write_u32(&mut buf[NEXTID_OFF..], id);
}

pub fn freespace(buf: &[u8]) -> u16 {
    BigEndian::read_u16(&buf[FREESPACE_OFF..])
}

fn set_freespace(buf: &mut [u8], v: u16) {
    BigEndian::write_u16(&mut buf[FREESPACE_OFF..], v);
}

pub fn usedspace(buf: &[u8]) -> u16 {
    BigEndian::read_u16(&buf[USEDSPACE_OFF..])
}

fn set_usedspace(buf: &mut [u8], v: u16) {
    BigEndian::write_u16(&mut buf[USEDSPACE_OFF..], v);
}

fn checksum(buf: &[u8]) -> u32 {
    BigEndian::read_u32(&buf[CHECKSUM_OFF..])
}

fn set_checksum(buf: &mut [u8], v: u32) {
    BigEndian::write_u32(&mut buf[CHECKSUM_OFF..], v);
}

pub fn slots_num(buf: &[u8]) -> u16 {
    BigEndian::read_u16(&buf[SLOTS_NUM_OFF..])
}

fn set_slots_num(buf: &mut [u8], v: u16) {
    BigEndian::write_u16(&mut buf[SLOTS_NUM_OFF..], v);
}

pub fn node_type(buf: &[u8]) -> u8 {
    buf[NODE_TYPE_OFF]
}

pub fn set_node_type(buf: &mut [u8], t: u8) {
    buf[NODE_TYPE_OFF] = t;
}

fn slot_dir_offset(i: usize) -> usize {
    PAGE_SIZE - 2 * (i + 1)
}

pub fn get_slot(buf: &[u8], i: usize) -> u16 {
    BigEndian::read_u16(&buf[slot_dir_offset(i)..])
}

fn set_slot(buf: &mut [u8], i: usize, off: u16) {
    BigEndian::write_u16(&mut buf[slot_dir_offset(i)..], off);
}

/// Zeroes the frame and writes a fresh header for `kind`/`blockid`.
pub fn clear(buf: &mut [u8], kind: PageKind, blockid: u32) {
    for b in buf.iter_mut() {
        *b = 0;
    }
    BigEndian::write_u32(&mut buf[MAGIC_OFF..], MAGIC);
    BigEndian::write_u32(&mut buf[SPACEID_OFF..], kind.spaceid());
    set_blockid(buf, blockid);
    set_nextid(buf, NONE_ID);
    set_freespace(buf, kind.header_size() as u16);
    set_usedspace(buf, 0);
    if kind != PageKind::Meta {
        set_slots_num(buf, 0);
    }
    if kind == PageKind::Index {
        set_node_type(buf, NODE_TYPE_POINT_TO_LEAF);
    }
}

/// Finalizes the checksum; must be the last write before persisting a page.
pub fn finish(buf: &mut [u8]) {
    set_checksum(buf, 0);
    let sum = crc32fast::hash(buf);
    set_checksum(buf, sum);
}

/// Verifies magic and checksum on a page freshly read from disk.
pub fn verify(buf: &[u8]) -> Result<()> {
    if magic(buf) != MAGIC {
        return Err(Error::Corruption {
            blockid: blockid(buf),
            reason: "bad magic",
        });
    }
    let stored = checksum(buf);
    let mut scratch = buf.to_vec();
    set_checksum(&mut scratch, 0);
    let computed = crc32fast::hash(&scratch);
    if stored != computed {
        return Err(Error::Corruption {
            blockid: blockid(buf),
            reason: "checksum mismatch",
        });
    }
    Ok(())
}

/// Bytes free between the record heap and the slot directory tail.
fn free_length(buf: &[u8]) -> usize {
    let tail = PAGE_SIZE - 2 * slots_num(buf) as usize;
    tail.saturating_sub(freespace(buf) as usize)
}

/// Appends a new record as the last slot (slot order is fixed up separately
/// by `sort_by_key`). Returns `false` if the record does not fit even after
/// compaction.
pub fn allocate(buf: &mut [u8], header_size: usize, header: u8, fields: &[&[u8]]) -> bool {
    let (aligned, _) = record::size(fields);
    if aligned + 2 > free_length(buf) {
        let used = usedspace(buf) as usize;
        let capacity = PAGE_SIZE - header_size;
        if aligned + 2 > capacity - used {
            return false;
        }
        rewrite(buf, header_size);
        if aligned + 2 > free_length(buf) {
            return false;
        }
    }
    let at = freespace(buf) as usize;
    record::write(&mut buf[at..at + aligned], header, fields);
    let n = slots_num(buf) as usize;
    set_slot(buf, n, at as u16);
    set_slots_num(buf, (n + 1) as u16);
    set_freespace(buf, (at + aligned) as u16);
    set_usedspace(buf, (usedspace(buf) as usize + aligned + 2) as u16);
    true
}

/// Removes the slot whose `key_field_index`-th field equals `key`. Returns
/// the removed slot's index (0 means the page's minimum key changed).
pub fn rec_delete(
    buf: &mut [u8],
    key_field_index: usize,
    field_type: FieldType,
    key: &[u8],
) -> Option<usize> {
    let n = slots_num(buf) as usize;
    let mut found = None;
    for i in 0..n {
        let off = get_slot(buf, i) as usize;
        let existing = record::field_at(&buf[off..], key_field_index);
        if field_type.eq(existing, key) {
            found = Some(i);
            break;
        }
    }
    let i = found?;
    let off = get_slot(buf, i) as usize;
    let aligned = record::aligned_len(&buf[off..]);
    for j in i..n - 1 {
        let next = get_slot(buf, j + 1);
        set_slot(buf, j, next);
    }
    set_slots_num(buf, (n - 1) as u16);
    set_usedspace(buf, (usedspace(buf) as usize - aligned - 2) as u16);
    Some(i)
}

/// Re-sorts the slot directory by the key field, ascending. Must be called
/// after every `allocate` before the page is persisted (I4/X1).
pub fn sort_by_key(buf: &mut [u8], key_field_index: usize, field_type: FieldType) {
    let n = slots_num(buf) as usize;
    let mut offsets: Vec<u16> = (0..n).map(|i| get_slot(buf, i)).collect();
    offsets.sort_by(|&a, &b| {
        let ka = record::field_at(&buf[a as usize..], key_field_index);
        let kb = record::field_at(&buf[b as usize..], key_field_index);
        if field_type.lt(ka, kb) {
            std::cmp::Ordering::Less
        } else if field_type.lt(kb, ka) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
    for (i, off) in offsets.into_iter().enumerate() {
        set_slot(buf, i, off);
    }
}

/// Compacts the record heap in place, preserving slot order, reclaiming
/// space left behind by deletes.
pub fn rewrite(buf: &mut [u8], header_size: usize) {
    let n = slots_num(buf) as usize;
    let mut records: Vec<Vec<u8>> = Vec::with_capacity(n);
    for i in 0..n {
        let off = get_slot(buf, i) as usize;
        let len = record::aligned_len(&buf[off..]);
        records.push(buf[off..off + len].to_vec());
    }
    let mut pos = header_size;
    for (i, rec) in records.iter().enumerate() {
        buf[pos..pos + rec.len()].copy_from_slice(rec);
        set_slot(buf, i, pos as u16);
        pos += rec.len();
    }
    set_freespace(buf, pos as u16);
    set_usedspace(buf, (pos - header_size + 2 * n) as u16);
}
