//! The 256-byte prologue at offset 0 of every data file and index file:
//! magic, file kind, head block id, page count, an opaque timestamp, and a
//! checksum. Pages follow starting at byte offset `ROOT_SIZE`.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::page::{MAGIC, ROOT_SIZE};

const MAGIC_OFF: usize = 0;
const KIND_OFF: usize = 4;
const HEAD_OFF: usize = 6;
const CNT_OFF: usize = 10;
const TIMESTAMP_OFF: usize = 14;
const CHECKSUM_OFF: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Data,
    Index,
}

impl RootKind {
    fn code(self) -> u16 {
        match self {
            RootKind::Data => 1,
            RootKind::Index => 2,
        }
    }

    fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(RootKind::Data),
            2 => Some(RootKind::Index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RootBlock {
    pub kind: RootKind,
    /// Head block id: first data page, or the B+ tree root index page.
    pub head: u32,
    /// Total page count allocated in the file so far.
    pub cnt: u32,
    /// Caller-supplied opaque stamp; the engine never reads a clock itself.
    pub timestamp: u64,
}

impl RootBlock {
    pub fn fresh(kind: RootKind, head: u32, timestamp: u64) -> Self {
        RootBlock {
            kind,
            head,
            cnt: 1,
            timestamp,
        }
    }

    pub fn write(&self, buf: &mut [u8]) {
        for b in buf[..ROOT_SIZE].iter_mut() {
            *b = 0;
        }
        BigEndian::write_u32(&mut buf[MAGIC_OFF..], MAGIC);
        BigEndian::write_u16(&mut buf[KIND_OFF..], self.kind.code());
        BigEndian::write_u32(&mut buf[HEAD_OFF..], self.head);
        BigEndian::write_u32(&mut buf[CNT_OFF..], self.cnt);
        BigEndian::write_u64(&mut buf[TIMESTAMP_OFF..], self.timestamp);
        BigEndian::write_u32(&mut buf[CHECKSUM_OFF..], 0);
        let sum = crc32fast::hash(&buf[..ROOT_SIZE]);
        BigEndian::write_u32(&mut buf[CHECKSUM_OFF..], sum);
    }

    pub fn read(buf: &[u8]) -> Result<Self> {
        if BigEndian::read_u32(&buf[MAGIC_OFF..]) != MAGIC {
            return Err(Error::Corruption {
                blockid: 0,
                reason: "root block: bad magic",
            });
        }
        let stored = BigEndian::read_u32(&buf[CHECKSUM_OFF..]);
        let mut scratch = buf[..ROOT_SIZE].to_vec();
        BigEndian::write_u32(&mut scratch[CHECKSUM_OFF..], 0);
        if crc32fast::hash(&scratch) != stored {
            return Err(Error::Corruption {
                blockid: 0,
                reason: "root block: checksum mismatch",
            });
        }
        let kind = RootKind::from_code(BigEndian::read_u16(&buf[KIND_OFF..])).ok_or(
            Error::Corruption {
                blockid: 0,
                reason: "root block: unknown kind",
            },
        )?;
        Ok(RootBlock {
            kind,
            head: BigEndian::read_u32(&buf[HEAD_OFF..]),
            cnt: BigEndian::read_u32(&buf[CNT_OFF..]),
            timestamp: BigEndian::read_u64(&buf[TIMESTAMP_OFF..]),
        })
    }
}

/// Byte offset of `blockid` (1-based) within its file.
pub fn page_offset(blockid: u32) -> u64 {
    (blockid as u64 - 1) * crate::page::PAGE_SIZE as u64 + ROOT_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let rb = RootBlock::fresh(RootKind::Data, 1, 42);
        let mut buf = vec![0u8; ROOT_SIZE];
        rb.write(&mut buf);
        let back = RootBlock::read(&buf).unwrap();
        assert_eq!(back.head, 1);
        assert_eq!(back.cnt, 1);
        assert_eq!(back.timestamp, 42);
    }

    #[test]
    fn page_offsets_are_contiguous() {
        assert_eq!(page_offset(1), ROOT_SIZE as u64);
        assert_eq!(page_offset(2), ROOT_SIZE as u64 + crate::page::PAGE_SIZE as u64);
    }
}
