//! Root-block-plus-pages file access shared by the leaf chain (the data
//! file) and the B+ tree (the index file) — both are "a 256-byte header
//! followed by contiguous 4 KiB pages," so one type backs both.

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::page::{self, PageKind, PAGE_SIZE, ROOT_SIZE};
use crate::root_block::{self, RootBlock, RootKind};

pub struct PagedFile<D: Disk> {
    disk: D,
    root: RootBlock,
}

impl<D: Disk> PagedFile<D> {
    /// Opens an existing file, or creates one with a single empty page of
    /// `kind` as both head and root.
    pub fn open_or_create(mut disk: D, kind: RootKind, page_kind: PageKind, timestamp: u64) -> Result<Self> {
        let len = disk.length()?;
        if len == 0 {
            let mut root = RootBlock::fresh(kind, 1, timestamp);
            let mut root_buf = vec![0u8; ROOT_SIZE];
            root.write(&mut root_buf);
            disk.write_at(0, &root_buf)?;

            let mut page_buf = vec![0u8; PAGE_SIZE];
            page::clear(&mut page_buf, page_kind, 1);
            if page_kind == PageKind::Index {
                page::set_node_type(&mut page_buf, page::NODE_TYPE_POINT_TO_LEAF);
            }
            page::finish(&mut page_buf);
            disk.write_at(root_block::page_offset(1), &page_buf)?;
            root.cnt = 1;
            return Ok(PagedFile { disk, root });
        }
        let mut root_buf = vec![0u8; ROOT_SIZE];
        disk.read_at(0, &mut root_buf)?;
        let root = RootBlock::read(&root_buf)?;
        if root.kind != kind {
            return Err(Error::Corruption {
                blockid: 0,
                reason: "root block: kind mismatch",
            });
        }
        Ok(PagedFile { disk, root })
    }

    pub fn head(&self) -> u32 {
        self.root.head
    }

    pub fn set_head(&mut self, head: u32) -> Result<()> {
        self.root.head = head;
        self.persist_root()
    }

    pub fn page_count(&self) -> u32 {
        self.root.cnt
    }

    fn persist_root(&mut self) -> Result<()> {
        let mut buf = vec![0u8; ROOT_SIZE];
        self.root.write(&mut buf);
        self.disk.write_at(0, &buf)?;
        Ok(())
    }

    /// Reserves and returns a fresh block id; persists the new page count.
    pub fn allocate_blockid(&mut self) -> Result<u32> {
        self.root.cnt += 1;
        let id = self.root.cnt;
        self.persist_root()?;
        Ok(id)
    }

    pub fn read_page(&mut self, blockid: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.disk.read_at(root_block::page_offset(blockid), &mut buf)?;
        page::verify(&buf)?;
        Ok(buf)
    }

    /// Writes a page back; the caller must have called `page::finish` on it.
    pub fn write_page(&mut self, blockid: u32, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(page::blockid(buf), blockid);
        self.disk.write_at(root_block::page_offset(blockid), buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn create_then_reopen_preserves_head_and_count() {
        let disk = Cursor::new(Vec::new());
        let mut pf = PagedFile::open_or_create(disk, RootKind::Data, PageKind::Data, 7).unwrap();
        assert_eq!(pf.head(), 1);
        assert_eq!(pf.page_count(), 1);
        let id = pf.allocate_blockid().unwrap();
        assert_eq!(id, 2);
        assert_eq!(pf.page_count(), 2);
    }
}
