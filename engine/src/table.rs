//! Clustered table: composes the data file (leaf chain) and the B+ tree
//! (index file) into ordered insert/remove/scan over a relation's key
//! column.

use crate::btree::BPlusTree;
use crate::datafile::PagedFile;
use crate::disk::{Disk, RandomAccessFile};
use crate::error::{Error, Result};
use crate::page::{self, data_page, PageKind};
use crate::relation::RelationInfo;
use crate::root_block::RootKind;

pub struct Table<D: Disk> {
    relation: RelationInfo,
    data: PagedFile<D>,
    tree: BPlusTree<D>,
}

impl<D: Disk> Table<D> {
    pub fn open_with(relation: RelationInfo, data_disk: D, index_disk: D, timestamp: u64) -> Result<Self> {
        let data = PagedFile::open_or_create(data_disk, RootKind::Data, PageKind::Data, timestamp)?;
        let leaf_block = data.head();
        let tree = BPlusTree::open_or_create(index_disk, timestamp, leaf_block)?;
        Ok(Table {
            relation,
            data,
            tree,
        })
    }

    pub fn close(self) {}

    /// Total pages allocated in the data file so far (`block_num`).
    pub fn data_page_count(&self) -> u32 {
        self.data.page_count()
    }

    /// Total pages allocated in the index file so far (`index_block_num`).
    pub fn index_page_count(&self) -> u32 {
        self.tree.page_count()
    }

    /// Diagnostic accessor: the `(separator, child)` slots of the leaf-parent
    /// index page for whichever subtree currently holds `key`.
    pub fn leaf_parent_entries(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, u32)>> {
        let (_, path) = self.tree.search(&self.relation, key)?;
        let parent_id = *path.last().expect("search() always pushes a leaf-parent");
        let buf = self.tree.peek_page(parent_id)?;
        Ok(crate::page::index_page::entries(&buf))
    }

    /// Diagnostic accessor: reads a raw data page by block id.
    pub fn read_data_page(&mut self, blockid: u32) -> Result<Vec<u8>> {
        self.data.read_page(blockid)
    }

    /// Inserts one row. `fields[relation.key]` is the clustered key.
    pub fn insert(&mut self, header: u8, fields: &[&[u8]]) -> Result<()> {
        let key = fields[self.relation.key].to_vec();
        let (leaf_id, path) = self.tree.search(&self.relation, &key)?;
        let mut buf = self.data.read_page(leaf_id)?;

        if data_page::insert(&mut buf, &self.relation, header, fields) {
            page::finish(&mut buf);
            self.data.write_page(leaf_id, &buf)?;
            return Ok(());
        }

        log::debug!("SPLIT_LEAF [block={}]", leaf_id);
        let rows = data_page::entries(&buf);
        let n = rows.len();
        let mid = n / 2;
        let old_nextid = page::nextid(&buf);
        let new_id = self.data.allocate_blockid()?;

        let first_half = rows[..mid].to_vec();
        let second_half = rows[mid..].to_vec();
        let separator = second_half[0].1[self.relation.key].clone();

        let mut old_buf = vec![0u8; page::PAGE_SIZE];
        data_page::rebuild_into(&mut old_buf, leaf_id, new_id, &self.relation, &first_half);
        let mut new_buf = vec![0u8; page::PAGE_SIZE];
        data_page::rebuild_into(&mut new_buf, new_id, old_nextid, &self.relation, &second_half);

        let target = if self.relation.key_lt(&key, &separator) {
            &mut old_buf
        } else {
            &mut new_buf
        };
        if !data_page::insert(target, &self.relation, header, fields) {
            let (record_len, _) = crate::record::size(fields);
            return Err(Error::Capacity {
                record_len,
                page_capacity: PageKind::Data.initial_free_space(),
            });
        }

        page::finish(&mut old_buf);
        self.data.write_page(leaf_id, &old_buf)?;
        page::finish(&mut new_buf);
        self.data.write_page(new_id, &new_buf)?;

        self.tree.insert(&self.relation, separator, new_id, path)
    }

    /// Removes the row whose key column equals `key`.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        let (leaf_id, path) = self.tree.search(&self.relation, key)?;
        let mut buf = self.data.read_page(leaf_id)?;
        let removed_idx = data_page::delete(&mut buf, &self.relation, key);
        let Some(removed_idx) = removed_idx else {
            return Err(Error::NotFound(format!(
                "row with key {:?} not present",
                key
            )));
        };

        let capacity = PageKind::Data.initial_free_space();
        if data_page::fill(&buf) >= capacity / 3 {
            if removed_idx == 0 && data_page::slot_count(&buf) > 0 {
                let new_min = data_page::min_key(&buf, &self.relation).to_vec();
                self.update_parent_separator(leaf_id, key, &new_min, &path)?;
            }
            page::finish(&mut buf);
            self.data.write_page(leaf_id, &buf)?;
            return Ok(());
        }

        let parent_id = *path.last().expect("search() always pushes a leaf-parent");
        let parent_buf = self.data_tree_parent(parent_id)?;
        let Some((sibling_id, side)) =
            crate::page::index_page::find_sibling(&parent_buf, leaf_id)
        else {
            page::finish(&mut buf);
            self.data.write_page(leaf_id, &buf)?;
            return Ok(());
        };

        let mut sibling_buf = self.data.read_page(sibling_id)?;
        if data_page::fill(&sibling_buf) > 2 * capacity / 3 {
            return self.borrow_from_sibling(leaf_id, &mut buf, sibling_id, &mut sibling_buf, side, &path);
        }

        let parent_entries = crate::page::index_page::entries(&parent_buf);
        self.merge_leaves(leaf_id, buf, sibling_id, sibling_buf, side, &parent_entries, path)
    }

    fn data_tree_parent(&mut self, parent_id: u32) -> Result<Vec<u8>> {
        self.tree.peek_page(parent_id)
    }

    fn borrow_from_sibling(
        &mut self,
        leaf_id: u32,
        buf: &mut [u8],
        sibling_id: u32,
        sibling_buf: &mut [u8],
        side: crate::page::index_page::SiblingSide,
        path: &[u32],
    ) -> Result<()> {
        use crate::page::index_page::SiblingSide;
        match side {
            SiblingSide::Right => {
                let old_min = data_page::min_key(sibling_buf, &self.relation).to_vec();
                let (header, fields) = data_page::entries(sibling_buf).remove(0);
                let refs: Vec<&[u8]> = fields.iter().map(|f| f.as_slice()).collect();
                data_page::delete(sibling_buf, &self.relation, &old_min);
                data_page::insert(buf, &self.relation, header, &refs);
                let new_sibling_min = data_page::min_key(sibling_buf, &self.relation).to_vec();
                self.update_parent_separator(sibling_id, &old_min, &new_sibling_min, path)?;
            }
            SiblingSide::Left => {
                let this_old_min = data_page::min_key(buf, &self.relation).to_vec();
                let mut rows = data_page::entries(sibling_buf);
                let (header, fields) = rows.pop().expect("over-fill sibling has at least one row");
                let borrowed_key = fields[self.relation.key].clone();
                let refs: Vec<&[u8]> = fields.iter().map(|f| f.as_slice()).collect();
                self.update_parent_separator(leaf_id, &this_old_min, &borrowed_key, path)?;
                data_page::delete(sibling_buf, &self.relation, &borrowed_key);
                data_page::insert(buf, &self.relation, header, &refs);
            }
        }
        page::finish(buf);
        self.data.write_page(leaf_id, buf)?;
        page::finish(sibling_buf);
        self.data.write_page(sibling_id, sibling_buf)?;
        log::debug!("BORROW_LEAF [leaf={}][sibling={}]", leaf_id, sibling_id);
        Ok(())
    }

    fn merge_leaves(
        &mut self,
        leaf_id: u32,
        buf: Vec<u8>,
        sibling_id: u32,
        sibling_buf: Vec<u8>,
        side: crate::page::index_page::SiblingSide,
        parent_entries: &[(Vec<u8>, u32)],
        path: Vec<u32>,
    ) -> Result<()> {
        use crate::page::index_page::SiblingSide;
        let (left_id, left_buf, right_id, right_buf) = match side {
            SiblingSide::Right => (leaf_id, buf, sibling_id, sibling_buf),
            SiblingSide::Left => (sibling_id, sibling_buf, leaf_id, buf),
        };

        // `right_buf` may already be empty (its only row was just deleted),
        // so its own minimum key can't be trusted; the parent's slot for
        // `right_id` still carries the correct separator.
        let separator = parent_entries
            .iter()
            .find(|(_, child)| *child == right_id)
            .map(|(key, _)| key.clone())
            .ok_or(crate::error::Error::Invariant(
                "merge: bridge key not found in parent",
            ))?;
        let mut merged = data_page::entries(&left_buf);
        merged.extend(data_page::entries(&right_buf));
        let right_nextid = page::nextid(&right_buf);

        let mut merged_buf = vec![0u8; page::PAGE_SIZE];
        data_page::rebuild_into(&mut merged_buf, left_id, right_nextid, &self.relation, &merged);
        page::finish(&mut merged_buf);
        self.data.write_page(left_id, &merged_buf)?;
        log::debug!("MERGE_LEAF [left={}][right={}]", left_id, right_id);

        // `right_id`'s slot in the parent (keyed by `separator`, its former
        // minimum) is now dangling and must be removed by the caller.
        self.tree.remove(&self.relation, &separator, path)
    }

    fn update_parent_separator(
        &mut self,
        child_id: u32,
        old_key: &[u8],
        new_key: &[u8],
        path: &[u32],
    ) -> Result<()> {
        let Some(&parent_id) = path.last() else {
            return Ok(());
        };
        let field_type = self.relation.key_field().field_type;
        let mut parent_buf = self.tree.peek_page(parent_id)?;
        if crate::page::index_page::leftmost(&parent_buf) == child_id {
            // Leftmost child has no explicit separator slot; nothing to fix.
            return Ok(());
        }
        if crate::page::index_page::delete_key(&mut parent_buf, field_type, old_key).is_none() {
            return Err(Error::Invariant("update_key: old separator not found"));
        }
        crate::page::index_page::insert(&mut parent_buf, field_type, new_key, child_id);
        page::finish(&mut parent_buf);
        self.tree.write_page(parent_id, &parent_buf)
    }
}

impl Table<RandomAccessFile> {
    pub fn create(relation: &RelationInfo, timestamp: u64) -> Result<()> {
        let data_disk = RandomAccessFile::open(&relation.data_path)?;
        let index_disk = RandomAccessFile::open(&relation.index_path)?;
        Table::open_with(relation.clone(), data_disk, index_disk, timestamp)?;
        Ok(())
    }

    pub fn open(relation: RelationInfo, timestamp: u64) -> Result<Self> {
        let data_disk = RandomAccessFile::open(&relation.data_path)?;
        let index_disk = RandomAccessFile::open(&relation.index_path)?;
        Table::open_with(relation, data_disk, index_disk, timestamp)
    }

    pub fn destroy(data_path: &std::path::Path, index_path: &std::path::Path) -> Result<()> {
        RandomAccessFile::remove(data_path)?;
        RandomAccessFile::remove(index_path)?;
        Ok(())
    }
}

/// In-order iteration over every row in the table (`Table::block_begin` /
/// `block_end` in the external-interface vocabulary).
pub struct Scan<'a, D: Disk> {
    data: &'a mut PagedFile<D>,
    relation: &'a RelationInfo,
    current_block: u32,
    rows: std::vec::IntoIter<(u8, Vec<Vec<u8>>)>,
}

impl<D: Disk> Table<D> {
    pub fn scan(&mut self) -> Result<Scan<'_, D>> {
        let head = self.data.head();
        let buf = self.data.read_page(head)?;
        Ok(Scan {
            data: &mut self.data,
            relation: &self.relation,
            current_block: page::nextid(&buf),
            rows: data_page::entries(&buf).into_iter(),
        })
    }
}

impl<'a, D: Disk> Iterator for Scan<'a, D> {
    type Item = Result<(u8, Vec<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.rows.next() {
                return Some(Ok(row));
            }
            if self.current_block == page::NONE_ID {
                return None;
            }
            let buf = match self.data.read_page(self.current_block) {
                Ok(b) => b,
                Err(e) => return Some(Err(e)),
            };
            self.current_block = page::nextid(&buf);
            self.rows = data_page::entries(&buf).into_iter();
        }
    }
}
