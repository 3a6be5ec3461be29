//! B+ tree over the index file. Leaves of this tree are *data* page ids
//! (`NODE_TYPE_POINT_TO_LEAF`); the data pages themselves live in the data
//! file and hold the actual rows (clustered index).

use crate::datafile::PagedFile;
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::page::{self, index_page, PageKind, NODE_TYPE_INTERNAL};
use crate::relation::{FieldType, RelationInfo};
use crate::root_block::RootKind;

pub struct BPlusTree<D: Disk> {
    file: PagedFile<D>,
}

impl<D: Disk> BPlusTree<D> {
    pub fn open_or_create(disk: D, timestamp: u64, leaf_block: u32) -> Result<Self> {
        let mut file = PagedFile::open_or_create(disk, RootKind::Index, PageKind::Index, timestamp)?;
        let root_id = file.head();
        let mut root_buf = file.read_page(root_id)?;
        // A page whose leftmost pointer is still NONE_ID was just created by
        // `PagedFile::open_or_create` and has no child yet.
        if index_page::leftmost(&root_buf) == page::NONE_ID {
            index_page::set_leftmost(&mut root_buf, leaf_block);
            page::finish(&mut root_buf);
            file.write_page(root_id, &root_buf)?;
        }
        Ok(BPlusTree { file })
    }

    pub fn allocate_blockid(&mut self) -> Result<u32> {
        self.file.allocate_blockid()
    }

    /// Total pages allocated in the index file so far (`index_block_num`).
    pub fn page_count(&self) -> u32 {
        self.file.page_count()
    }

    /// Reads a raw index page by id, for callers (e.g. `Table`) that need
    /// to inspect or patch a leaf-parent directly (separator maintenance).
    pub fn peek_page(&mut self, blockid: u32) -> Result<Vec<u8>> {
        self.file.read_page(blockid)
    }

    pub fn write_page(&mut self, blockid: u32, buf: &[u8]) -> Result<()> {
        self.file.write_page(blockid, buf)
    }

    /// Descends from the root to the data page id that holds (or would
    /// hold) `key`, recording every index page visited in `path` (top of
    /// the returned stack = leaf-parent).
    pub fn search(&mut self, relation: &RelationInfo, key: &[u8]) -> Result<(u32, Vec<u32>)> {
        let field_type = relation.key_field().field_type;
        let mut path = Vec::new();
        let mut id = self.file.head();
        loop {
            let buf = self.file.read_page(id)?;
            path.push(id);
            if index_page::is_leaf_parent(&buf) {
                return Ok((index_page::search_child(&buf, field_type, key), path));
            }
            id = index_page::search_child(&buf, field_type, key);
        }
    }

    /// Bubbles a new `(separator, right_id)` entry up into the tree,
    /// splitting index pages (and growing the root) as needed.
    pub fn insert(
        &mut self,
        relation: &RelationInfo,
        mut separator: Vec<u8>,
        mut right_id: u32,
        mut path: Vec<u32>,
    ) -> Result<()> {
        let field_type = relation.key_field().field_type;
        loop {
            let insert_id = path.pop().expect("search() always pushes the root");
            let mut buf = self.file.read_page(insert_id)?;
            let node_type = index_page::node_type(&buf);

            if index_page::insert(&mut buf, field_type, &separator, right_id) {
                page::finish(&mut buf);
                self.file.write_page(insert_id, &buf)?;
                log::debug!("INDEX_INSERT_COMMIT [block={}]", insert_id);
                return Ok(());
            }

            log::debug!("INDEX_SPLIT [block={}]", insert_id);
            let entries = index_page::entries(&buf);
            let n = entries.len();
            let leftmost = index_page::leftmost(&buf);
            let half_field = entries[n / 2 - 1].0.clone();
            let half_plus_field = entries[n / 2].0.clone();

            let (block1_entries, block1_left, block2_entries, block2_left, promoted);
            if field_type.lt(&half_field, &separator) && field_type.lt(&separator, &half_plus_field) {
                block1_entries = entries[..n / 2].to_vec();
                block2_entries = entries[n / 2..].to_vec();
                block1_left = leftmost;
                block2_left = right_id;
                promoted = separator.clone();
            } else {
                let pos = if field_type.lt(&separator, &half_field) {
                    n / 2 - 1
                } else {
                    n / 2
                };
                let mut b1: Vec<(Vec<u8>, u32)> = entries[..pos].to_vec();
                let mut b2: Vec<(Vec<u8>, u32)> = entries[pos + 1..].to_vec();
                block1_left = leftmost;
                block2_left = entries[pos].1;
                promoted = entries[pos].0.clone();
                if field_type.lt(&separator, &promoted) {
                    b1.push((separator.clone(), right_id));
                } else {
                    b2.push((separator.clone(), right_id));
                }
                block1_entries = b1;
                block2_entries = b2;
            }

            let block2_id = self.file.allocate_blockid()?;
            let mut block1_buf = vec![0u8; page::PAGE_SIZE];
            index_page::rebuild_into(
                &mut block1_buf,
                insert_id,
                block1_left,
                node_type,
                field_type,
                &block1_entries,
            );
            page::finish(&mut block1_buf);
            self.file.write_page(insert_id, &block1_buf)?;

            let mut block2_buf = vec![0u8; page::PAGE_SIZE];
            index_page::rebuild_into(
                &mut block2_buf,
                block2_id,
                block2_left,
                node_type,
                field_type,
                &block2_entries,
            );
            page::finish(&mut block2_buf);
            self.file.write_page(block2_id, &block2_buf)?;

            if path.is_empty() {
                let new_root_id = self.file.allocate_blockid()?;
                let mut root_buf = index_page::new(new_root_id, NODE_TYPE_INTERNAL);
                index_page::set_leftmost(&mut root_buf, insert_id);
                index_page::insert(&mut root_buf, field_type, &promoted, block2_id);
                page::finish(&mut root_buf);
                self.file.write_page(new_root_id, &root_buf)?;
                self.file.set_head(new_root_id)?;
                log::debug!("ROOT_GROWN [root={}]", new_root_id);
                return Ok(());
            }

            separator = promoted;
            right_id = block2_id;
        }
    }

    /// Removes the `(field, *)` entry identified by `field`, renaming the
    /// parent's separator via `update_key` when the removed slot was index
    /// 0, and merging index pages up the `path` if the deletion leaves a
    /// page under the fill floor. Mirrors `Table::remove`'s leaf-level
    /// algorithm one level up, except sibling-borrow is not attempted here
    /// (see DESIGN.md).
    pub fn remove(&mut self, relation: &RelationInfo, field: &[u8], mut path: Vec<u32>) -> Result<()> {
        let field_type = relation.key_field().field_type;
        let Some(delete_id) = path.pop() else {
            return Ok(());
        };
        let mut buf = self.file.read_page(delete_id)?;
        let Some(deleted_idx) = index_page::delete_key(&mut buf, field_type, field) else {
            return Err(Error::Invariant("index delete: key not present"));
        };

        if path.is_empty() {
            page::finish(&mut buf);
            self.file.write_page(delete_id, &buf)?;
            if index_page::slot_count(&buf) == 0 {
                let only_child = index_page::leftmost(&buf);
                self.file.set_head(only_child)?;
                log::debug!("ROOT_COLLAPSED [new_root={}]", only_child);
            }
            return Ok(());
        }

        let parent_id = *path.last().unwrap();
        let capacity = PageKind::Index.initial_free_space();
        if index_page::fill(&buf) >= capacity / 4 {
            if deleted_idx == 0 && index_page::slot_count(&buf) > 0 {
                let new_min = index_page::slot_key(&buf, 0).to_vec();
                self.update_key(parent_id, field, &new_min, delete_id, field_type)?;
            }
            page::finish(&mut buf);
            self.file.write_page(delete_id, &buf)?;
            return Ok(());
        }

        let parent_buf = self.file.read_page(parent_id)?;
        let parent_entries = index_page::entries(&parent_buf);
        let Some((sibling_id, side)) = index_page::find_sibling(&parent_buf, delete_id) else {
            if deleted_idx == 0 && index_page::slot_count(&buf) > 0 {
                let new_min = index_page::slot_key(&buf, 0).to_vec();
                self.update_key(parent_id, field, &new_min, delete_id, field_type)?;
            }
            page::finish(&mut buf);
            self.file.write_page(delete_id, &buf)?;
            return Ok(());
        };

        let sibling_buf = self.file.read_page(sibling_id)?;
        if index_page::fill(&sibling_buf) > 2 * capacity / 3 {
            log::warn!(
                "INDEX_BORROW_UNSUPPORTED [delete_id={}][sibling_id={}]",
                delete_id,
                sibling_id
            );
            page::finish(&mut buf);
            self.file.write_page(delete_id, &buf)?;
            return Err(Error::Invariant(
                "index-level borrow-from-sibling is unimplemented; merge-only fallback exhausted",
            ));
        }

        let (left_id, left_buf, right_id, right_buf) = match side {
            index_page::SiblingSide::Right => (delete_id, buf, sibling_id, sibling_buf),
            index_page::SiblingSide::Left => (sibling_id, sibling_buf, delete_id, buf),
        };
        let bridge_key = parent_entries
            .iter()
            .find(|(_, c)| *c == right_id)
            .map(|(k, _)| k.clone())
            .ok_or(Error::Invariant("merge: bridge key not found in parent"))?;

        let node_type = index_page::node_type(&left_buf);
        let merged_leftmost = index_page::leftmost(&left_buf);
        let mut merged_entries = index_page::entries(&left_buf);
        merged_entries.push((bridge_key.clone(), index_page::leftmost(&right_buf)));
        merged_entries.extend(index_page::entries(&right_buf));

        let mut merged_buf = vec![0u8; page::PAGE_SIZE];
        index_page::rebuild_into(
            &mut merged_buf,
            left_id,
            merged_leftmost,
            node_type,
            field_type,
            &merged_entries,
        );
        page::finish(&mut merged_buf);
        self.file.write_page(left_id, &merged_buf)?;
        log::debug!("INDEX_MERGE [left={}][right={}]", left_id, right_id);

        self.remove(relation, &bridge_key, path)
    }

    /// Renames `child_id`'s separator slot in `parent_id` from `old_key` to
    /// `new_key`. A no-op if `child_id` is the parent's leftmost child,
    /// which has no explicit separator slot to rename.
    fn update_key(
        &mut self,
        parent_id: u32,
        old_key: &[u8],
        new_key: &[u8],
        child_id: u32,
        field_type: FieldType,
    ) -> Result<()> {
        let mut parent_buf = self.file.read_page(parent_id)?;
        if index_page::leftmost(&parent_buf) == child_id {
            return Ok(());
        }
        if index_page::delete_key(&mut parent_buf, field_type, old_key).is_none() {
            return Err(Error::Invariant("update_key: old separator not found"));
        }
        index_page::insert(&mut parent_buf, field_type, new_key, child_id);
        page::finish(&mut parent_buf);
        self.file.write_page(parent_id, &parent_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::FieldInfo;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn relation() -> RelationInfo {
        RelationInfo::new(
            "t",
            vec![FieldInfo::new("id", 0, 8, FieldType::BigInt)],
            0,
            PathBuf::from("t.dat"),
            PathBuf::from("t.idx"),
        )
    }

    #[test]
    fn search_on_fresh_tree_returns_leaf_block() {
        let relation = relation();
        let disk = Cursor::new(Vec::new());
        let mut tree = BPlusTree::open_or_create(disk, 0, 1).unwrap();
        let (leaf, path) = tree.search(&relation, &5i64.to_be_bytes()).unwrap();
        assert_eq!(leaf, 1);
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn update_key_renames_non_leftmost_separator() {
        let relation = relation();
        let disk = Cursor::new(Vec::new());
        let mut tree = BPlusTree::open_or_create(disk, 0, 1).unwrap();

        // leftmost=1, then (10,2), (20,3).
        tree.insert(&relation, 10i64.to_be_bytes().to_vec(), 2, vec![1])
            .unwrap();
        tree.insert(&relation, 20i64.to_be_bytes().to_vec(), 3, vec![1])
            .unwrap();

        let root_id = tree.file.head();
        tree.update_key(
            root_id,
            &10i64.to_be_bytes(),
            &15i64.to_be_bytes(),
            2,
            FieldType::BigInt,
        )
        .unwrap();

        let root_buf = tree.file.read_page(root_id).unwrap();
        let entries = index_page::entries(&root_buf);
        assert_eq!(
            entries,
            vec![(15i64.to_be_bytes().to_vec(), 2), (20i64.to_be_bytes().to_vec(), 3)]
        );
    }

    #[test]
    fn update_key_is_noop_for_leftmost_child() {
        let relation = relation();
        let disk = Cursor::new(Vec::new());
        let mut tree = BPlusTree::open_or_create(disk, 0, 1).unwrap();
        tree.insert(&relation, 10i64.to_be_bytes().to_vec(), 2, vec![1])
            .unwrap();

        let root_id = tree.file.head();
        // Block 1 is the leftmost child, which has no separator slot to
        // rename; `update_key` must leave the page untouched.
        tree.update_key(
            root_id,
            &0i64.to_be_bytes(),
            &5i64.to_be_bytes(),
            1,
            FieldType::BigInt,
        )
        .unwrap();

        let root_buf = tree.file.read_page(root_id).unwrap();
        assert_eq!(index_page::leftmost(&root_buf), 1);
        assert_eq!(index_page::entries(&root_buf), vec![(10i64.to_be_bytes().to_vec(), 2)]);
    }
}
