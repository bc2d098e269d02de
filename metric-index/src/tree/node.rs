//! Fixed-capacity node containers and the split primitives built on them.

use serde::{Deserialize, Serialize};

use super::entry::{DirectoryEntry, Entry, LeafEntry};
use super::tree_types::{IndexError, IndexResult, PageId};

/// An ordered, bounded sequence of entries stored on one page.
///
/// `capacity` includes one transient overflow slot: a node holding
/// `capacity` entries must be split before it is written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    page_id: Option<PageId>,
    is_leaf: bool,
    capacity: usize,
    entries: Vec<Entry>,
}

impl Node {
    pub fn new_leaf(capacity: usize) -> Self {
        Self::new(true, capacity)
    }

    pub fn new_directory(capacity: usize) -> Self {
        Self::new(false, capacity)
    }

    fn new(is_leaf: bool, capacity: usize) -> Self {
        Self {
            page_id: None,
            is_leaf,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// A fresh, empty node of the same kind and capacity (no page id yet).
    pub fn empty_sibling(&self) -> Self {
        Self::new(self.is_leaf, self.capacity)
    }

    pub fn page_id(&self) -> Option<PageId> {
        self.page_id
    }

    pub fn set_page_id(&mut self, page_id: Option<PageId>) {
        self.page_id = page_id;
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once the overflow slot is in use.
    pub fn has_overflow(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    pub fn add_leaf_entry(&mut self, entry: LeafEntry) -> IndexResult<usize> {
        if !self.is_leaf {
            return Err(IndexError::TypeMismatch(format!(
                "cannot add leaf entry for object {} to directory node {:?}",
                entry.object_id, self.page_id
            )));
        }
        self.push(Entry::Leaf(entry))
    }

    pub fn add_directory_entry(&mut self, entry: DirectoryEntry) -> IndexResult<usize> {
        if self.is_leaf {
            return Err(IndexError::TypeMismatch(format!(
                "cannot add directory entry for page {} to leaf node {:?}",
                entry.child_page_id, self.page_id
            )));
        }
        self.push(Entry::Directory(entry))
    }

    /// Adds an entry of either kind, checking it against the node type.
    pub fn add_entry(&mut self, entry: Entry) -> IndexResult<usize> {
        match entry {
            Entry::Leaf(e) => self.add_leaf_entry(e),
            Entry::Directory(e) => self.add_directory_entry(e),
        }
    }

    fn push(&mut self, entry: Entry) -> IndexResult<usize> {
        if self.entries.len() >= self.capacity {
            return Err(IndexError::NodeOverflow {
                capacity: self.capacity,
            });
        }
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// Removes the entry at `index`, shifting the following entries down.
    pub fn delete_entry(&mut self, index: usize) -> IndexResult<Entry> {
        if index >= self.entries.len() {
            return Err(IndexError::InvalidArgument(format!(
                "entry index {} out of bounds ({} entries)",
                index,
                self.entries.len()
            )));
        }
        Ok(self.entries.remove(index))
    }

    /// Keeps `order[..cut]` in this node and moves `order[cut..]` to `sibling`.
    ///
    /// `order` is a permutation of this node's entry indices, already sorted by
    /// the caller's criterion; both halves keep that order.
    pub fn split_by_sorted(
        &mut self,
        sibling: &mut Node,
        order: &[usize],
        cut: usize,
    ) -> IndexResult<()> {
        if cut > order.len() {
            return Err(IndexError::InvalidArgument(format!(
                "split point {} beyond {} entries",
                cut,
                order.len()
            )));
        }
        self.split_to(sibling, &order[..cut], &order[cut..])
    }

    /// Distributes entries according to two explicit assignment lists: `first`
    /// stays here, `second` moves to `sibling`.
    pub fn split_to(
        &mut self,
        sibling: &mut Node,
        first: &[usize],
        second: &[usize],
    ) -> IndexResult<()> {
        self.check_sibling(sibling)?;
        self.check_assignment(first.iter().chain(second.iter()).copied())?;

        let mut slots: Vec<Option<Entry>> = self.entries.drain(..).map(Some).collect();
        for &index in first {
            if let Some(entry) = slots[index].take() {
                self.entries.push(entry);
            }
        }
        for &index in second {
            if let Some(entry) = slots[index].take() {
                sibling.entries.push(entry);
            }
        }
        Ok(())
    }

    /// Moves every entry whose mask bit is set to a new sibling node.
    pub fn split_by_mask(&mut self, mask: &[bool]) -> IndexResult<Node> {
        if mask.len() != self.entries.len() {
            return Err(IndexError::InvalidArgument(format!(
                "split mask has {} bits for {} entries",
                mask.len(),
                self.entries.len()
            )));
        }
        let mut sibling = self.empty_sibling();
        let entries = std::mem::take(&mut self.entries);
        for (entry, &moves) in entries.into_iter().zip(mask) {
            if moves {
                sibling.entries.push(entry);
            } else {
                self.entries.push(entry);
            }
        }
        Ok(sibling)
    }

    fn check_sibling(&self, sibling: &Node) -> IndexResult<()> {
        if sibling.is_leaf != self.is_leaf {
            return Err(IndexError::TypeMismatch(
                "split sibling must be of the same node kind".into(),
            ));
        }
        if !sibling.entries.is_empty() {
            return Err(IndexError::InvalidArgument(
                "split sibling must be empty".into(),
            ));
        }
        Ok(())
    }

    fn check_assignment(&self, indices: impl Iterator<Item = usize>) -> IndexResult<()> {
        let mut seen = vec![false; self.entries.len()];
        let mut count = 0;
        for index in indices {
            if index >= seen.len() || seen[index] {
                return Err(IndexError::InvalidArgument(format!(
                    "split assignment index {} is out of range or repeated",
                    index
                )));
            }
            seen[index] = true;
            count += 1;
        }
        if count != seen.len() {
            return Err(IndexError::InvalidArgument(format!(
                "split assignment covers {} of {} entries",
                count,
                seen.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(ids: &[u64]) -> Node {
        let mut node = Node::new_leaf(8);
        for &id in ids {
            node.add_leaf_entry(LeafEntry::new(id, 0.0)).unwrap();
        }
        node
    }

    fn ids(node: &Node) -> Vec<u64> {
        node.entries()
            .iter()
            .map(|e| e.object_id().unwrap())
            .collect()
    }

    #[test]
    fn test_type_checked_insertion() {
        let mut leaf = Node::new_leaf(4);
        let result = leaf.add_directory_entry(DirectoryEntry::new(1, 2, 0.0, 0.0));
        assert!(matches!(result, Err(IndexError::TypeMismatch(_))));

        let mut dir = Node::new_directory(4);
        let result = dir.add_leaf_entry(LeafEntry::new(1, 0.0));
        assert!(matches!(result, Err(IndexError::TypeMismatch(_))));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_overflow_slot() {
        let mut node = Node::new_leaf(3);
        node.add_leaf_entry(LeafEntry::new(1, 0.0)).unwrap();
        node.add_leaf_entry(LeafEntry::new(2, 0.0)).unwrap();
        assert!(!node.has_overflow());
        node.add_leaf_entry(LeafEntry::new(3, 0.0)).unwrap();
        assert!(node.has_overflow());

        let result = node.add_leaf_entry(LeafEntry::new(4, 0.0));
        assert!(matches!(result, Err(IndexError::NodeOverflow { capacity: 3 })));
    }

    #[test]
    fn test_delete_entry_compacts() {
        let mut node = leaf_with(&[1, 2, 3, 4]);
        let removed = node.delete_entry(1).unwrap();
        assert_eq!(removed.object_id().unwrap(), 2);
        assert_eq!(ids(&node), vec![1, 3, 4]);
        assert!(node.delete_entry(3).is_err());
    }

    #[test]
    fn test_split_by_sorted() {
        let mut node = leaf_with(&[10, 20, 30, 40, 50]);
        let mut sibling = node.empty_sibling();
        node.split_by_sorted(&mut sibling, &[4, 0, 2, 1, 3], 2).unwrap();
        assert_eq!(ids(&node), vec![50, 10]);
        assert_eq!(ids(&sibling), vec![30, 20, 40]);
    }

    #[test]
    fn test_split_to_assignment_lists() {
        let mut node = leaf_with(&[1, 2, 3, 4]);
        let mut sibling = node.empty_sibling();
        node.split_to(&mut sibling, &[0, 3], &[1, 2]).unwrap();
        assert_eq!(ids(&node), vec![1, 4]);
        assert_eq!(ids(&sibling), vec![2, 3]);
    }

    #[test]
    fn test_split_to_rejects_incomplete_assignment() {
        let mut node = leaf_with(&[1, 2, 3]);
        let mut sibling = node.empty_sibling();
        assert!(node.split_to(&mut sibling, &[0], &[1]).is_err());
        assert!(node.split_to(&mut sibling, &[0, 1], &[1, 2]).is_err());
        assert_eq!(ids(&node), vec![1, 2, 3]);
    }

    #[test]
    fn test_split_to_rejects_wrong_sibling_kind() {
        let mut node = leaf_with(&[1, 2]);
        let mut sibling = Node::new_directory(8);
        let result = node.split_to(&mut sibling, &[0], &[1]);
        assert!(matches!(result, Err(IndexError::TypeMismatch(_))));
    }

    #[test]
    fn test_split_by_mask_preserves_order() {
        let mut node = leaf_with(&[1, 2, 3, 4, 5]);
        let sibling = node
            .split_by_mask(&[false, true, false, true, true])
            .unwrap();
        assert_eq!(ids(&node), vec![1, 3]);
        assert_eq!(ids(&sibling), vec![2, 4, 5]);
        assert!(sibling.page_id().is_none());
        assert!(sibling.is_leaf());
    }

    #[test]
    fn test_split_by_mask_length_mismatch() {
        let mut node = leaf_with(&[1, 2]);
        assert!(node.split_by_mask(&[true]).is_err());
    }
}
