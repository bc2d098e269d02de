//! Tree paths and level-order path enumeration.

use std::collections::VecDeque;
use std::iter::Enumerate;
use std::sync::Arc;
use std::vec::IntoIter;

use super::entry::Entry;
use super::index_tree::IndexTree;
use super::page_store::PageStore;
use super::tree_types::IndexResult;

/// Immutable position of an entry in the tree: the entry, its index among its
/// siblings, and the path of its parent. Used for traversal bookkeeping only.
#[derive(Debug)]
pub struct IndexTreePath {
    parent: Option<Arc<IndexTreePath>>,
    entry: Entry,
    index: Option<usize>,
}

impl IndexTreePath {
    pub fn root(entry: Entry) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            entry,
            index: None,
        })
    }

    pub fn child(self: &Arc<Self>, entry: Entry, index: usize) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(self)),
            entry,
            index: Some(index),
        })
    }

    pub fn parent(&self) -> Option<&Arc<IndexTreePath>> {
        self.parent.as_ref()
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Index within the parent node; `None` for the root path.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Number of edges between this path's entry and the root entry.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_ref();
        while let Some(path) = current {
            depth += 1;
            current = path.parent.as_ref();
        }
        depth
    }
}

/// Level-order producer of tree paths.
///
/// Yields the root path first, then every entry level by level. Leaf entries
/// contribute no children. The sequence is lazy, finite and not restartable;
/// after an error it ends.
pub struct BreadthFirstEnumeration<'a, S: PageStore> {
    tree: &'a IndexTree<S>,
    pending_root: Option<Arc<IndexTreePath>>,
    queue: VecDeque<(Arc<IndexTreePath>, Enumerate<IntoIter<Entry>>)>,
}

impl<'a, S: PageStore> BreadthFirstEnumeration<'a, S> {
    pub fn new(tree: &'a IndexTree<S>, root: Arc<IndexTreePath>) -> Self {
        Self {
            tree,
            pending_root: Some(root),
            queue: VecDeque::new(),
        }
    }

    fn enqueue(&mut self, path: &Arc<IndexTreePath>) -> IndexResult<()> {
        if let Some(page_id) = path.entry().child_page_id() {
            let node = self.tree.get_node(page_id)?;
            let children = node.entries().to_vec().into_iter().enumerate();
            self.queue.push_back((Arc::clone(path), children));
        }
        Ok(())
    }
}

impl<'a, S: PageStore> Iterator for BreadthFirstEnumeration<'a, S> {
    type Item = IndexResult<Arc<IndexTreePath>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.pending_root.take() {
            if let Err(e) = self.enqueue(&root) {
                return Some(Err(e));
            }
            return Some(Ok(root));
        }

        loop {
            let (parent, children) = self.queue.front_mut()?;
            match children.next() {
                Some((index, entry)) => {
                    let path = parent.child(entry, index);
                    if let Err(e) = self.enqueue(&path) {
                        self.queue.clear();
                        return Some(Err(e));
                    }
                    return Some(Ok(path));
                }
                None => {
                    self.queue.pop_front();
                }
            }
        }
    }
}
