use super::constants::{DEFAULT_NODE_SIZE, MIN_NODE_SIZE};
use super::deserializer::RTreeReader;
use super::entry::SpatialIndexEntry;
use super::node::{NodeIndex, NodeKind, RTreeNode};
use super::serializer::RTreeSerializer;
use super::split::quadratic_split;
use crate::errors::{StorageError, StorageResult};
use crate::hyperrectangle::Hyperrectangle;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// R-tree of [`SpatialIndexEntry`] values.
///
/// A node holds at most `max_node_size` children. An overflowing node is
/// split quadratically and replaced, in its parent slot, by a directory
/// node holding the two halves.
///
/// # Examples
///
/// ```rust
/// use bboxdb_storage::{Hyperrectangle, RTree, SpatialIndexEntry};
///
/// let mut tree = RTree::new();
/// let bbox = Hyperrectangle::from_intervals(&[(0.0, 1.0), (0.0, 1.0)]).unwrap();
/// assert!(tree.insert(SpatialIndexEntry::new(bbox.clone(), 42)));
///
/// let found = tree.query(&bbox);
/// assert_eq!(found[0].offset(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct RTree {
    nodes: Vec<RTreeNode>,
    root: NodeIndex,
    max_node_size: usize,
    next_node_id: u32,
    len: usize,
}

impl Default for RTree {
    fn default() -> Self {
        RTree::new()
    }
}

impl RTree {
    /// Creates an empty tree with [`DEFAULT_NODE_SIZE`].
    pub fn new() -> Self {
        RTree::empty(DEFAULT_NODE_SIZE)
    }

    /// Creates an empty tree; node sizes below two are rejected.
    pub fn with_max_node_size(max_node_size: usize) -> StorageResult<Self> {
        if max_node_size < MIN_NODE_SIZE {
            return Err(StorageError::InvalidArgument(format!(
                "max node size must be at least {}, got {}",
                MIN_NODE_SIZE, max_node_size
            )));
        }
        Ok(RTree::empty(max_node_size))
    }

    fn empty(max_node_size: usize) -> Self {
        RTree {
            nodes: vec![RTreeNode::leaf(0, None)],
            root: 0,
            max_node_size,
            next_node_id: 1,
            len: 0,
        }
    }

    /// Rebuilds a tree from nodes read from disk.
    pub(crate) fn from_parts(nodes: Vec<RTreeNode>, max_node_size: usize) -> Self {
        let next_node_id = nodes.iter().map(|n| n.node_id).max().map_or(0, |id| id + 1);
        let len = nodes.iter().map(|n| n.entries().len()).sum();
        RTree {
            nodes,
            root: 0,
            max_node_size,
            next_node_id,
            len,
        }
    }

    pub fn max_node_size(&self) -> usize {
        self.max_node_size
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Covering box of all entries, the full space for an empty tree.
    pub fn bounding_box(&self) -> &Hyperrectangle {
        &self.nodes[self.root].bounding_box
    }

    /// Dimension shared by every entry, `None` while the tree is empty.
    pub fn dimension(&self) -> Option<usize> {
        let bbox = self.bounding_box();
        (!bbox.is_full_space()).then(|| bbox.dimension())
    }

    /// Length of the longest root to leaf path, counted in nodes.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut stack = vec![(self.root, 1usize)];
        while let Some((index, depth)) = stack.pop() {
            height = height.max(depth);
            stack.extend(self.nodes[index].children().iter().map(|child| (*child, depth + 1)));
        }
        height
    }

    pub(crate) fn root(&self) -> NodeIndex {
        self.root
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &RTreeNode {
        &self.nodes[index]
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Inserts one entry. Entries covering the full space and entries of
    /// another dimension than the stored ones are refused.
    pub fn insert(&mut self, entry: SpatialIndexEntry) -> bool {
        if entry.bounding_box().is_full_space() {
            return false;
        }

        if self
            .dimension()
            .is_some_and(|dimension| dimension != entry.bounding_box().dimension())
        {
            return false;
        }

        let leaf = self.choose_leaf(entry.bounding_box());
        let node = &mut self.nodes[leaf];
        if let NodeKind::Leaf(entries) = &mut node.kind {
            entries.push(entry);
        } else {
            // A directory without children.
            node.kind = NodeKind::Leaf(vec![entry]);
        }
        self.len += 1;

        self.update_path(leaf);
        self.adjust_tree(leaf);
        true
    }

    /// Inserts all entries; returns false if any entry was refused.
    pub fn bulk_insert<I>(&mut self, entries: I) -> bool
    where
        I: IntoIterator<Item = SpatialIndexEntry>,
    {
        entries
            .into_iter()
            .fold(true, |accepted, entry| self.insert(entry) && accepted)
    }

    /// Descends along the child needing the least enlargement, ties go to
    /// the child with fewer children.
    fn choose_leaf(&self, bbox: &Hyperrectangle) -> NodeIndex {
        let mut current = self.root;
        loop {
            let children = match &self.nodes[current].kind {
                NodeKind::Leaf(_) => return current,
                NodeKind::Directory(children) => children,
            };

            let best = children.iter().copied().min_by(|a, b| {
                let a_node = &self.nodes[*a];
                let b_node = &self.nodes[*b];
                a_node
                    .bounding_box
                    .enlargement(bbox)
                    .total_cmp(&b_node.bounding_box.enlargement(bbox))
                    .then(a_node.size().cmp(&b_node.size()))
            });

            match best {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Recomputes the bounding boxes from `index` up to the root.
    fn update_path(&mut self, index: NodeIndex) {
        let mut current = Some(index);
        while let Some(index) = current {
            self.nodes[index].bounding_box = self.covering_of_children(index);
            current = self.nodes[index].parent;
        }
    }

    fn covering_of_children(&self, index: NodeIndex) -> Hyperrectangle {
        match &self.nodes[index].kind {
            NodeKind::Leaf(entries) => Hyperrectangle::union_all(entries.iter().map(|e| e.bounding_box())),
            NodeKind::Directory(children) => {
                Hyperrectangle::union_all(children.iter().map(|c| &self.nodes[*c].bounding_box))
            }
        }
    }

    /// Splits the leaf at `index` when it overflows.
    ///
    /// Only leaves can overflow: a split keeps the slot of the old node, so
    /// a directory never gains a child after its creation.
    fn adjust_tree(&mut self, index: NodeIndex) {
        if self.nodes[index].size() > self.max_node_size {
            self.split_leaf(index);
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    /// Splits the leaf at `index` into two new leaves. The slot at `index`
    /// becomes a fresh directory node holding both, so the parent link of
    /// the slot stays valid.
    fn split_leaf(&mut self, index: NodeIndex) {
        let first = self.nodes.len();
        let second = first + 1;

        let entries = match &mut self.nodes[index].kind {
            NodeKind::Leaf(entries) => std::mem::take(entries),
            NodeKind::Directory(_) => return,
        };
        self.nodes[index].kind = NodeKind::Directory(vec![first, second]);

        let boxes: Vec<_> = entries.iter().map(|e| e.bounding_box().clone()).collect();
        let (first_part, second_part) = quadratic_split(&boxes, self.max_node_size);
        let mut slots: Vec<Option<SpatialIndexEntry>> = entries.into_iter().map(Some).collect();
        let mut take = |part: Vec<usize>| -> Vec<SpatialIndexEntry> {
            part.into_iter().filter_map(|i| slots[i].take()).collect()
        };
        let halves = [(first, take(first_part)), (second, take(second_part))];

        for (slot, entries) in halves {
            let node_id = self.next_id();
            self.nodes.push(RTreeNode {
                node_id,
                bounding_box: Hyperrectangle::FULL_SPACE,
                parent: Some(index),
                kind: NodeKind::Leaf(entries),
            });
            self.nodes[slot].bounding_box = self.covering_of_children(slot);
        }

        self.nodes[index].node_id = self.next_id();
        self.nodes[index].bounding_box = self.covering_of_children(index);
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// All entries whose box intersects `region`.
    pub fn query(&self, region: &Hyperrectangle) -> Vec<SpatialIndexEntry> {
        let mut results = Vec::new();
        self.query_into(region, &mut results);
        results
    }

    /// Appends all entries intersecting `region` to `results`.
    pub fn query_into(&self, region: &Hyperrectangle, results: &mut Vec<SpatialIndexEntry>) {
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounding_box.intersects(region) {
                continue;
            }

            match &node.kind {
                NodeKind::Leaf(entries) => results.extend(
                    entries
                        .iter()
                        .filter(|entry| entry.bounding_box().intersects(region))
                        .cloned(),
                ),
                NodeKind::Directory(children) => stack.extend(
                    children
                        .iter()
                        .copied()
                        .filter(|child| self.nodes[*child].bounding_box.intersects(region)),
                ),
            }
        }
    }

    /// Every entry of the tree, in no particular order.
    pub fn entries(&self) -> Vec<SpatialIndexEntry> {
        self.nodes.iter().flat_map(|node| node.entries().iter().cloned()).collect()
    }

    /// Checks the structural invariants of every reachable node: boxes equal
    /// the covering box of their children (which share one dimension), sizes
    /// stay within bounds and parent links point back.
    pub fn is_consistent(&self) -> bool {
        let mut visited = 0;
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            visited += 1;
            let node = &self.nodes[index];
            let covering = match &node.kind {
                NodeKind::Leaf(entries) => Hyperrectangle::covering(entries.iter().map(|e| e.bounding_box())),
                NodeKind::Directory(children) => {
                    Hyperrectangle::covering(children.iter().map(|c| &self.nodes[*c].bounding_box))
                }
            };
            if node.size() > self.max_node_size || covering.ok().as_ref() != Some(&node.bounding_box) {
                return false;
            }

            for child in node.children() {
                if self.nodes[*child].parent != Some(index) {
                    return false;
                }
                stack.push(*child);
            }
        }

        visited == self.nodes.len() && self.nodes[self.root].parent.is_none()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Writes the tree to `path` in the spatial index format.
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        let file = File::create(path).map_err(|e| StorageError::file_io(path, 0, e))?;
        let mut writer = BufWriter::new(file);
        RTreeSerializer::new(self).serialize(&mut writer)?;
        writer.flush().map_err(|e| StorageError::file_io(path, 0, e))?;
        Ok(())
    }

    /// Reads a tree written by [`RTree::save`].
    pub fn load(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).map_err(|e| StorageError::file_io(path, 0, e))?;
        RTreeReader::new(BufReader::new(file))
            .read()
            .map_err(|e| match e {
                StorageError::Format(message) => StorageError::format(path, message),
                StorageError::Io(source) => StorageError::file_io(path, 0, source),
                other => other,
            })
    }
}
