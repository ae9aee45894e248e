use super::entry::SpatialIndexEntry;
use crate::hyperrectangle::Hyperrectangle;

/// Index of a node in the tree arena.
pub(crate) type NodeIndex = usize;

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Leaf(Vec<SpatialIndexEntry>),
    Directory(Vec<NodeIndex>),
}

/// One arena slot. The bounding box covers all children.
#[derive(Debug, Clone)]
pub(crate) struct RTreeNode {
    pub node_id: u32,
    pub bounding_box: Hyperrectangle,
    pub parent: Option<NodeIndex>,
    pub kind: NodeKind,
}

impl RTreeNode {
    pub fn leaf(node_id: u32, parent: Option<NodeIndex>) -> Self {
        RTreeNode {
            node_id,
            bounding_box: Hyperrectangle::FULL_SPACE,
            parent,
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.len(),
            NodeKind::Directory(children) => children.len(),
        }
    }

    pub fn entries(&self) -> &[SpatialIndexEntry] {
        match &self.kind {
            NodeKind::Leaf(entries) => entries,
            NodeKind::Directory(_) => &[],
        }
    }

    pub fn children(&self) -> &[NodeIndex] {
        match &self.kind {
            NodeKind::Leaf(_) => &[],
            NodeKind::Directory(children) => children,
        }
    }
}
