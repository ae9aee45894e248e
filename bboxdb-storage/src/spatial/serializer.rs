use super::constants::{CHILD_ABSENT, ENTRY_ABSENT, ENTRY_FOLLOWS};
use super::node::NodeIndex;
use super::rtree::RTree;
use crate::errors::{StorageError, StorageResult};
use crate::reader::FileKind;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Seek, SeekFrom, Write};

/// Writes an [`RTree`] in two passes.
///
/// The first pass writes every node breadth first with placeholder child
/// slots and records where each node starts and where its child slots
/// begin. The second pass seeks back and fills in the child offsets.
///
/// ```text
/// magic | maxNodeSize:i32 | node*
/// node = nodeId:i32 | bboxLen:i32 | bbox | (marker:u8 [entry]) x max | (childOffset:i32) x max
/// ```
pub struct RTreeSerializer<'a> {
    tree: &'a RTree,
    node_offsets: HashMap<u32, u64>,
    patch_points: BTreeMap<u64, NodeIndex>,
}

impl<'a> RTreeSerializer<'a> {
    pub fn new(tree: &'a RTree) -> Self {
        RTreeSerializer {
            tree,
            node_offsets: HashMap::new(),
            patch_points: BTreeMap::new(),
        }
    }

    pub fn serialize<W: Write + Seek>(mut self, out: &mut W) -> StorageResult<()> {
        let max_node_size = i32::try_from(self.tree.max_node_size())
            .map_err(|_| StorageError::InvalidArgument("max node size exceeds the index format".into()))?;

        out.write_all(FileKind::SPATIAL_INDEX.magic)?;
        out.write_all(&max_node_size.to_be_bytes())?;

        self.write_nodes(out)?;
        self.patch_child_offsets(out)?;

        out.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn write_nodes<W: Write + Seek>(&mut self, out: &mut W) -> StorageResult<()> {
        let max_node_size = self.tree.max_node_size();
        let mut queue = VecDeque::from([self.tree.root()]);
        let mut buffer = Vec::new();

        while let Some(index) = queue.pop_front() {
            let node = self.tree.node(index);
            let node_offset = out.stream_position()?;
            self.node_offsets.insert(node.node_id, node_offset);

            buffer.clear();
            buffer.extend_from_slice(&(node.node_id as i32).to_be_bytes());
            let bbox_len = i32::try_from(node.bounding_box.encoded_len())
                .map_err(|_| StorageError::InvalidArgument("bounding box too large".into()))?;
            buffer.extend_from_slice(&bbox_len.to_be_bytes());
            node.bounding_box.write_bytes(&mut buffer);

            let entries = node.entries();
            for slot in 0..max_node_size {
                match entries.get(slot) {
                    Some(entry) => {
                        buffer.push(ENTRY_FOLLOWS);
                        entry.write_to(&mut buffer)?;
                    }
                    None => buffer.push(ENTRY_ABSENT),
                }
            }

            self.patch_points.insert(node_offset + buffer.len() as u64, index);

            let children = node.children();
            for slot in 0..max_node_size {
                buffer.extend_from_slice(&CHILD_ABSENT.to_be_bytes());
                if let Some(child) = children.get(slot) {
                    queue.push_back(*child);
                }
            }

            out.write_all(&buffer)?;
        }

        Ok(())
    }

    fn patch_child_offsets<W: Write + Seek>(&self, out: &mut W) -> StorageResult<()> {
        for (patch_point, index) in &self.patch_points {
            let children = self.tree.node(*index).children();
            if children.is_empty() {
                continue;
            }

            out.seek(SeekFrom::Start(*patch_point))?;
            for child in children {
                let child_id = self.tree.node(*child).node_id;
                let offset = self.node_offsets.get(&child_id).ok_or_else(|| {
                    StorageError::InvalidOperation(format!("node {} was never written", child_id))
                })?;
                let offset = i32::try_from(*offset)
                    .map_err(|_| StorageError::InvalidArgument("spatial index exceeds 2 GiB".into()))?;
                out.write_all(&offset.to_be_bytes())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperrectangle::Hyperrectangle;
    use crate::spatial::SpatialIndexEntry;
    use std::io::Cursor;

    fn entry(low: f64, offset: u64) -> SpatialIndexEntry {
        SpatialIndexEntry::new(Hyperrectangle::from_intervals(&[(low, low + 1.0)]).unwrap(), offset)
    }

    #[test]
    fn test_single_leaf_layout() {
        let mut tree = RTree::with_max_node_size(2).unwrap();
        tree.insert(entry(0.0, 7));

        let mut out = Cursor::new(Vec::new());
        RTreeSerializer::new(&tree).serialize(&mut out).unwrap();
        let bytes = out.into_inner();

        let magic = FileKind::SPATIAL_INDEX.magic;
        assert_eq!(&bytes[..magic.len()], magic);
        let mut pos = magic.len();
        assert_eq!(&bytes[pos..pos + 4], &2i32.to_be_bytes());
        pos += 4;
        assert_eq!(&bytes[pos..pos + 4], &0i32.to_be_bytes());
        pos += 4;
        assert_eq!(&bytes[pos..pos + 4], &16i32.to_be_bytes());
        pos += 4 + 16;
        assert_eq!(bytes[pos], ENTRY_FOLLOWS);
        pos += 1 + 4 + 4 + 16;
        assert_eq!(bytes[pos], ENTRY_ABSENT);
        pos += 1;
        assert_eq!(&bytes[pos..pos + 4], &CHILD_ABSENT.to_be_bytes());
        assert_eq!(&bytes[pos + 4..pos + 8], &CHILD_ABSENT.to_be_bytes());
        assert_eq!(bytes.len(), pos + 8);
    }

    #[test]
    fn test_child_offsets_are_patched() {
        let mut tree = RTree::with_max_node_size(2).unwrap();
        for i in 0..3u64 {
            tree.insert(entry(i as f64 * 10.0, i));
        }
        assert_eq!(tree.node_count(), 3);

        let mut out = Cursor::new(Vec::new());
        RTreeSerializer::new(&tree).serialize(&mut out).unwrap();
        let bytes = out.into_inner();

        // Root: id, box, two absent leaf slots, then two child offsets.
        let root_start = FileKind::SPATIAL_INDEX.magic.len() + 4;
        let slots = root_start + 4 + 4 + 16 + 2;
        let first = i32::from_be_bytes(bytes[slots..slots + 4].try_into().unwrap());
        let second = i32::from_be_bytes(bytes[slots + 4..slots + 8].try_into().unwrap());

        assert_eq!(first as usize, slots + 8);
        assert!(second > first);
        assert!((second as usize) < bytes.len());
    }
}
