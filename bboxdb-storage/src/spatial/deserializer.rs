use super::constants::{CHILD_ABSENT, ENTRY_ABSENT, ENTRY_FOLLOWS, MIN_NODE_SIZE};
use super::entry::{read_box, read_exact, read_i32, SpatialIndexEntry};
use super::node::{NodeIndex, NodeKind, RTreeNode};
use super::rtree::RTree;
use crate::errors::{StorageError, StorageResult};
use crate::reader::FileKind;
use std::collections::{HashSet, VecDeque};
use std::io::{Read, Seek, SeekFrom};

/// Reads the format written by [`super::RTreeSerializer`].
///
/// The root follows the header directly; every other node is reached
/// through the child offsets of its parent, breadth first.
pub struct RTreeReader<R> {
    input: R,
}

impl<R: Read + Seek> RTreeReader<R> {
    pub fn new(input: R) -> Self {
        RTreeReader { input }
    }

    pub fn read(mut self) -> StorageResult<RTree> {
        let magic = FileKind::SPATIAL_INDEX.magic;
        let mut preamble = vec![0u8; magic.len()];
        read_exact(&mut self.input, &mut preamble)?;
        if preamble != magic {
            return Err(StorageError::Format("magic preamble of a spatial index file expected".into()));
        }

        let max_node_size = read_i32(&mut self.input)?;
        let max_node_size = usize::try_from(max_node_size)
            .ok()
            .filter(|size| *size >= MIN_NODE_SIZE)
            .ok_or_else(|| StorageError::Format(format!("invalid max node size {}", max_node_size)))?;

        let mut nodes = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        let root_offset = self.input.stream_position()?;
        visited.insert(root_offset);
        self.read_node(None, max_node_size, &mut nodes, &mut queue)?;

        while let Some((parent, offset)) = queue.pop_front() {
            if !visited.insert(offset) {
                return Err(StorageError::Format(format!("node at offset {} is referenced twice", offset)));
            }

            self.input.seek(SeekFrom::Start(offset))?;
            let index = self.read_node(Some(parent), max_node_size, &mut nodes, &mut queue)?;
            if let NodeKind::Directory(children) = &mut nodes[parent].kind {
                children.push(index);
            }
        }

        Ok(RTree::from_parts(nodes, max_node_size))
    }

    /// Reads the node at the current position, appends it to `nodes` and
    /// queues its children.
    fn read_node(
        &mut self,
        parent: Option<NodeIndex>,
        max_node_size: usize,
        nodes: &mut Vec<RTreeNode>,
        queue: &mut VecDeque<(NodeIndex, u64)>,
    ) -> StorageResult<NodeIndex> {
        let node_id = read_i32(&mut self.input)?;
        let node_id = u32::try_from(node_id)
            .map_err(|_| StorageError::Format(format!("negative node id {}", node_id)))?;
        let bounding_box = read_box(&mut self.input)?;

        let mut entries = Vec::new();
        for _ in 0..max_node_size {
            let mut marker = [0u8; 1];
            read_exact(&mut self.input, &mut marker)?;
            match marker[0] {
                ENTRY_FOLLOWS => entries.push(SpatialIndexEntry::read_from(&mut self.input)?),
                ENTRY_ABSENT => {}
                other => {
                    return Err(StorageError::Format(format!(
                        "unknown entry marker {:#04x} in node {}",
                        other, node_id
                    )))
                }
            }
        }

        let index = nodes.len();
        let mut has_children = false;
        for _ in 0..max_node_size {
            let offset = read_i32(&mut self.input)?;
            if offset == CHILD_ABSENT {
                continue;
            }

            let offset = u64::try_from(offset)
                .map_err(|_| StorageError::Format(format!("invalid child offset {} in node {}", offset, node_id)))?;
            queue.push_back((index, offset));
            has_children = true;
        }

        let kind = match (has_children, entries.is_empty()) {
            (true, false) => {
                return Err(StorageError::Format(format!(
                    "node {} holds entries and children",
                    node_id
                )))
            }
            (true, true) => NodeKind::Directory(Vec::new()),
            (false, _) => NodeKind::Leaf(entries),
        };

        nodes.push(RTreeNode {
            node_id,
            bounding_box,
            parent,
            kind,
        });
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperrectangle::Hyperrectangle;
    use crate::spatial::RTreeSerializer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn random_entries(count: u64, dimensions: usize, seed: u64) -> Vec<SpatialIndexEntry> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|offset| {
                let intervals: Vec<(f64, f64)> = (0..dimensions)
                    .map(|_| {
                        let low = rng.gen_range(0.0..100.0);
                        (low, low + rng.gen_range(0.0..5.0))
                    })
                    .collect();
                SpatialIndexEntry::new(Hyperrectangle::from_intervals(&intervals).unwrap(), offset)
            })
            .collect()
    }

    fn serialize(tree: &RTree) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RTreeSerializer::new(tree).serialize(&mut out).unwrap();
        out.into_inner()
    }

    fn offsets(mut entries: Vec<SpatialIndexEntry>) -> Vec<u64> {
        entries.sort_by_key(|e| e.offset());
        entries.iter().map(|e| e.offset()).collect()
    }

    #[test]
    fn test_round_trip_query_results() {
        for node_size in [2, 5, 64] {
            let mut tree = RTree::with_max_node_size(node_size).unwrap();
            tree.bulk_insert(random_entries(1000, 2, node_size as u64));

            let read = RTreeReader::new(Cursor::new(serialize(&tree))).read().unwrap();
            assert_eq!(read.len(), tree.len());
            assert_eq!(read.node_count(), tree.node_count());
            assert_eq!(read.max_node_size(), node_size);
            assert_eq!(read.bounding_box(), tree.bounding_box());
            assert!(read.is_consistent());

            let mut rng = StdRng::seed_from_u64(99);
            for _ in 0..50 {
                let low_x = rng.gen_range(0.0..100.0);
                let low_y = rng.gen_range(0.0..100.0);
                let region = Hyperrectangle::from_intervals(&[(low_x, low_x + 20.0), (low_y, low_y + 20.0)]).unwrap();
                assert_eq!(offsets(read.query(&region)), offsets(tree.query(&region)));
            }
        }
    }

    #[test]
    fn test_round_trip_empty_tree() {
        let tree = RTree::new();
        let read = RTreeReader::new(Cursor::new(serialize(&tree))).read().unwrap();
        assert!(read.is_empty());
        assert!(read.query(&Hyperrectangle::FULL_SPACE).is_empty());
    }

    #[test]
    fn test_inserts_after_reading() {
        let mut tree = RTree::with_max_node_size(4).unwrap();
        tree.bulk_insert(random_entries(20, 1, 3));
        let mut read = RTreeReader::new(Cursor::new(serialize(&tree))).read().unwrap();

        assert!(read.bulk_insert(random_entries(20, 1, 4)));
        assert_eq!(read.len(), 40);
        assert!(read.is_consistent());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.sidx");
        let mut tree = RTree::new();
        tree.bulk_insert(random_entries(300, 3, 11));
        tree.save(&path).unwrap();

        let read = RTree::load(&path).unwrap();
        assert_eq!(offsets(read.entries()), offsets(tree.entries()));
    }

    #[test]
    fn test_corrupt_input() {
        let mut tree = RTree::with_max_node_size(3).unwrap();
        tree.bulk_insert(random_entries(10, 2, 5));
        let bytes = serialize(&tree);

        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xFF;
        assert!(RTreeReader::new(Cursor::new(bad_magic)).read().unwrap_err().is_format());

        let truncated = bytes[..bytes.len() - 3].to_vec();
        assert!(RTreeReader::new(Cursor::new(truncated)).read().unwrap_err().is_format());

        let mut bad_size = bytes.clone();
        let size_at = FileKind::SPATIAL_INDEX.magic.len();
        bad_size[size_at..size_at + 4].copy_from_slice(&0i32.to_be_bytes());
        assert!(RTreeReader::new(Cursor::new(bad_size)).read().unwrap_err().is_format());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(RTree::load(&dir.path().join("missing.sidx")).unwrap_err().is_io());
    }
}
