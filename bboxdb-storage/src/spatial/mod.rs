//! In-memory R-tree over the tuple boxes of one segment.
//!
//! The tree is built once by the writer, stored with a two-pass format that
//! patches child offsets after all nodes were written, and read back fully
//! when a segment is opened.
//!
//! Nodes live in an arena and reference their parent and children by index.

mod constants;
mod deserializer;
mod entry;
mod node;
mod rtree;
mod serializer;
mod split;

pub use constants::{CHILD_ABSENT, DEFAULT_NODE_SIZE, ENTRY_ABSENT, ENTRY_FOLLOWS, MIN_NODE_SIZE};
pub use deserializer::RTreeReader;
pub use entry::SpatialIndexEntry;
pub use rtree::RTree;
pub use serializer::RTreeSerializer;
