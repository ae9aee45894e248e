//! Constants of the R-tree and its file format.

/// Default maximum number of children per node
pub const DEFAULT_NODE_SIZE: usize = 64;

/// Smallest usable node size; a split needs two seeds
pub const MIN_NODE_SIZE: usize = 2;

/// Leaf slot marker: an entry follows
pub const ENTRY_FOLLOWS: u8 = 0x01;

/// Leaf slot marker: empty slot
pub const ENTRY_ABSENT: u8 = 0x00;

/// Child slot value of a missing child
pub const CHILD_ABSENT: i32 = -1;
