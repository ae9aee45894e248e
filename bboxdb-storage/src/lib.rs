//! # BBoxDB Storage - Segment Read Engine
//!
//! This crate reads the immutable on-disk segments ("SSTables") of a
//! spatially partitioned key/value store. One segment is made of five files:
//! a sorted tuple log, a fixed-record key index, an R-tree spatial index,
//! a bloom filter and a metadata sidecar.
//!
//! ## Features
//!
//! - **Mapped Reads**: Log and key index are read through `memmap2` views that
//!   are unmapped deterministically on shutdown
//! - **Binary Key Search**: Duplicate keys are resolved by a neighbour scan
//! - **Key Cache**: Bounded LRU cache with coalesced concurrent loads
//! - **Bloom Gate**: Absent keys skip the index lookup entirely
//! - **R-Tree**: Quadratic split, region queries and a two-pass disk format
//! - **Reference Counting**: Segments are deleted only once nobody uses them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bboxdb_storage::{Hyperrectangle, SegmentConfig, SegmentFacade, SegmentName, SegmentWriter, Tuple};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let name = SegmentName::new("group1", "points", None)?;
//! let config = SegmentConfig::default();
//!
//! let tuple = Tuple::new("key1", Hyperrectangle::from_intervals(&[(1.0, 2.0)])?, b"value".to_vec(), 1, 1);
//! SegmentWriter::new("/tmp/bboxdb", &name, 1, &config).write(vec![tuple])?;
//!
//! let segment = SegmentFacade::open("/tmp/bboxdb", &name, 1, &config)?;
//! if segment.acquire() {
//!     let tuples = segment.get("key1")?;
//!     assert_eq!(tuples.len(), 1);
//!     segment.release();
//! }
//! # Ok(())
//! # }
//! ```

pub mod bloom;
pub mod codec;
pub mod config;
pub mod errors;
pub mod hyperrectangle;
pub mod reader;
pub mod segment;
pub mod spatial;
pub mod tuple;

pub use bloom::BloomFilterGate;
pub use codec::TupleCodec;
pub use config::{AccessMode, SegmentConfig};
pub use errors::{StorageError, StorageResult};
pub use hyperrectangle::Hyperrectangle;
pub use reader::{KeyIndexReader, SegmentFileReader, ServiceStatus, TupleLogReader};
pub use segment::{
    ReadStats, SegmentFacade, SegmentFiles, SegmentMetadata, SegmentMetadataBuilder, SegmentName,
    SegmentWriter,
};
pub use spatial::{RTree, SpatialIndexEntry};
pub use tuple::Tuple;
