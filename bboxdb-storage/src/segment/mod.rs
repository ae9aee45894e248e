//! A segment as a whole: its file names, its metadata sidecar, the writer
//! that produces it and the reference counted facade that reads it.

mod facade;
mod metadata;
mod naming;
mod statistics;
mod writer;

pub use facade::SegmentFacade;
pub use metadata::{SegmentMetadata, SegmentMetadataBuilder};
pub use naming::{
    SegmentFiles, SegmentName, BLOOM_FILTER_SUFFIX, DATA_DIRECTORY, METADATA_SUFFIX, SEGMENT_PREFIX,
};
pub use statistics::ReadStats;
pub use writer::SegmentWriter;
