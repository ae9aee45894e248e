//! Readers for the memory mapped files of one segment.
//!
//! Every file shares one generic [`SegmentFileReader`]: it validates the
//! magic preamble of its [`FileKind`], tracks the lifecycle state and
//! guards the mapped view with a usage counter. The typed readers compose
//! it instead of specialising it.

mod file_view;
mod key_cache;
mod key_index;
mod segment_file;
mod service_state;
mod tuple_log;

pub use file_view::FileView;
pub use key_cache::{KeyCache, KeyCacheStats};
pub use key_index::{KeyIndexIterator, KeyIndexReader, INDEX_ENTRY_BYTES};
pub use segment_file::{FileKind, SegmentFileReader};
pub(crate) use segment_file::remove_file_if_exists;
pub use service_state::{ServiceState, ServiceStatus, UsageGuard};
pub use tuple_log::TupleLogReader;
