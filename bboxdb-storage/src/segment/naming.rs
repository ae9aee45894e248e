//! File layout of the segments of one table.
//!
//! ```text
//! <base>/data/<group>/<table>[_<region>]/sstable_<table>_<number>.<suffix>
//! ```

use crate::errors::{StorageError, StorageResult};
use crate::reader::FileKind;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIRECTORY: &str = "data";
pub const SEGMENT_PREFIX: &str = "sstable_";
pub const BLOOM_FILTER_SUFFIX: &str = ".blm";
pub const METADATA_SUFFIX: &str = ".meta";

const SEPARATOR: char = '_';

/// Distribution group, table and optional region of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName {
    group: String,
    table: String,
    region: Option<u64>,
}

impl SegmentName {
    pub fn new(group: &str, table: &str, region: Option<u64>) -> StorageResult<Self> {
        for (what, part) in [("distribution group", group), ("table", table)] {
            if part.is_empty() || part.contains(SEPARATOR) || part.contains(['/', '\\']) || part == ".." {
                return Err(StorageError::InvalidArgument(format!("invalid {} name: {:?}", what, part)));
            }
        }

        Ok(SegmentName {
            group: group.to_string(),
            table: table.to_string(),
            region,
        })
    }

    /// Parses `group_table` or `group_table_region`.
    pub fn parse(fullname: &str) -> StorageResult<Self> {
        let parts: Vec<&str> = fullname.split(SEPARATOR).collect();
        match parts.as_slice() {
            [group, table] => SegmentName::new(group, table, None),
            [group, table, region] => {
                let region = region.parse::<u64>().map_err(|_| {
                    StorageError::InvalidArgument(format!("invalid region in {:?}", fullname))
                })?;
                SegmentName::new(group, table, Some(region))
            }
            _ => Err(StorageError::InvalidArgument(format!("invalid table name {:?}", fullname))),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn region(&self) -> Option<u64> {
        self.region
    }

    pub fn fullname(&self) -> String {
        match self.region {
            Some(region) => format!("{}_{}_{}", self.group, self.table, region),
            None => format!("{}_{}", self.group, self.table),
        }
    }

    /// Directory holding all segments of this table.
    pub fn table_directory(&self, base: &Path) -> PathBuf {
        let table = match self.region {
            Some(region) => format!("{}_{}", self.table, region),
            None => self.table.clone(),
        };
        base.join(DATA_DIRECTORY).join(&self.group).join(table)
    }

    pub fn segment_files(&self, base: &Path, number: u64) -> SegmentFiles {
        let file_base = format!("{}{}_{}", SEGMENT_PREFIX, self.table, number);
        SegmentFiles::new(&self.table_directory(base), &file_base)
    }

    /// Numbers of the segments whose log file exists, ascending.
    pub fn discover_segments(&self, base: &Path) -> StorageResult<Vec<u64>> {
        let directory = self.table_directory(base);
        let listing = match fs::read_dir(&directory) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&directory, 0, e)),
        };

        let mut numbers = Vec::new();
        for item in listing {
            let item = item.map_err(|e| StorageError::file_io(&directory, 0, e))?;
            if let Some(number) = item.file_name().to_str().and_then(|name| self.segment_number(name)) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Segment number of a log file name such as `sstable_table_12.sst`.
    pub fn segment_number(&self, file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(SEGMENT_PREFIX)?
            .strip_suffix(FileKind::TUPLE_LOG.suffix)?
            .strip_prefix(self.table.as_str())?
            .strip_prefix(SEPARATOR)?
            .parse()
            .ok()
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

/// Paths of the five files of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFiles {
    pub log: PathBuf,
    pub key_index: PathBuf,
    pub spatial_index: PathBuf,
    pub bloom_filter: PathBuf,
    pub metadata: PathBuf,
}

impl SegmentFiles {
    pub fn new(directory: &Path, file_base: &str) -> Self {
        let path = |suffix: &str| directory.join(format!("{}{}", file_base, suffix));
        SegmentFiles {
            log: path(FileKind::TUPLE_LOG.suffix),
            key_index: path(FileKind::KEY_INDEX.suffix),
            spatial_index: path(FileKind::SPATIAL_INDEX.suffix),
            bloom_filter: path(BLOOM_FILTER_SUFFIX),
            metadata: path(METADATA_SUFFIX),
        }
    }

    pub fn all(&self) -> [&Path; 5] {
        [
            &self.log,
            &self.key_index,
            &self.spatial_index,
            &self.bloom_filter,
            &self.metadata,
        ]
    }

    /// Files of the segment that are currently on disk.
    pub fn existing(&self) -> Vec<&Path> {
        self.all().into_iter().filter(|path| path.exists()).collect()
    }
}
