use super::metadata::SegmentMetadataBuilder;
use super::naming::{SegmentFiles, SegmentName};
use crate::bloom::BloomFilterGate;
use crate::codec::TupleCodec;
use crate::config::SegmentConfig;
use crate::errors::{StorageError, StorageResult};
use crate::reader::{remove_file_if_exists, FileKind};
use crate::spatial::{RTree, SpatialIndexEntry};
use crate::tuple::Tuple;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes the five files of one immutable segment.
///
/// Tuples are stored sorted by key. The key index, spatial index, bloom
/// filter and metadata are all derived from that one sorted batch.
pub struct SegmentWriter<'a> {
    base: PathBuf,
    name: &'a SegmentName,
    number: u64,
    config: &'a SegmentConfig,
}

impl<'a> SegmentWriter<'a> {
    pub fn new(base: impl AsRef<Path>, name: &'a SegmentName, number: u64, config: &'a SegmentConfig) -> Self {
        SegmentWriter {
            base: base.as_ref().to_path_buf(),
            name,
            number,
            config,
        }
    }

    /// Writes `tuples` as a new segment and returns its file paths.
    ///
    /// Nothing of the segment is left behind when writing fails.
    pub fn write(&self, mut tuples: Vec<Tuple>) -> StorageResult<SegmentFiles> {
        let files = self.name.segment_files(&self.base, self.number);
        if files.log.exists() {
            return Err(StorageError::InvalidOperation(format!(
                "segment {} of {} already exists",
                self.number, self.name
            )));
        }

        let mut tree = RTree::with_max_node_size(self.config.max_node_size())?;
        let directory = self.name.table_directory(&self.base);
        fs::create_dir_all(&directory).map_err(|e| StorageError::file_io(&directory, 0, e))?;

        tuples.sort_by(|a, b| a.key().cmp(b.key()));

        match self.write_files(&files, &tuples, &mut tree) {
            Ok(()) => {
                info!(
                    "Wrote segment {} of {} with {} tuples",
                    self.number,
                    self.name,
                    tuples.len()
                );
                Ok(files)
            }
            Err(e) => {
                warn!("Writing segment {} of {} failed: {}", self.number, self.name, e);
                for path in files.all() {
                    if let Err(cleanup) = remove_file_if_exists(path) {
                        warn!("Unable to remove {}: {}", path.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    fn write_files(&self, files: &SegmentFiles, tuples: &[Tuple], tree: &mut RTree) -> StorageResult<()> {
        let mut metadata = SegmentMetadataBuilder::new();
        for tuple in tuples {
            metadata.add_tuple(tuple)?;
        }

        let offsets = write_log(&files.log, tuples)?;
        write_key_index(&files.key_index, &offsets)?;

        let spatial_entries = tuples
            .iter()
            .zip(&offsets)
            .filter(|(tuple, _)| !tuple.bounding_box().is_full_space())
            .map(|(tuple, offset)| SpatialIndexEntry::new(tuple.bounding_box().clone(), *offset));
        if !tree.bulk_insert(spatial_entries) {
            return Err(StorageError::InvalidArgument(format!(
                "tuples of segment {} of {} mix bounding box dimensions",
                self.number, self.name
            )));
        }
        tree.save(&files.spatial_index)?;
        debug!(
            "Spatial index {} holds {} of {} tuples",
            files.spatial_index.display(),
            tree.len(),
            tuples.len()
        );

        if self.config.use_bloom_filter() {
            let filter = BloomFilterGate::build(
                tuples.iter().map(Tuple::key),
                tuples.len(),
                self.config.bloom_false_positive_rate(),
            )?;
            fs::write(&files.bloom_filter, filter).map_err(|e| StorageError::file_io(&files.bloom_filter, 0, e))?;
        }

        metadata.build().write_to_file(&files.metadata)
    }
}

/// Streams the sorted tuples into the log and returns their offsets.
fn write_log(path: &Path, tuples: &[Tuple]) -> StorageResult<Vec<u64>> {
    let file = File::create(path).map_err(|e| StorageError::file_io(path, 0, e))?;
    let mut out = BufWriter::new(file);
    let magic = FileKind::TUPLE_LOG.magic;
    out.write_all(magic).map_err(|e| StorageError::file_io(path, 0, e))?;

    let mut offsets = Vec::with_capacity(tuples.len());
    let mut position = magic.len() as u64;
    let mut record = Vec::new();
    for tuple in tuples {
        // Index entries are 32 bit.
        if position > i32::MAX as u64 {
            return Err(StorageError::InvalidArgument(format!(
                "tuple log {} exceeds 2 GiB",
                path.display()
            )));
        }
        offsets.push(position);

        record.clear();
        TupleCodec::encode(tuple, &mut record)?;
        out.write_all(&record)
            .map_err(|e| StorageError::file_io(path, position, e))?;
        position += record.len() as u64;
    }

    out.flush().map_err(|e| StorageError::file_io(path, position, e))?;
    Ok(offsets)
}

fn write_key_index(path: &Path, offsets: &[u64]) -> StorageResult<()> {
    let mut bytes = FileKind::KEY_INDEX.magic.to_vec();
    bytes.reserve(offsets.len() * 4);
    for offset in offsets {
        let offset = i32::try_from(*offset)
            .map_err(|_| StorageError::InvalidArgument(format!("log offset {} exceeds 2 GiB", offset)))?;
        bytes.extend_from_slice(&offset.to_be_bytes());
    }
    fs::write(path, bytes).map_err(|e| StorageError::file_io(path, 0, e))
}
