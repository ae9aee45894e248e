use super::metadata::SegmentMetadata;
use super::naming::{SegmentFiles, SegmentName};
use super::statistics::{ReadStatistics, ReadStats};
use crate::bloom::BloomFilterGate;
use crate::config::SegmentConfig;
use crate::errors::StorageResult;
use crate::hyperrectangle::Hyperrectangle;
use crate::reader::{remove_file_if_exists, KeyIndexIterator, KeyIndexReader, TupleLogReader};
use crate::spatial::RTree;
use crate::tuple::Tuple;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default)]
struct UsageState {
    usage: usize,
    delete_on_close: bool,
    deleted: bool,
}

/// One opened segment: every reader of its five files behind a shared
/// usage counter.
///
/// Callers bracket reads with [`acquire`](Self::acquire) and
/// [`release`](Self::release). Once [`delete_on_close`](Self::delete_on_close)
/// was requested, the segment refuses new users and removes its files
/// when the last user releases it.
pub struct SegmentFacade {
    name: SegmentName,
    number: u64,
    files: SegmentFiles,
    log: Arc<TupleLogReader>,
    key_index: KeyIndexReader,
    spatial_index: RTree,
    bloom: BloomFilterGate,
    metadata: SegmentMetadata,
    usage: Mutex<UsageState>,
    statistics: ReadStatistics,
}

impl SegmentFacade {
    /// Opens segment `number` of `name` below `base`.
    ///
    /// A bad log, key index, spatial index or metadata file fails the open.
    /// A missing or corrupt bloom filter only disables the filter.
    pub fn open(base: impl AsRef<Path>, name: &SegmentName, number: u64, config: &SegmentConfig) -> StorageResult<Self> {
        let files = name.segment_files(base.as_ref(), number);

        let log = Arc::new(TupleLogReader::new(&files.log, config.access_mode()));
        log.init()?;

        let key_index = KeyIndexReader::new(&files.key_index, config.access_mode(), log.clone());
        let (spatial_index, metadata) = match Self::load_indexes(&files, &key_index, config) {
            Ok(loaded) => loaded,
            Err(e) => {
                key_index.shutdown();
                log.shutdown();
                return Err(e);
            }
        };

        let bloom = if config.use_bloom_filter() {
            BloomFilterGate::load(&files.bloom_filter)
        } else {
            BloomFilterGate::absent()
        };

        info!(
            "Opened segment {} of {} with {} tuples",
            number,
            name,
            key_index.len()
        );

        Ok(SegmentFacade {
            name: name.clone(),
            number,
            files,
            log,
            key_index,
            spatial_index,
            bloom,
            metadata,
            usage: Mutex::new(UsageState::default()),
            statistics: ReadStatistics::default(),
        })
    }

    fn load_indexes(
        files: &SegmentFiles,
        key_index: &KeyIndexReader,
        config: &SegmentConfig,
    ) -> StorageResult<(RTree, SegmentMetadata)> {
        key_index.init()?;
        key_index.activate_key_cache(config.key_cache_capacity())?;
        let spatial_index = RTree::load(&files.spatial_index)?;
        let metadata = SegmentMetadata::read_from_file(&files.metadata)?;
        Ok((spatial_index, metadata))
    }

    // ==================== Reads ====================

    /// Every tuple stored under `key`, in index order.
    ///
    /// Versions are not resolved; a key written twice yields two tuples.
    pub fn get(&self, key: &str) -> StorageResult<Vec<Tuple>> {
        self.statistics.key_lookup();
        if !self.bloom.might_contain(key) {
            self.statistics.bloom_skip();
            return Ok(Vec::new());
        }

        let positions = self.key_index.positions_for_key(key)?;
        let mut tuples = Vec::with_capacity(positions.len());
        for position in positions {
            if let Some(tuple) = self.log.tuple_at(position)? {
                self.statistics.tuple_read(&tuple);
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }

    /// Tuples whose bounding box intersects `region`.
    ///
    /// Tuples stored with a full space box are not spatially indexed and
    /// are never part of the result.
    pub fn get_all_tuples_in_bounding_box(&self, region: &Hyperrectangle) -> StorageResult<Vec<Tuple>> {
        self.statistics.region_query();

        let mut entries = Vec::new();
        self.spatial_index.query_into(region, &mut entries);

        let mut tuples = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(tuple) = self.log.tuple_at(entry.offset())? {
                self.statistics.tuple_read(&tuple);
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }

    /// All tuples in key order.
    pub fn iter(&self) -> KeyIndexIterator<'_> {
        self.key_index.iter()
    }

    /// All tuples in key order for which `predicate` holds.
    pub fn iter_matching<'a, P>(&'a self, mut predicate: P) -> impl Iterator<Item = StorageResult<Tuple>> + 'a
    where
        P: FnMut(&Tuple) -> bool + 'a,
    {
        self.iter().filter(move |item| match item {
            Ok(tuple) => predicate(tuple),
            Err(_) => true,
        })
    }

    /// Tuple at position `ordinal` of the key order.
    pub fn tuple_at_ordinal(&self, ordinal: u64) -> StorageResult<Option<Tuple>> {
        if ordinal >= self.key_index.len() {
            return Ok(None);
        }
        let tuple = self.key_index.tuple_for_ordinal(ordinal)?;
        if let Some(tuple) = &tuple {
            self.statistics.tuple_read(tuple);
        }
        Ok(tuple)
    }

    // ==================== Accessors ====================

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn files(&self) -> &SegmentFiles {
        &self.files
    }

    /// Tuple count recorded in the metadata; stays valid after shutdown.
    pub fn number_of_tuples(&self) -> u64 {
        self.metadata.tuples()
    }

    pub fn metadata(&self) -> &SegmentMetadata {
        &self.metadata
    }

    pub fn oldest_version_timestamp(&self) -> i64 {
        self.metadata.oldest_version_timestamp()
    }

    pub fn newest_version_timestamp(&self) -> i64 {
        self.metadata.newest_version_timestamp()
    }

    pub fn newest_inserted_timestamp(&self) -> i64 {
        self.metadata.newest_inserted_timestamp()
    }

    pub fn bounding_box(&self) -> &Hyperrectangle {
        self.metadata.bounding_box()
    }

    pub fn spatial_index(&self) -> &RTree {
        &self.spatial_index
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_active()
    }

    /// Bytes of the log and the key index.
    pub fn size_on_disk(&self) -> u64 {
        self.log.file().size_on_disk() + self.key_index.file().size_on_disk()
    }

    pub fn statistics(&self) -> ReadStats {
        self.statistics.snapshot(self.key_index.key_cache_stats())
    }

    // ==================== Lifecycle ====================

    /// Registers a user. Fails once deletion was requested.
    pub fn acquire(&self) -> bool {
        let mut state = self.usage.lock();
        if state.delete_on_close {
            return false;
        }
        state.usage += 1;
        true
    }

    /// Unregisters a user and deletes the segment if it was the last one
    /// and deletion was requested.
    pub fn release(&self) {
        {
            let mut state = self.usage.lock();
            if state.usage == 0 {
                warn!("Release of segment {} of {} without acquire", self.number, self.name);
                return;
            }
            state.usage -= 1;
        }
        self.delete_if_unused();
    }

    /// Requests deletion. Happens right away when nobody uses the segment.
    pub fn delete_on_close(&self) {
        self.usage.lock().delete_on_close = true;
        self.delete_if_unused();
    }

    pub fn is_delete_pending(&self) -> bool {
        let state = self.usage.lock();
        state.delete_on_close && !state.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.usage.lock().deleted
    }

    pub fn usage(&self) -> usize {
        self.usage.lock().usage
    }

    /// Stops every reader without deleting any file.
    pub fn shutdown(&self) {
        debug!("Shutting down segment {} of {}", self.number, self.name);
        self.key_index.shutdown();
        self.log.shutdown();
    }

    fn delete_if_unused(&self) {
        {
            let mut state = self.usage.lock();
            if !state.delete_on_close || state.usage > 0 || state.deleted {
                return;
            }
            state.deleted = true;
        }

        info!("Deleting segment {} of {}", self.number, self.name);
        self.shutdown();

        if let Err(e) = self.key_index.delete() {
            error!("Unable to delete {}: {}", self.files.key_index.display(), e);
        }
        if let Err(e) = self.log.delete() {
            error!("Unable to delete {}: {}", self.files.log.display(), e);
        }
        for path in [&self.files.spatial_index, &self.files.bloom_filter, &self.files.metadata] {
            if let Err(e) = remove_file_if_exists(path) {
                error!("Unable to delete {}: {}", path.display(), e);
            }
        }
    }
}

impl fmt::Debug for SegmentFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.usage.lock();
        f.debug_struct("SegmentFacade")
            .field("name", &self.name)
            .field("number", &self.number)
            .field("tuples", &self.key_index.len())
            .field("usage", &state.usage)
            .field("delete_on_close", &state.delete_on_close)
            .finish()
    }
}
