use super::key_cache::{KeyCache, KeyCacheStats};
use super::segment_file::{FileKind, SegmentFileReader};
use super::tuple_log::TupleLogReader;
use crate::config::AccessMode;
use crate::errors::{StorageError, StorageResult};
use crate::tuple::Tuple;
use log::debug;
use once_cell::sync::OnceCell;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

/// Width of one key index record (`offset:i32`).
pub const INDEX_ENTRY_BYTES: u64 = 4;

/// Binary search over the key index of a segment.
///
/// Record `i` holds the log offset of the `i`-th tuple in key order. Keys
/// are materialised from the log, optionally through a bounded [`KeyCache`].
pub struct KeyIndexReader {
    file: SegmentFileReader,
    log: Arc<TupleLogReader>,
    key_cache: OnceCell<KeyCache>,
}

impl KeyIndexReader {
    pub fn new(path: impl Into<PathBuf>, access_mode: AccessMode, log: Arc<TupleLogReader>) -> Self {
        KeyIndexReader {
            file: SegmentFileReader::new(FileKind::KEY_INDEX, path, access_mode),
            log,
            key_cache: OnceCell::new(),
        }
    }

    /// Opens the index; a body of partial records fails the reader.
    pub fn init(&self) -> StorageResult<()> {
        self.file.init()
    }

    /// Enables the key cache. A capacity of `0` keeps it disabled.
    pub fn activate_key_cache(&self, capacity: usize) -> StorageResult<()> {
        let Some(capacity) = NonZeroUsize::new(capacity) else {
            return Ok(());
        };

        self.key_cache
            .set(KeyCache::new(capacity))
            .map_err(|_| StorageError::InvalidOperation("key cache is already active".into()))?;
        debug!("Key cache of {} entries active for {}", capacity, self.file.path().display());
        Ok(())
    }

    pub fn shutdown(&self) {
        if let Some(cache) = self.key_cache.get() {
            cache.clear();
        }
        self.file.shutdown()
    }

    pub fn delete(&self) -> StorageResult<()> {
        self.shutdown();
        self.file.delete()
    }

    pub fn file(&self) -> &SegmentFileReader {
        &self.file
    }

    /// Number of index records, `0` once closed.
    pub fn len(&self) -> u64 {
        self.file.data_len() / INDEX_ENTRY_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key_cache_stats(&self) -> Option<KeyCacheStats> {
        self.key_cache.get().map(KeyCache::stats)
    }

    /// Log offset stored at `ordinal`. An ordinal past the last record is a
    /// format error.
    pub fn offset_for_ordinal(&self, ordinal: u64) -> StorageResult<Option<u64>> {
        let position = ordinal
            .checked_mul(INDEX_ENTRY_BYTES)
            .and_then(|relative| relative.checked_add(FileKind::KEY_INDEX.data_start()))
            .ok_or_else(|| {
                StorageError::format(self.file.path(), format!("ordinal {} is out of range", ordinal))
            })?;
        self.file.with_view(|view| {
            let raw = self.file.read(view, position, INDEX_ENTRY_BYTES as usize)?;
            let offset = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
            u64::try_from(offset).map_err(|_| {
                StorageError::format(
                    self.file.path(),
                    format!("negative log offset {} for ordinal {}", offset, ordinal),
                )
            })
        })
    }

    /// Key of the tuple at `ordinal`, served from the key cache when active.
    pub fn key_for_ordinal(&self, ordinal: u64) -> StorageResult<Option<Arc<str>>> {
        match self.key_cache.get() {
            Some(cache) => cache.get_or_load(ordinal, || self.decode_key(ordinal)),
            None => Ok(self.decode_key(ordinal)?.map(Arc::from)),
        }
    }

    fn decode_key(&self, ordinal: u64) -> StorageResult<Option<String>> {
        match self.offset_for_ordinal(ordinal)? {
            Some(offset) => self.log.key_at(offset),
            None => Ok(None),
        }
    }

    /// Decodes the full tuple at `ordinal`.
    pub fn tuple_for_ordinal(&self, ordinal: u64) -> StorageResult<Option<Tuple>> {
        match self.offset_for_ordinal(ordinal)? {
            Some(offset) => self.log.tuple_at(offset),
            None => Ok(None),
        }
    }

    /// Log offsets of every tuple stored under `key`, in index order.
    ///
    /// Duplicate keys are all returned. An empty result means the key is
    /// absent or the index was closed concurrently.
    pub fn positions_for_key(&self, key: &str) -> StorageResult<Vec<u64>> {
        let Some(ordinals) = self.ordinals_for_key(key)? else {
            return Ok(Vec::new());
        };

        let mut positions = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            match self.offset_for_ordinal(ordinal)? {
                Some(offset) => positions.push(offset),
                None => return Ok(Vec::new()),
            }
        }
        Ok(positions)
    }

    /// `None` when the index was closed while searching.
    fn ordinals_for_key(&self, key: &str) -> StorageResult<Option<Vec<u64>>> {
        let entries = self.len();
        if entries == 0 {
            return Ok(Some(Vec::new()));
        }

        let last = entries - 1;
        let Some(first_key) = self.key_for_ordinal(0)? else {
            return Ok(None);
        };
        match key.cmp(&*first_key) {
            Ordering::Less => return Ok(Some(Vec::new())),
            Ordering::Equal => return self.collect_duplicates(key, 0, entries),
            Ordering::Greater => {}
        }

        let Some(last_key) = self.key_for_ordinal(last)? else {
            return Ok(None);
        };
        match key.cmp(&*last_key) {
            Ordering::Greater => return Ok(Some(Vec::new())),
            Ordering::Equal => return self.collect_duplicates(key, last, entries),
            Ordering::Less => {}
        }

        let mut low = 0u64;
        let mut high = last;
        while low <= high {
            let middle = low + (high - low) / 2;
            let Some(middle_key) = self.key_for_ordinal(middle)? else {
                return Ok(None);
            };

            match (*middle_key).cmp(key) {
                Ordering::Equal => return self.collect_duplicates(key, middle, entries),
                Ordering::Less => low = middle + 1,
                Ordering::Greater => {
                    if middle == 0 {
                        break;
                    }
                    high = middle - 1;
                }
            }
        }

        Ok(Some(Vec::new()))
    }

    /// Scans both neighbours of the matching `ordinal` for equal keys.
    fn collect_duplicates(&self, key: &str, ordinal: u64, entries: u64) -> StorageResult<Option<Vec<u64>>> {
        let mut first = ordinal;
        while first > 0 {
            match self.key_for_ordinal(first - 1)? {
                Some(previous) if &*previous == key => first -= 1,
                Some(_) => break,
                None => return Ok(None),
            }
        }

        let mut last = ordinal;
        while last + 1 < entries {
            match self.key_for_ordinal(last + 1)? {
                Some(next) if &*next == key => last += 1,
                Some(_) => break,
                None => return Ok(None),
            }
        }

        Ok(Some((first..=last).collect()))
    }

    /// Sequential iterator over all tuples in key order.
    pub fn iter(&self) -> KeyIndexIterator<'_> {
        KeyIndexIterator {
            reader: self,
            next: 0,
            end: self.len(),
        }
    }
}

/// Forward iterator over the tuples of a [`KeyIndexReader`].
///
/// Each step decodes one tuple. Iteration ends early when the index or the
/// log is closed underneath it; after an error it ends as well.
pub struct KeyIndexIterator<'a> {
    reader: &'a KeyIndexReader,
    next: u64,
    end: u64,
}

impl Iterator for KeyIndexIterator<'_> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }

        let ordinal = self.next;
        self.next += 1;
        match self.reader.tuple_for_ordinal(ordinal) {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => {
                self.next = self.end;
                None
            }
            Err(e) => {
                self.next = self.end;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (0, Some(remaining))
    }
}
