use super::file_view::FileView;
use super::segment_file::{FileKind, SegmentFileReader};
use crate::codec::TupleCodec;
use crate::config::AccessMode;
use crate::errors::{StorageError, StorageResult};
use crate::tuple::Tuple;
use std::path::PathBuf;

/// Random access to the tuples of a segment log.
pub struct TupleLogReader {
    file: SegmentFileReader,
}

impl TupleLogReader {
    pub fn new(path: impl Into<PathBuf>, access_mode: AccessMode) -> Self {
        TupleLogReader {
            file: SegmentFileReader::new(FileKind::TUPLE_LOG, path, access_mode),
        }
    }

    pub fn init(&self) -> StorageResult<()> {
        self.file.init()
    }

    pub fn shutdown(&self) {
        self.file.shutdown()
    }

    pub fn delete(&self) -> StorageResult<()> {
        self.file.delete()
    }

    pub fn file(&self) -> &SegmentFileReader {
        &self.file
    }

    /// Decodes the tuple stored at byte `offset`.
    ///
    /// `None` when the log was closed concurrently.
    pub fn tuple_at(&self, offset: u64) -> StorageResult<Option<Tuple>> {
        self.file
            .with_view(|view| self.decode_at(view, offset).map(|(tuple, _)| tuple))
    }

    /// Decodes only the key of the tuple at byte `offset`.
    pub fn key_at(&self, offset: u64) -> StorageResult<Option<String>> {
        self.file.with_view(|view| {
            let header = self.file.read(view, offset, TupleCodec::HEADER_LEN)?;
            let key_len = i16::from_be_bytes([header[0], header[1]]);
            let key_len = usize::try_from(key_len).map_err(|_| {
                StorageError::format(
                    self.file.path(),
                    format!("negative key length {} at offset {}", key_len, offset),
                )
            })?;

            let record = self.file.read(view, offset, TupleCodec::HEADER_LEN + key_len)?;
            let mut pos = 0;
            TupleCodec::decode_key_only(&record, &mut pos)
                .map_err(|e| StorageError::format(self.file.path(), format!("offset {}: {}", offset, e)))
        })
    }

    /// Linear scan for the first tuple stored under `key`.
    ///
    /// The log is sorted by key, so the scan ends at the first larger key.
    pub fn scan_for_tuple(&self, key: &str) -> StorageResult<Option<Tuple>> {
        let found = self.file.with_view(|view| {
            let mut offset = FileKind::TUPLE_LOG.data_start();
            while offset < view.len() {
                let (tuple, next) = self.decode_at(view, offset)?;
                match tuple.key().cmp(key) {
                    std::cmp::Ordering::Equal => return Ok(Some(tuple)),
                    std::cmp::Ordering::Greater => return Ok(None),
                    std::cmp::Ordering::Less => offset = next,
                }
            }
            Ok(None)
        })?;
        Ok(found.flatten())
    }

    /// Byte offsets of every record, in file order.
    pub fn record_offsets(&self) -> StorageResult<Vec<u64>> {
        let offsets = self.file.with_view(|view| {
            let mut offsets = Vec::new();
            let mut offset = FileKind::TUPLE_LOG.data_start();
            while offset < view.len() {
                offsets.push(offset);
                offset += self.record_len_at(view, offset)? as u64;
            }
            Ok(offsets)
        })?;
        Ok(offsets.unwrap_or_default())
    }

    fn record_len_at(&self, view: &FileView, offset: u64) -> StorageResult<usize> {
        let header = self.file.read(view, offset, TupleCodec::HEADER_LEN)?;
        TupleCodec::record_len(&header)
            .map_err(|e| StorageError::format(self.file.path(), format!("offset {}: {}", offset, e)))
    }

    /// Returns the tuple at `offset` and the offset of the next record.
    fn decode_at(&self, view: &FileView, offset: u64) -> StorageResult<(Tuple, u64)> {
        let len = self.record_len_at(view, offset)?;
        let record = self.file.read(view, offset, len)?;

        let mut pos = 0;
        let tuple = TupleCodec::decode(&record, &mut pos)
            .map_err(|e| StorageError::format(self.file.path(), format!("offset {}: {}", offset, e)))?;
        Ok((tuple, offset + len as u64))
    }
}
