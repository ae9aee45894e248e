use crate::errors::{StorageError, StorageResult};
use crate::hyperrectangle::Hyperrectangle;
use crate::tuple::Tuple;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Summary of a segment, stored next to it in the `.meta` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    tuples: u64,
    oldest_version_timestamp: i64,
    newest_version_timestamp: i64,
    newest_inserted_timestamp: i64,
    bounding_box: Hyperrectangle,
}

impl SegmentMetadata {
    pub fn tuples(&self) -> u64 {
        self.tuples
    }

    pub fn oldest_version_timestamp(&self) -> i64 {
        self.oldest_version_timestamp
    }

    pub fn newest_version_timestamp(&self) -> i64 {
        self.newest_version_timestamp
    }

    pub fn newest_inserted_timestamp(&self) -> i64 {
        self.newest_inserted_timestamp
    }

    /// Covering box of every tuple, the full space for an empty segment.
    pub fn bounding_box(&self) -> &Hyperrectangle {
        &self.bounding_box
    }

    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy())
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Decodes a sidecar. Malformed bytes and invalid boxes are format errors.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
            .map(|(metadata, _)| metadata)
            .map_err(|e| StorageError::Format(format!("invalid segment metadata: {}", e)))
    }

    pub fn read_from_file(path: &Path) -> StorageResult<Self> {
        let bytes = fs::read(path).map_err(|e| StorageError::file_io(path, 0, e))?;
        Self::from_bytes(&bytes).map_err(|e| match e {
            StorageError::Format(message) => StorageError::format(path, message),
            other => other,
        })
    }

    pub fn write_to_file(&self, path: &Path) -> StorageResult<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|e| StorageError::file_io(path, 0, e))
    }
}

/// Accumulates [`SegmentMetadata`] while tuples are written.
#[derive(Debug, Default)]
pub struct SegmentMetadataBuilder {
    tuples: u64,
    oldest_version_timestamp: Option<i64>,
    newest_version_timestamp: Option<i64>,
    newest_inserted_timestamp: Option<i64>,
    bounding_box: Hyperrectangle,
}

impl SegmentMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `tuple` into the summary. A box whose dimension differs from
    /// the boxes seen so far is rejected and leaves the builder unchanged.
    pub fn add_tuple(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let bounding_box = self.bounding_box.merge(tuple.bounding_box())?;
        self.tuples += 1;

        let version = tuple.version_timestamp();
        self.oldest_version_timestamp = Some(self.oldest_version_timestamp.map_or(version, |t| t.min(version)));
        self.newest_version_timestamp = Some(self.newest_version_timestamp.map_or(version, |t| t.max(version)));

        let received = tuple.received_timestamp();
        self.newest_inserted_timestamp = Some(self.newest_inserted_timestamp.map_or(received, |t| t.max(received)));

        self.bounding_box = bounding_box;
        Ok(())
    }

    pub fn build(self) -> SegmentMetadata {
        SegmentMetadata {
            tuples: self.tuples,
            oldest_version_timestamp: self.oldest_version_timestamp.unwrap_or(0),
            newest_version_timestamp: self.newest_version_timestamp.unwrap_or(0),
            newest_inserted_timestamp: self.newest_inserted_timestamp.unwrap_or(0),
            bounding_box: self.bounding_box,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tuple(key: &str, intervals: &[(f64, f64)], version: i64, received: i64) -> Tuple {
        let bbox = if intervals.is_empty() {
            Hyperrectangle::FULL_SPACE
        } else {
            Hyperrectangle::from_intervals(intervals).unwrap()
        };
        Tuple::new(key, bbox, b"v".to_vec(), version, received)
    }

    #[test]
    fn test_builder_tracks_timestamps_and_box() {
        let mut builder = SegmentMetadataBuilder::new();
        builder.add_tuple(&tuple("a", &[(1.0, 2.0), (1.0, 2.0)], 20, 5)).unwrap();
        builder.add_tuple(&tuple("b", &[(5.0, 6.0), (0.0, 1.0)], 10, 50)).unwrap();
        builder.add_tuple(&tuple("c", &[], 30, 7)).unwrap();
        assert!(builder.add_tuple(&tuple("d", &[(0.0, 9.0)], 99, 99)).is_err());
        let metadata = builder.build();

        assert_eq!(metadata.tuples(), 3);
        assert_eq!(metadata.oldest_version_timestamp(), 10);
        assert_eq!(metadata.newest_version_timestamp(), 30);
        assert_eq!(metadata.newest_inserted_timestamp(), 50);
        assert_eq!(
            metadata.bounding_box(),
            &Hyperrectangle::from_intervals(&[(1.0, 6.0), (0.0, 2.0)]).unwrap()
        );
    }

    #[test]
    fn test_empty_builder() {
        let metadata = SegmentMetadataBuilder::new().build();
        assert_eq!(metadata.tuples(), 0);
        assert_eq!(metadata.oldest_version_timestamp(), 0);
        assert_eq!(metadata.newest_inserted_timestamp(), 0);
        assert!(metadata.bounding_box().is_full_space());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_t_1.meta");

        let mut builder = SegmentMetadataBuilder::new();
        builder.add_tuple(&tuple("a", &[(1.0, 2.0)], -4, 9)).unwrap();
        let metadata = builder.build();
        metadata.write_to_file(&path).unwrap();

        assert_eq!(SegmentMetadata::read_from_file(&path).unwrap(), metadata);
    }

    #[test]
    fn test_corrupt_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_t_1.meta");
        assert!(SegmentMetadata::read_from_file(&path).unwrap_err().is_io());

        fs::write(&path, [1u8, 2, 3]).unwrap();
        let err = SegmentMetadata::read_from_file(&path).unwrap_err();
        assert!(err.is_format(), "{:?}", err);
        assert!(err.to_string().contains("sstable_t_1.meta"));
    }

    #[test]
    fn test_invalid_box_in_sidecar_is_format_error() {
        let mut builder = SegmentMetadataBuilder::new();
        builder.add_tuple(&tuple("a", &[(1.0, 2.0)], 1, 1)).unwrap();
        let mut bytes = builder.build().to_bytes().unwrap();

        // The box is encoded last: low 1.0 and high 2.0. Swap them.
        let len = bytes.len();
        let low = bytes[len - 16..len - 8].to_vec();
        let high = bytes[len - 8..].to_vec();
        bytes[len - 16..len - 8].copy_from_slice(&high);
        bytes[len - 8..].copy_from_slice(&low);

        assert!(SegmentMetadata::from_bytes(&bytes).unwrap_err().is_format());
    }
}
