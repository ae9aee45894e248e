//! Approximate key membership in front of the key index.

use crate::errors::{StorageError, StorageResult};
use bloomfilter::Bloom;
use log::warn;
use std::fs;
use std::io;
use std::path::Path;

/// Optional bloom filter of the keys of one segment.
///
/// Without a filter every key "might" be present, so the gate never prunes
/// a key that is stored in the segment.
pub struct BloomFilterGate {
    filter: Option<Bloom<[u8]>>,
}

impl BloomFilterGate {
    /// A gate that lets every key through.
    pub fn absent() -> Self {
        BloomFilterGate { filter: None }
    }

    /// Loads the filter stored at `path`.
    ///
    /// A missing or unreadable filter is logged once and yields an absent
    /// gate; opening a segment never fails because of its bloom filter.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Bloom filter {} is missing, every key lookup will search the index", path.display());
                return BloomFilterGate::absent();
            }
            Err(e) => {
                warn!("Unable to read bloom filter {}: {}, every key lookup will search the index", path.display(), e);
                return BloomFilterGate::absent();
            }
        };

        match BloomFilterGate::from_bytes(&bytes) {
            Ok(gate) => gate,
            Err(e) => {
                warn!("Bloom filter {} is corrupt: {}, every key lookup will search the index", path.display(), e);
                BloomFilterGate::absent()
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        let filter = Bloom::from_slice(bytes)
            .map_err(|e| StorageError::Format(format!("invalid bloom filter: {}", e)))?;
        Ok(BloomFilterGate {
            filter: Some(filter),
        })
    }

    /// Builds the serialized filter for `keys`.
    pub fn build<'a, I>(keys: I, expected_items: usize, false_positive_rate: f64) -> StorageResult<Vec<u8>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut filter: Bloom<[u8]> = Bloom::new_for_fp_rate(expected_items.max(1), false_positive_rate)
            .map_err(|e| StorageError::InvalidArgument(format!("bloom filter: {}", e)))?;
        for key in keys {
            filter.set(key.as_bytes());
        }
        Ok(filter.as_slice().to_vec())
    }

    /// `false` guarantees that `key` is not stored in the segment.
    pub fn might_contain(&self, key: &str) -> bool {
        match &self.filter {
            Some(filter) => filter.check(key.as_bytes()),
            None => true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.filter.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keys(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("key_{}", i)).collect()
    }

    #[test]
    fn test_no_false_negatives() {
        let keys = keys(1000);
        let bytes = BloomFilterGate::build(keys.iter().map(String::as_str), keys.len(), 0.01).unwrap();
        let gate = BloomFilterGate::from_bytes(&bytes).unwrap();

        assert!(gate.is_active());
        for key in &keys {
            assert!(gate.might_contain(key));
        }
    }

    #[test]
    fn test_prunes_most_absent_keys() {
        let keys = keys(1000);
        let bytes = BloomFilterGate::build(keys.iter().map(String::as_str), keys.len(), 0.01).unwrap();
        let gate = BloomFilterGate::from_bytes(&bytes).unwrap();

        let false_positives = (0..1000)
            .filter(|i| gate.might_contain(&format!("absent_{}", i)))
            .count();
        assert!(false_positives < 100, "{} false positives", false_positives);
    }

    #[test]
    fn test_absent_gate_allows_everything() {
        let gate = BloomFilterGate::absent();
        assert!(!gate.is_active());
        assert!(gate.might_contain("anything"));
    }

    #[test]
    fn test_missing_or_corrupt_file_degrades() {
        let dir = tempdir().unwrap();
        let missing = BloomFilterGate::load(&dir.path().join("sstable_1.blm"));
        assert!(!missing.is_active());

        let corrupt_path = dir.path().join("sstable_2.blm");
        fs::write(&corrupt_path, b"xx").unwrap();
        let corrupt = BloomFilterGate::load(&corrupt_path);
        assert!(!corrupt.is_active());
        assert!(corrupt.might_contain("key"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sstable_1.blm");
        let bytes = BloomFilterGate::build(["a", "b"], 2, 0.01).unwrap();
        fs::write(&path, bytes).unwrap();

        let gate = BloomFilterGate::load(&path);
        assert!(gate.is_active());
        assert!(gate.might_contain("a"));
        assert!(gate.might_contain("b"));
    }
}
