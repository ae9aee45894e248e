//! Reader and writer settings for one segment.

use crate::spatial::DEFAULT_NODE_SIZE;

/// Default number of keys kept by the key index cache.
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 1000;

/// Default false positive rate for bloom filters built by the writer.
pub const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

/// How segment files are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read-only memory mapped view.
    #[default]
    Mapped,
    /// Positioned reads through a locked file handle, for platforms
    /// without usable mapped I/O.
    Buffered,
}

/// Settings used when opening or writing a segment.
///
/// ```rust
/// use bboxdb_storage::{AccessMode, SegmentConfig};
///
/// let config = SegmentConfig::default()
///     .with_key_cache_capacity(0)
///     .with_access_mode(AccessMode::Buffered);
/// assert_eq!(config.key_cache_capacity(), 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConfig {
    key_cache_capacity: usize,
    access_mode: AccessMode,
    use_bloom_filter: bool,
    bloom_false_positive_rate: f64,
    max_node_size: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            key_cache_capacity: DEFAULT_KEY_CACHE_CAPACITY,
            access_mode: AccessMode::default(),
            use_bloom_filter: true,
            bloom_false_positive_rate: DEFAULT_BLOOM_FP_RATE,
            max_node_size: DEFAULT_NODE_SIZE,
        }
    }
}

impl SegmentConfig {
    /// Number of keys cached by the key index. `0` disables the cache.
    pub fn with_key_cache_capacity(mut self, capacity: usize) -> Self {
        self.key_cache_capacity = capacity;
        self
    }

    pub fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = access_mode;
        self
    }

    /// When disabled the bloom gate answers "maybe" for every key.
    pub fn with_bloom_filter(mut self, enabled: bool) -> Self {
        self.use_bloom_filter = enabled;
        self
    }

    pub fn with_bloom_false_positive_rate(mut self, rate: f64) -> Self {
        self.bloom_false_positive_rate = rate;
        self
    }

    /// R-tree fan-out used by the writer.
    pub fn with_max_node_size(mut self, max_node_size: usize) -> Self {
        self.max_node_size = max_node_size;
        self
    }

    pub fn key_cache_capacity(&self) -> usize {
        self.key_cache_capacity
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub fn use_bloom_filter(&self) -> bool {
        self.use_bloom_filter
    }

    pub fn bloom_false_positive_rate(&self) -> f64 {
        self.bloom_false_positive_rate
    }

    pub fn max_node_size(&self) -> usize {
        self.max_node_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SegmentConfig::default();
        assert_eq!(config.key_cache_capacity(), DEFAULT_KEY_CACHE_CAPACITY);
        assert_eq!(config.access_mode(), AccessMode::Mapped);
        assert!(config.use_bloom_filter());
        assert_eq!(config.max_node_size(), DEFAULT_NODE_SIZE);
    }

    #[test]
    fn test_builder_chain() {
        let config = SegmentConfig::default()
            .with_key_cache_capacity(10)
            .with_access_mode(AccessMode::Buffered)
            .with_bloom_filter(false)
            .with_bloom_false_positive_rate(0.1)
            .with_max_node_size(8);

        assert_eq!(config.key_cache_capacity(), 10);
        assert_eq!(config.access_mode(), AccessMode::Buffered);
        assert!(!config.use_bloom_filter());
        assert_eq!(config.bloom_false_positive_rate(), 0.1);
        assert_eq!(config.max_node_size(), 8);
    }
}
