use crate::codec::TupleCodec;
use crate::reader::KeyCacheStats;
use crate::tuple::Tuple;
use std::sync::atomic::{AtomicU64, Ordering};

/// Read counters of one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub key_lookups: u64,
    /// Lookups answered by the bloom filter without touching the index.
    pub bloom_skips: u64,
    pub region_queries: u64,
    pub tuples_read: u64,
    pub bytes_read: u64,
    pub key_cache: Option<KeyCacheStats>,
}

/// Internal statistics tracking
#[derive(Debug, Default)]
pub(crate) struct ReadStatistics {
    key_lookups: AtomicU64,
    bloom_skips: AtomicU64,
    region_queries: AtomicU64,
    tuples_read: AtomicU64,
    bytes_read: AtomicU64,
}

impl ReadStatistics {
    pub(crate) fn key_lookup(&self) {
        self.key_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bloom_skip(&self) {
        self.bloom_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn region_query(&self) {
        self.region_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tuple_read(&self, tuple: &Tuple) {
        self.tuples_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read
            .fetch_add(TupleCodec::encoded_len(tuple) as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, key_cache: Option<KeyCacheStats>) -> ReadStats {
        ReadStats {
            key_lookups: self.key_lookups.load(Ordering::Relaxed),
            bloom_skips: self.bloom_skips.load(Ordering::Relaxed),
            region_queries: self.region_queries.load(Ordering::Relaxed),
            tuples_read: self.tuples_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            key_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperrectangle::Hyperrectangle;

    #[test]
    fn test_snapshot_counts() {
        let stats = ReadStatistics::default();
        let tuple = Tuple::new("key", Hyperrectangle::FULL_SPACE, vec![1, 2, 3], 1, 1);

        stats.key_lookup();
        stats.key_lookup();
        stats.bloom_skip();
        stats.region_query();
        stats.tuple_read(&tuple);

        let snapshot = stats.snapshot(None);
        assert_eq!(snapshot.key_lookups, 2);
        assert_eq!(snapshot.bloom_skips, 1);
        assert_eq!(snapshot.region_queries, 1);
        assert_eq!(snapshot.tuples_read, 1);
        assert_eq!(snapshot.bytes_read, (TupleCodec::HEADER_LEN + 3 + 3) as u64);
        assert_eq!(snapshot.key_cache, None);
    }
}
