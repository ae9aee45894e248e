use bboxdb_int_test::test_util::{
    box_tuple, cleanup, create_test_context, keys_intersecting, point_tuple, random_tuples, run_test, sorted_keys,
};
use bboxdb_storage::{AccessMode, Hyperrectangle, SegmentConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_iterate_point_tuples() {
    run_test(
        create_test_context,
        |ctx| {
            let tuples = vec![
                point_tuple("3", &[3.0, 3.0], b"value3", 3),
                point_tuple("1", &[1.0, 1.0], b"value1", 1),
                point_tuple("4", &[4.0, 4.0], b"value4", 4),
                point_tuple("2", &[2.0, 2.0], b"value2", 2),
            ];
            ctx.write_segment(1, tuples)?;

            let segment = ctx.open_segment(1)?;
            assert!(segment.acquire());

            let read: Vec<_> = segment.iter().collect::<Result<_, _>>()?;
            segment.release();

            let keys: Vec<&str> = read.iter().map(|t| t.key()).collect();
            assert_eq!(keys, vec!["1", "2", "3", "4"]);
            for tuple in &read {
                assert_eq!(tuple.payload(), format!("value{}", tuple.key()).as_bytes());
                assert_eq!(tuple.bounding_box().volume(), 0.0);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_own_box_query_on_fixed_boxes() {
    run_test(
        || Ok(create_test_context()?.with_config(SegmentConfig::default().with_max_node_size(64))),
        |ctx| {
            let boxes = [
                (0.0, 1.0, 0.0, 1.0),
                (1.0, 2.0, 1.0, 3.0),
                (2.0, 3.0, 0.0, 1.0),
                (3.0, 4.0, 3.0, 7.0),
                (1.2, 2.2, 0.0, 1.0),
                (4.6, 5.6, 0.0, 1.0),
                (5.2, 6.2, 4.0, 5.0),
                (5.1, 6.1, 0.0, 1.0),
                (6.1, 7.1, 0.0, 1.0),
                (8.1, 9.1, 2.0, 5.0),
            ];
            let tuples = boxes
                .iter()
                .enumerate()
                .map(|(i, (l0, h0, l1, h1))| box_tuple(&format!("{}", i + 1), &[(*l0, *h0), (*l1, *h1)], 1))
                .collect::<Result<Vec<_>, _>>()?;
            ctx.write_segment(1, tuples.clone())?;

            let segment = ctx.open_segment(1)?;
            assert_eq!(segment.spatial_index().max_node_size(), 64);
            assert_eq!(segment.spatial_index().len(), 10);

            for tuple in &tuples {
                let keys = sorted_keys(segment.get_all_tuples_in_bounding_box(tuple.bounding_box()))?;
                assert!(keys.iter().any(|k| k == tuple.key()), "{} not in {:?}", tuple.key(), keys);
                assert_eq!(keys, keys_intersecting(&tuples, tuple.bounding_box()));
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_region_queries_match_brute_force() {
    run_test(
        || Ok(create_test_context()?.with_config(SegmentConfig::default().with_max_node_size(8))),
        |ctx| {
            let tuples = random_tuples(2000, 2, 17)?;
            ctx.write_segment(1, tuples.clone())?;
            let segment = ctx.open_segment(1)?;

            let mut rng = StdRng::seed_from_u64(23);
            for _ in 0..100 {
                let x = rng.gen_range(0.0..100.0);
                let y = rng.gen_range(0.0..100.0);
                let region = Hyperrectangle::from_intervals(&[(x, x + 10.0), (y, y + 10.0)])?;
                assert_eq!(
                    sorted_keys(segment.get_all_tuples_in_bounding_box(&region))?,
                    keys_intersecting(&tuples, &region)
                );
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_get_without_bloom_filter_is_equal() {
    run_test(
        create_test_context,
        |ctx| {
            let tuples = random_tuples(500, 3, 5)?;
            ctx.write_segment(1, tuples.clone())?;

            let with_bloom = ctx.open_segment(1)?;
            let without_bloom = ctx
                .clone()
                .with_config(SegmentConfig::default().with_bloom_filter(false))
                .open_segment(1)?;
            assert!(with_bloom.has_bloom_filter());
            assert!(!without_bloom.has_bloom_filter());

            let probes = tuples
                .iter()
                .map(|t| t.key().to_string())
                .chain((0..500).map(|i| format!("missing{}", i)));
            for key in probes {
                assert_eq!(with_bloom.get(&key)?, without_bloom.get(&key)?, "key {}", key);
            }

            assert!(with_bloom.statistics().bloom_skips > 0);
            assert_eq!(without_bloom.statistics().bloom_skips, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_buffered_reads_match_mapped_reads() {
    run_test(
        create_test_context,
        |ctx| {
            let tuples = random_tuples(300, 2, 9)?;
            ctx.write_segment(1, tuples.clone())?;

            let mapped = ctx.open_segment(1)?;
            let buffered = ctx
                .clone()
                .with_config(SegmentConfig::default().with_access_mode(AccessMode::Buffered))
                .open_segment(1)?;

            let mapped_all: Vec<_> = mapped.iter().collect::<Result<_, _>>()?;
            let buffered_all: Vec<_> = buffered.iter().collect::<Result<_, _>>()?;
            assert_eq!(mapped_all, buffered_all);
            assert_eq!(mapped_all.len(), 300);

            let region = Hyperrectangle::from_intervals(&[(20.0, 60.0), (20.0, 60.0)])?;
            assert_eq!(
                sorted_keys(mapped.get_all_tuples_in_bounding_box(&region))?,
                sorted_keys(buffered.get_all_tuples_in_bounding_box(&region))?
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_duplicate_keys_return_every_version() {
    run_test(
        || Ok(create_test_context()?.with_config(SegmentConfig::default().with_key_cache_capacity(0))),
        |ctx| {
            let mut tuples = Vec::new();
            for i in 0..50 {
                tuples.push(point_tuple(&format!("k{:03}", i), &[i as f64], b"single", i));
            }
            for version in 0..7 {
                tuples.push(point_tuple("k025", &[25.0], b"duplicate", 100 + version));
            }
            ctx.write_segment(1, tuples)?;

            let segment = ctx.open_segment(1)?;
            assert_eq!(segment.get("k025")?.len(), 8);
            assert_eq!(segment.get("k000")?.len(), 1);
            assert_eq!(segment.get("k049")?.len(), 1);
            assert!(segment.get("k050")?.is_empty());
            assert!(segment.statistics().key_cache.is_none());
            Ok(())
        },
        cleanup,
    )
}
