//! R-tree and segment read benchmarks

use bboxdb_storage::{Hyperrectangle, RTree, SegmentConfig, SegmentFacade, SegmentName, SegmentWriter, SpatialIndexEntry, Tuple};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::io::Cursor;
use tempfile::tempdir;

fn grid_box(i: u64) -> Hyperrectangle {
    let x = (i % 100) as f64;
    let y = (i / 100) as f64;
    Hyperrectangle::from_intervals(&[(x, x + 1.0), (y, y + 1.0)]).unwrap()
}

fn bench_rtree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Build");

    for size in [100u64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut tree = RTree::new();
                tree.bulk_insert((0..size).map(|i| SpatialIndexEntry::new(grid_box(i), i)));
                black_box(tree.len())
            });
        });
    }

    group.finish();
}

fn bench_rtree_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("RTree Query");

    let mut tree = RTree::new();
    tree.bulk_insert((0..10000).map(|i| SpatialIndexEntry::new(grid_box(i), i)));
    let query = Hyperrectangle::from_intervals(&[(25.0, 75.0), (25.0, 75.0)]).unwrap();

    group.bench_function("query_10k", |b| {
        let mut results = Vec::new();
        b.iter(|| {
            results.clear();
            tree.query_into(&query, &mut results);
            black_box(results.len())
        });
    });

    group.bench_function("serialize_10k", |b| {
        b.iter(|| {
            let mut out = Cursor::new(Vec::new());
            bboxdb_storage::spatial::RTreeSerializer::new(&tree).serialize(&mut out).unwrap();
            black_box(out.into_inner().len())
        });
    });

    group.finish();
}

fn bench_segment_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segment Get");

    let dir = tempdir().unwrap();
    let name = SegmentName::new("bench", "points", None).unwrap();
    let tuples: Vec<Tuple> = (0..10000u64)
        .map(|i| Tuple::new(format!("key{:05}", i), grid_box(i), vec![0u8; 64], i as i64, i as i64))
        .collect();

    for (label, cache) in [("cached", 1000usize), ("uncached", 0)] {
        let number = if cache > 0 { 1 } else { 2 };
        let config = SegmentConfig::default().with_key_cache_capacity(cache);
        SegmentWriter::new(dir.path(), &name, number, &config)
            .write(tuples.clone())
            .unwrap();
        let segment = SegmentFacade::open(dir.path(), &name, number, &config).unwrap();

        group.bench_function(label, |b| {
            let mut i = 0u64;
            b.iter(|| {
                i = (i + 7919) % 10000;
                black_box(segment.get(&format!("key{:05}", i)).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rtree_build, bench_rtree_query, bench_segment_get);
criterion_main!(benches);
