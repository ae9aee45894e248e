use bboxdb_storage::{
    Hyperrectangle, SegmentConfig, SegmentFacade, SegmentFiles, SegmentName, SegmentWriter, StorageResult,
    Tuple,
};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Runs `test` between `before` and `after`.
///
/// `after` runs even when the test returned an error; the first failure
/// panics with its stage.
pub fn run_test<B, T, A>(before: B, test: T, after: A)
where
    B: FnOnce() -> StorageResult<TestContext>,
    T: FnOnce(TestContext) -> StorageResult<()>,
    A: FnOnce(TestContext) -> StorageResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let test_result = test(ctx.clone());
    let after_result = after(ctx);

    if let Err(e) = test_result {
        panic!("Test failed: {:?}", e);
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

/// A private data directory plus the table every test writes to.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    name: SegmentName,
    config: SegmentConfig,
}

impl TestContext {
    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    pub fn with_config(mut self, config: SegmentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn files(&self, number: u64) -> SegmentFiles {
        self.name.segment_files(self.base(), number)
    }

    pub fn write_segment(&self, number: u64, tuples: Vec<Tuple>) -> StorageResult<SegmentFiles> {
        SegmentWriter::new(self.base(), &self.name, number, &self.config).write(tuples)
    }

    pub fn open_segment(&self, number: u64) -> StorageResult<SegmentFacade> {
        SegmentFacade::open(self.base(), &self.name, number, &self.config)
    }
}

pub fn create_test_context() -> StorageResult<TestContext> {
    let dir = tempfile::tempdir()?;
    debug!("Test data directory {}", dir.path().display());
    Ok(TestContext {
        dir: Arc::new(dir),
        name: SegmentName::new("testgroup", "testtable", None)?,
        config: SegmentConfig::default(),
    })
}

/// Logs the segments a test left behind. The directory itself goes away
/// with the last clone of the context.
pub fn cleanup(ctx: TestContext) -> StorageResult<()> {
    for number in ctx.name.discover_segments(ctx.base())? {
        debug!("Segment {} left in {}", number, ctx.base().display());
    }
    Ok(())
}

/// Tuple with a zero volume box at `point`.
pub fn point_tuple(key: &str, point: &[f64], payload: &[u8], version: i64) -> Tuple {
    let bbox = Hyperrectangle::from_point(point).unwrap_or(Hyperrectangle::FULL_SPACE);
    Tuple::new(key, bbox, payload.to_vec(), version, version)
}

pub fn box_tuple(key: &str, intervals: &[(f64, f64)], version: i64) -> StorageResult<Tuple> {
    let bbox = Hyperrectangle::from_intervals(intervals)?;
    Ok(Tuple::new(key, bbox, key.as_bytes().to_vec(), version, version))
}

/// `count` tuples with distinct keys and random boxes in `[0, 100)`.
pub fn random_tuples(count: usize, dimensions: usize, seed: u64) -> StorageResult<Vec<Tuple>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let intervals: Vec<(f64, f64)> = (0..dimensions)
                .map(|_| {
                    let low = rng.gen_range(0.0..100.0);
                    (low, low + rng.gen_range(0.0..5.0))
                })
                .collect();
            box_tuple(&format!("key{:06}", i), &intervals, i as i64)
        })
        .collect()
}

/// Brute force answer of a region query over `tuples`.
pub fn keys_intersecting(tuples: &[Tuple], region: &Hyperrectangle) -> Vec<String> {
    let mut keys: Vec<String> = tuples
        .iter()
        .filter(|t| !t.bounding_box().is_full_space() && t.bounding_box().intersects(region))
        .map(|t| t.key().to_string())
        .collect();
    keys.sort();
    keys
}

pub fn sorted_keys(result: StorageResult<Vec<Tuple>>) -> StorageResult<Vec<String>> {
    let mut keys: Vec<String> = result?.iter().map(|t| t.key().to_string()).collect();
    keys.sort();
    Ok(keys)
}
