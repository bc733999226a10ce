//! The worker-pool batch engine.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use font_types::Tag;
use log::{debug, info};
use varstance_instancer::{
    AxisLocation, Error, Evaluator,
    cache::{CacheConfig, CacheStats, FingerprintCache, font_identity, instance_fingerprint},
};

use rayon::prelude::*;

/// Worker-pool sizing plus the shared cache configuration.
/// `threads: 0` picks the default of `max(4, cpu count)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchConfig {
    pub threads: usize,
    pub cache: CacheConfig,
}

/// Why one task (or the whole batch) failed.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("cancelled before pickup")]
    Cancelled,

    #[error(transparent)]
    Build(#[from] Error),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Cooperative cancellation shared between the caller and the workers.
/// Tasks not yet picked up report [`BatchError::Cancelled`]; in-flight
/// tasks run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The result of one task. `index` always matches the input position.
#[derive(Debug)]
pub struct BatchOutcome {
    pub index: usize,
    pub location: Vec<AxisLocation>,
    pub result: Result<Arc<Vec<u8>>, BatchError>,
}

impl BatchOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A worker pool plus the fingerprint cache its tasks share.
pub struct BatchEngine {
    pool: rayon::ThreadPool,
    cache: FingerprintCache<Arc<Vec<u8>>>,
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(4)
}

impl BatchEngine {
    pub fn new(config: BatchConfig) -> Result<Self, BatchError> {
        let threads = if config.threads == 0 {
            default_threads()
        } else {
            config.threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;
        Ok(Self {
            pool,
            cache: FingerprintCache::new(config.cache),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// The shared instance cache, for invalidation and statistics.
    pub fn cache(&self) -> &FingerprintCache<Arc<Vec<u8>>> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Builds one instance per input point. See [`Self::run_with`].
    pub fn run(
        &self,
        font_data: &[u8],
        points: &[Vec<AxisLocation>],
    ) -> Result<Vec<BatchOutcome>, BatchError> {
        self.run_with(font_data, points, None, None)
    }

    /// Builds one instance per input point, reporting `(completed, total)`
    /// after each task and honoring a cancellation token.
    ///
    /// Binding the font fails the whole batch; everything after that is
    /// per-task, and `outcomes[i]` always corresponds to `points[i]`.
    pub fn run_with(
        &self,
        font_data: &[u8],
        points: &[Vec<AxisLocation>],
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<BatchOutcome>, BatchError> {
        let evaluator = Evaluator::new(font_data)?;
        let font_id = font_identity(font_data);
        let total = points.len();
        let completed = AtomicUsize::new(0);
        info!(
            "building {total} instances on {} workers",
            self.pool.current_num_threads()
        );

        let outcomes = self.pool.install(|| {
            points
                .par_iter()
                .enumerate()
                .map(|(index, location)| {
                    let result = if cancel.is_some_and(|token| token.is_cancelled()) {
                        Err(BatchError::Cancelled)
                    } else {
                        self.build(&evaluator, font_id, location)
                    };
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(progress) = progress {
                        progress(done, total);
                    }
                    BatchOutcome {
                        index,
                        location: location.clone(),
                        result,
                    }
                })
                .collect()
        });
        Ok(outcomes)
    }

    fn build(
        &self,
        evaluator: &Evaluator<'_>,
        font_id: u64,
        location: &[AxisLocation],
    ) -> Result<Arc<Vec<u8>>, BatchError> {
        // Reject unknown tags before touching the cache; otherwise an
        // invalid request would alias the fingerprint of its valid subset.
        for loc in location {
            if evaluator.axes().iter().all(|axis| axis.tag != loc.tag) {
                return Err(BatchError::Build(Error::UnknownAxis(loc.tag)));
            }
        }

        let (normalized, _) = evaluator.normalize(location);
        let pairs: Vec<(Tag, f64)> = evaluator
            .axes()
            .iter()
            .zip(normalized.coords())
            .map(|(axis, coord)| (axis.tag, coord.to_f32() as f64))
            .collect();
        let key = instance_fingerprint(font_id, &pairs);

        self.cache.try_fetch(&key, || {
            debug!("cache miss for {key}");
            let instance = evaluator.evaluate(location)?;
            Ok(Arc::new(instance.bundle.to_bytes()?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(threads: usize) -> BatchEngine {
        BatchEngine::new(BatchConfig {
            threads,
            cache: CacheConfig::default(),
        })
        .unwrap()
    }

    fn weights(values: &[f64]) -> Vec<Vec<AxisLocation>> {
        values
            .iter()
            .map(|w| vec![AxisLocation::new("wght", *w)])
            .collect()
    }

    #[test]
    fn outcomes_follow_input_order() {
        let data = font_test_data::VAZIRMATN_VAR;
        let engine = engine(4);
        let points = weights(&[900.0, 100.0, 400.0, 700.0, 400.0]);
        let outcomes = engine.run(data, &points).unwrap();

        assert_eq!(outcomes.len(), points.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert!(outcome.success(), "{:?}", outcome.result);
        }
        // identical inputs resolve to identical bytes
        let a = outcomes[2].result.as_ref().unwrap();
        let b = outcomes[4].result.as_ref().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn one_bad_point_does_not_poison_the_batch() {
        let data = font_test_data::VAZIRMATN_VAR;
        let engine = engine(2);
        let mut points = weights(&[100.0, 400.0, 700.0, 900.0]);
        points.insert(2, vec![AxisLocation::new("zzzz", 1.0)]);

        let outcomes = engine.run(data, &points).unwrap();
        assert_eq!(outcomes.len(), 5);
        let failures: Vec<_> = outcomes.iter().filter(|o| !o.success()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);
        assert!(matches!(
            failures[0].result,
            Err(BatchError::Build(Error::UnknownAxis(_)))
        ));
    }

    #[test]
    fn repeated_batches_hit_the_cache() {
        let data = font_test_data::VAZIRMATN_VAR;
        let engine = engine(2);
        let points = weights(&[400.0, 700.0]);

        engine.run(data, &points).unwrap();
        engine.run(data, &points).unwrap();

        let stats = engine.cache_stats();
        assert!(stats.hits >= 2, "{stats:?}");
        assert_eq!(stats.size, 2);
    }

    #[test]
    fn cancellation_reports_without_building() {
        let data = font_test_data::VAZIRMATN_VAR;
        let engine = engine(2);
        let token = CancellationToken::new();
        token.cancel();

        let outcomes = engine
            .run_with(data, &weights(&[100.0, 900.0]), None, Some(&token))
            .unwrap();
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Err(BatchError::Cancelled))));
    }

    #[test]
    fn progress_reaches_total() {
        let data = font_test_data::VAZIRMATN_VAR;
        let engine = engine(2);
        let points = weights(&[100.0, 400.0, 900.0]);
        let highest = AtomicUsize::new(0);

        let report = |done: usize, total: usize| {
            assert_eq!(total, 3);
            highest.fetch_max(done, Ordering::Relaxed);
        };
        engine
            .run_with(data, &points, Some(&report), None)
            .unwrap();
        assert_eq!(highest.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn binding_failure_aborts_the_batch() {
        let engine = engine(2);
        let result = engine.run(font_test_data::SIMPLE_GLYF, &weights(&[400.0]));
        assert!(matches!(
            result,
            Err(BatchError::Build(Error::NotVariableFont))
        ));
    }
}
