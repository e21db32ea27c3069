/// Detection pipeline
///
/// Runs one cycle of detectors against a shared frame:
/// 1. Consult the result cache (key = detector kind + region content hash)
/// 2. Run the remaining detectors in parallel on the worker pool
/// 3. Collect results until the per-call budget runs out
///
/// Detectors still running at the deadline are reported as timeouts; their late
/// results are discarded.
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::detector::{DetectionContext, DetectionResult, Detector, DetectorKind};
use crate::cache::{hash_image, ResultCache};
use crate::error::{PipelineError, RecognitionError};

/// What happened to one detector in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutcome {
    /// Replayed from the cache; not counted in accuracy tallies
    Cached(DetectionResult),
    Fresh {
        result: DetectionResult,
        duration: Duration,
    },
    Failed {
        kind: DetectorKind,
        error: RecognitionError,
        duration: Duration,
    },
}

impl DetectorOutcome {
    pub fn kind(&self) -> DetectorKind {
        match self {
            DetectorOutcome::Cached(result) | DetectorOutcome::Fresh { result, .. } => result.kind,
            DetectorOutcome::Failed { kind, .. } => *kind,
        }
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        match self {
            DetectorOutcome::Cached(result) | DetectorOutcome::Fresh { result, .. } => Some(result),
            DetectorOutcome::Failed { .. } => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, DetectorOutcome::Cached(_))
    }
}

/// Cache counters for performance snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct DetectorPipeline {
    pool: rayon::ThreadPool,
    cache: Mutex<ResultCache<DetectionResult>>,
    budget: Duration,
}

impl DetectorPipeline {
    /// Create a pipeline with `workers` pool threads (one per detector kind)
    pub fn new(
        workers: usize,
        budget: Duration,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|idx| format!("detector-{}", idx))
            .build()
            .map_err(PipelineError::WorkerPool)?;

        Ok(Self {
            pool,
            cache: Mutex::new(ResultCache::new(cache_ttl, cache_capacity)),
            budget,
        })
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run the given detectors against one frame; one outcome per detector, in order
    pub fn run(
        &self,
        context: &DetectionContext,
        detectors: &[Arc<dyn Detector>],
    ) -> Vec<DetectorOutcome> {
        let frame_id = context.frame.id;
        let count = detectors.len();
        let mut outcomes: Vec<Option<DetectorOutcome>> = vec![None; count];
        let mut keys: Vec<Option<u64>> = vec![None; count];

        let (tx, rx) = crossbeam_channel::bounded(count.max(1));
        let mut pending = 0usize;

        for (idx, detector) in detectors.iter().enumerate() {
            let key = cache_key(detector.as_ref(), context);
            if let Some(key) = key {
                if let Some(hit) = self.cache.lock().get(key) {
                    tracing::trace!("{} served from cache", detector.name());
                    outcomes[idx] = Some(DetectorOutcome::Cached(hit.replayed_for(frame_id)));
                    continue;
                }
            }
            keys[idx] = key;

            let detector = Arc::clone(detector);
            let context = context.clone();
            let tx = tx.clone();
            pending += 1;
            self.pool.spawn(move || {
                let started = Instant::now();
                let result = detector.detect(&context);
                // The receiver is gone once the cycle gave up on this detector
                let _ = tx.send((idx, result, started.elapsed()));
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.budget;
        while pending > 0 {
            match rx.recv_deadline(deadline) {
                Ok((idx, result, duration)) => {
                    pending -= 1;
                    outcomes[idx] = Some(self.settle(detectors[idx].kind(), keys[idx], result, duration));
                }
                Err(_) => break,
            }
        }

        outcomes
            .into_iter()
            .zip(detectors)
            .map(|(outcome, detector)| {
                outcome.unwrap_or_else(|| {
                    tracing::warn!(
                        "{} exceeded its {}ms budget on frame {}",
                        detector.name(),
                        self.budget.as_millis(),
                        frame_id
                    );
                    self.timeout(detector.kind(), self.budget)
                })
            })
            .collect()
    }

    fn settle(
        &self,
        kind: DetectorKind,
        key: Option<u64>,
        result: Result<DetectionResult, RecognitionError>,
        duration: Duration,
    ) -> DetectorOutcome {
        if duration > self.budget {
            return self.timeout(kind, duration);
        }

        match result {
            Ok(result) => {
                if let Some(key) = key {
                    self.cache.lock().insert(key, result.clone());
                }
                DetectorOutcome::Fresh { result, duration }
            }
            Err(error) => DetectorOutcome::Failed {
                kind,
                error,
                duration,
            },
        }
    }

    fn timeout(&self, kind: DetectorKind, duration: Duration) -> DetectorOutcome {
        DetectorOutcome::Failed {
            kind,
            error: RecognitionError::Timeout {
                kind,
                budget_ms: self.budget.as_millis() as u64,
            },
            duration,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            hits: cache.hits(),
            misses: cache.misses(),
            entries: cache.len(),
        }
    }

    pub fn purge_cache(&self) -> usize {
        self.cache.lock().purge_expired()
    }
}

/// Cache key over detector kind, source title and the pixels of every region read
///
/// `None` when a region cannot be cropped; such detectors are never cached.
fn cache_key(detector: &dyn Detector, context: &DetectionContext) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    detector.kind().hash(&mut hasher);
    context.frame.source_title.hash(&mut hasher);
    for rect in detector.regions(&context.layout) {
        let region = context.frame.crop(rect).ok()?;
        hash_image(&region, &mut hasher);
    }
    Some(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detector::Payload;
    use crate::detection::pot_detector::PotDetector;
    use crate::testing::{PaletteTable, ScriptedDetector};

    fn pipeline(budget_ms: u64) -> DetectorPipeline {
        DetectorPipeline::new(
            4,
            Duration::from_millis(budget_ms),
            Duration::from_secs(2),
            100,
        )
        .unwrap()
    }

    fn pot_table(label: &str) -> PaletteTable {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.label(layout.pot, label, 0.92);
        table
    }

    #[test]
    fn test_unchanged_region_is_served_from_cache() {
        let pipeline = pipeline(500);
        let detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(PotDetector::new())];
        let table = pot_table("125.50");

        let first = pipeline.run(&table.context(1), &detectors);
        assert!(matches!(first[0], DetectorOutcome::Fresh { .. }));

        let second = pipeline.run(&table.context(2), &detectors);
        assert!(second[0].is_cached());
        assert_eq!(second[0].result().map(|r| r.frame_id), Some(2));
        assert_eq!(
            second[0].result().map(|r| r.payload.clone()),
            first[0].result().map(|r| r.payload.clone())
        );

        let stats = pipeline.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_changed_region_misses_cache() {
        let pipeline = pipeline(500);
        let detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(PotDetector::new())];

        pipeline.run(&pot_table("125.50").context(1), &detectors);
        // Different label adds a second painted region, so the pixels differ
        let mut changed = pot_table("125.50");
        let layout = changed.layout().clone();
        changed.label(layout.side_pots, "40", 0.9);

        let outcome = pipeline.run(&changed.context(2), &detectors);
        assert!(matches!(outcome[0], DetectorOutcome::Fresh { .. }));
    }

    #[test]
    fn test_slow_detector_times_out_without_blocking_others() {
        let pipeline = pipeline(50);
        let slow = Arc::new(ScriptedDetector::new(DetectorKind::Card));
        slow.push_ok(
            Payload::Cards {
                board: vec![],
                hero: vec![],
            },
            0.9,
        );
        slow.set_delay(Duration::from_millis(300));
        let detectors: Vec<Arc<dyn Detector>> = vec![slow, Arc::new(PotDetector::new())];

        let started = Instant::now();
        let outcomes = pipeline.run(&pot_table("10").context(1), &detectors);
        assert!(started.elapsed() < Duration::from_millis(250));

        match &outcomes[0] {
            DetectorOutcome::Failed { kind, error, .. } => {
                assert_eq!(*kind, DetectorKind::Card);
                assert!(error.is_timeout());
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(matches!(outcomes[1], DetectorOutcome::Fresh { .. }));
    }

    #[test]
    fn test_failures_are_not_cached() {
        let pipeline = pipeline(500);
        let scripted = Arc::new(ScriptedDetector::new(DetectorKind::Button));
        scripted
            .push_err(RecognitionError::Unreadable {
                kind: DetectorKind::Button,
                label: String::new(),
            })
            .push_ok(Payload::Button { seat: 3 }, 0.9);
        let detectors: Vec<Arc<dyn Detector>> = vec![scripted.clone()];
        let table = PaletteTable::new();

        let first = pipeline.run(&table.context(1), &detectors);
        assert!(matches!(first[0], DetectorOutcome::Failed { .. }));

        let second = pipeline.run(&table.context(2), &detectors);
        assert!(matches!(second[0], DetectorOutcome::Fresh { .. }));
        assert_eq!(scripted.calls(), 2);

        let third = pipeline.run(&table.context(3), &detectors);
        assert!(third[0].is_cached());
        assert_eq!(scripted.calls(), 2);
    }
}
