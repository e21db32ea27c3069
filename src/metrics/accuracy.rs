/// Accuracy tracker
///
/// Rolling window of outcomes per detector kind. Alerts here are
/// observational: they become system events and never drive degradation.
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::detection::DetectorKind;
use crate::messaging::{DetectionEvent, EventType, Severity};
use crate::state::{KindPerformance, PerformanceSnapshot};
use crate::utils::{Debouncer, DurationStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Rejected by the confidence gate
    LowConfidence,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    outcome: Outcome,
    confidence: Option<f32>,
    duration: Duration,
}

/// Alert limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyLimits {
    pub window_size: usize,
    pub min_success_rate: f64,
    pub min_avg_confidence: f64,
    /// Samples needed before a kind can alert
    pub min_samples: usize,
    pub alert_cooldown: Duration,
}

impl Default for AccuracyLimits {
    fn default() -> Self {
        Self {
            window_size: 1000,
            min_success_rate: 0.90,
            min_avg_confidence: 0.70,
            min_samples: 20,
            alert_cooldown: Duration::from_secs(30),
        }
    }
}

struct KindWindow {
    samples: VecDeque<Sample>,
    debouncer: Debouncer,
    total: u64,
}

pub struct AccuracyTracker {
    limits: AccuracyLimits,
    windows: BTreeMap<DetectorKind, KindWindow>,
}

impl AccuracyTracker {
    pub fn new(limits: AccuracyLimits) -> Self {
        let limits = AccuracyLimits {
            window_size: limits.window_size.max(1),
            ..limits
        };
        Self {
            limits,
            windows: BTreeMap::new(),
        }
    }

    pub fn limits(&self) -> AccuracyLimits {
        self.limits
    }

    fn push(&mut self, kind: DetectorKind, sample: Sample) {
        let cooldown_ms = self.limits.alert_cooldown.as_millis() as u64;
        let capacity = self.limits.window_size;
        let window = self.windows.entry(kind).or_insert_with(|| KindWindow {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            debouncer: Debouncer::new(cooldown_ms),
            total: 0,
        });
        if window.samples.len() == capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(sample);
        window.total += 1;
    }

    pub fn record_success(&mut self, kind: DetectorKind, confidence: f32, duration: Duration) {
        self.push(
            kind,
            Sample {
                outcome: Outcome::Success,
                confidence: Some(confidence),
                duration,
            },
        );
    }

    pub fn record_failure(&mut self, kind: DetectorKind, duration: Duration) {
        self.push(
            kind,
            Sample {
                outcome: Outcome::Failure,
                confidence: None,
                duration,
            },
        );
    }

    pub fn record_low_confidence(&mut self, kind: DetectorKind, confidence: f32, duration: Duration) {
        self.push(
            kind,
            Sample {
                outcome: Outcome::LowConfidence,
                confidence: Some(confidence),
                duration,
            },
        );
    }

    /// Samples currently in the kind's window
    pub fn samples(&self, kind: DetectorKind) -> usize {
        self.windows.get(&kind).map_or(0, |w| w.samples.len())
    }

    /// Samples ever recorded for the kind
    pub fn total(&self, kind: DetectorKind) -> u64 {
        self.windows.get(&kind).map_or(0, |w| w.total)
    }

    /// Share of window samples that were accepted; `None` without samples
    pub fn success_rate(&self, kind: DetectorKind) -> Option<f64> {
        let window = self.windows.get(&kind).filter(|w| !w.samples.is_empty())?;
        let successes = window
            .samples
            .iter()
            .filter(|s| s.outcome == Outcome::Success)
            .count();
        Some(successes as f64 / window.samples.len() as f64)
    }

    /// Mean confidence over samples that produced a result
    pub fn average_confidence(&self, kind: DetectorKind) -> Option<f64> {
        let window = self.windows.get(&kind)?;
        let confidences: Vec<f64> = window
            .samples
            .iter()
            .filter_map(|s| s.confidence)
            .map(f64::from)
            .collect();
        if confidences.is_empty() {
            return None;
        }
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    }

    pub fn duration_stats(&self, kind: DetectorKind) -> DurationStats {
        self.windows
            .get(&kind)
            .map(|w| DurationStats::from_durations(w.samples.iter().map(|s| s.duration)))
            .unwrap_or_default()
    }

    pub fn check_alerts(&mut self, correlation_id: &str) -> Vec<DetectionEvent> {
        self.check_alerts_at(correlation_id, Instant::now())
    }

    /// System events for kinds below the limits, at most one per kind per cooldown
    pub fn check_alerts_at(&mut self, correlation_id: &str, now: Instant) -> Vec<DetectionEvent> {
        let mut alerts = Vec::new();
        let kinds: Vec<DetectorKind> = self.windows.keys().copied().collect();

        for kind in kinds {
            if self.samples(kind) < self.limits.min_samples {
                continue;
            }
            let success_rate = self.success_rate(kind).unwrap_or(0.0);
            let avg_confidence = self.average_confidence(kind).unwrap_or(0.0);

            let mut problems = Vec::new();
            if success_rate < self.limits.min_success_rate {
                problems.push(format!("success rate {:.1}%", success_rate * 100.0));
            }
            if avg_confidence < self.limits.min_avg_confidence {
                problems.push(format!("average confidence {:.2}", avg_confidence));
            }
            if problems.is_empty() {
                continue;
            }

            let Some(window) = self.windows.get_mut(&kind) else {
                continue;
            };
            if !window.debouncer.should_trigger_at(now) {
                continue;
            }

            tracing::warn!("Accuracy alert for {}: {}", kind, problems.join(", "));
            alerts.push(
                DetectionEvent::new(
                    EventType::System,
                    Severity::Warning,
                    format!("{} detector accuracy degraded: {}", kind, problems.join(", ")),
                    correlation_id,
                )
                .with_data("alert", "accuracy")
                .with_data("detector", kind)
                .with_data("success_rate", success_rate)
                .with_data("average_confidence", avg_confidence)
                .with_data("samples", self.samples(kind)),
            );
        }

        alerts
    }

    /// Per-kind figures for the performance snapshot
    pub fn per_kind(&self) -> BTreeMap<DetectorKind, KindPerformance> {
        self.windows
            .iter()
            .filter(|(_, w)| !w.samples.is_empty())
            .map(|(&kind, window)| {
                let stats = self.duration_stats(kind);
                (
                    kind,
                    KindPerformance {
                        samples: window.samples.len(),
                        success_rate: self.success_rate(kind).unwrap_or(0.0),
                        average_confidence: self.average_confidence(kind).unwrap_or(0.0),
                        mean_ms: stats.mean_ms,
                        p50_ms: stats.p50_ms,
                        p95_ms: stats.p95_ms,
                        p99_ms: stats.p99_ms,
                    },
                )
            })
            .collect()
    }

    /// Snapshot with the per-kind figures filled in; pipeline counters are left for the caller
    pub fn snapshot(&self, mode: &str) -> PerformanceSnapshot {
        PerformanceSnapshot {
            taken_at: Utc::now(),
            mode: mode.to_string(),
            cycles: 0,
            cache_hits: 0,
            cache_misses: 0,
            events_dropped: 0,
            per_kind: self.per_kind(),
        }
    }

    pub fn reset(&mut self) {
        self.windows.clear();
    }
}

impl Default for AccuracyTracker {
    fn default() -> Self {
        Self::new(AccuracyLimits::default())
    }
}
