/// Timing helpers shared by the metrics and pipeline modules
use std::time::{Duration, Instant};

/// Cooldown gate: fires at most once per window
pub struct Debouncer {
    last_fired: Option<Instant>,
    cooldown: Duration,
}

impl Debouncer {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            last_fired: None,
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }

    pub fn should_trigger(&mut self) -> bool {
        self.should_trigger_at(Instant::now())
    }

    /// Fire unless the last firing is less than one cooldown ago
    pub fn should_trigger_at(&mut self, now: Instant) -> bool {
        let cooling = self
            .last_fired
            .is_some_and(|last| now.saturating_duration_since(last) < self.cooldown);
        if cooling {
            return false;
        }
        self.last_fired = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

/// Mean and percentiles of a set of durations, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DurationStats {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl DurationStats {
    pub fn from_durations(durations: impl IntoIterator<Item = Duration>) -> Self {
        let mut values: Vec<f64> = durations
            .into_iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(f64::total_cmp);

        Self {
            mean_ms: values.iter().sum::<f64>() / values.len() as f64,
            p50_ms: percentile(&values, 50.0),
            p95_ms: percentile(&values, 95.0),
            p99_ms: percentile(&values, 99.0),
        }
    }
}

/// Calculate percentile from sorted data
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
