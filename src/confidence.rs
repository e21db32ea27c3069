/// Confidence gate
///
/// Per-detector-kind `min`/`high` thresholds. Results below `min` never reach
/// the state tracker; results at or above `high` are flagged as priority.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::detection::{DetectionResult, DetectorKind};
use crate::error::ConfigError;

/// Thresholds for one detector kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub min: f32,
    pub high: f32,
}

impl Threshold {
    pub const fn new(min: f32, high: f32) -> Self {
        Self { min, high }
    }
}

/// Thresholds for every detector kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceThresholds {
    per_kind: BTreeMap<DetectorKind, Threshold>,
}

impl ConfidenceThresholds {
    /// Threshold for a kind, falling back to the built-in default
    pub fn get(&self, kind: DetectorKind) -> Threshold {
        self.per_kind
            .get(&kind)
            .copied()
            .unwrap_or_else(|| default_threshold(kind))
    }

    pub fn set(&mut self, kind: DetectorKind, threshold: Threshold) {
        self.per_kind.insert(kind, threshold);
    }

    /// Number of kinds with an explicit threshold
    pub fn len(&self) -> usize {
        self.per_kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_kind.is_empty()
    }

    /// Every value in [0, 1] and `min <= high`
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, threshold) in &self.per_kind {
            let in_range = |v: f32| (0.0..=1.0).contains(&v);
            if !in_range(threshold.min) || !in_range(threshold.high) {
                return Err(ConfigError::Invalid(format!(
                    "{} thresholds must lie in [0, 1] (min {}, high {})",
                    kind, threshold.min, threshold.high
                )));
            }
            if threshold.min > threshold.high {
                return Err(ConfigError::Invalid(format!(
                    "{} min threshold {} exceeds high threshold {}",
                    kind, threshold.min, threshold.high
                )));
            }
        }
        Ok(())
    }
}

fn default_threshold(kind: DetectorKind) -> Threshold {
    match kind {
        DetectorKind::Card => Threshold::new(0.70, 0.90),
        DetectorKind::Pot => Threshold::new(0.60, 0.90),
        DetectorKind::Player => Threshold::new(0.60, 0.85),
        DetectorKind::Action => Threshold::new(0.65, 0.90),
        DetectorKind::Blind => Threshold::new(0.60, 0.90),
        DetectorKind::Button => Threshold::new(0.60, 0.85),
        DetectorKind::Timeout => Threshold::new(0.50, 0.80),
    }
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            per_kind: DetectorKind::ALL
                .iter()
                .map(|&kind| (kind, default_threshold(kind)))
                .collect(),
        }
    }
}

/// Shared, reloadable thresholds
///
/// Readers take a copy per cycle; a reload becomes visible from the next cycle.
#[derive(Debug, Clone, Default)]
pub struct ThresholdStore {
    inner: Arc<RwLock<ConfidenceThresholds>>,
}

impl ThresholdStore {
    pub fn new(thresholds: ConfidenceThresholds) -> Self {
        Self {
            inner: Arc::new(RwLock::new(thresholds)),
        }
    }

    pub fn current(&self) -> ConfidenceThresholds {
        self.inner.read().clone()
    }

    /// Replace the thresholds; invalid sets are refused and the old ones stay
    pub fn reload(&self, thresholds: ConfidenceThresholds) -> Result<(), ConfigError> {
        thresholds.validate()?;
        *self.inner.write() = thresholds;
        tracing::info!("Confidence thresholds reloaded");
        Ok(())
    }
}

/// Gate decision for one result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// Below `min`; counted as a low-confidence failure, never surfaced
    Rejected,
    Accepted,
    /// At or above `high`
    Priority,
}

impl GateVerdict {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, GateVerdict::Rejected)
    }
}

pub struct ConfidenceGate {
    thresholds: ConfidenceThresholds,
}

impl ConfidenceGate {
    pub fn new(thresholds: ConfidenceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, result: &DetectionResult) -> GateVerdict {
        self.evaluate_confidence(result.kind, result.confidence)
    }

    pub fn evaluate_confidence(&self, kind: DetectorKind, confidence: f32) -> GateVerdict {
        let threshold = self.thresholds.get(kind);
        if !(confidence >= threshold.min) {
            GateVerdict::Rejected
        } else if confidence >= threshold.high {
            GateVerdict::Priority
        } else {
            GateVerdict::Accepted
        }
    }

    pub fn thresholds(&self) -> &ConfidenceThresholds {
        &self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Payload;

    #[test]
    fn test_default_thresholds() {
        let thresholds = ConfidenceThresholds::default();
        assert_eq!(thresholds.get(DetectorKind::Card), Threshold::new(0.70, 0.90));
        assert_eq!(thresholds.get(DetectorKind::Pot).min, 0.60);
        assert_eq!(thresholds.get(DetectorKind::Timeout).high, 0.80);
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_gate_verdicts() {
        let gate = ConfidenceGate::new(ConfidenceThresholds::default());
        let pot = |confidence| {
            DetectionResult::new(
                Payload::Pot {
                    total: 125.5,
                    side_pots: vec![],
                },
                confidence,
                1,
            )
        };

        assert_eq!(gate.evaluate(&pot(0.59)), GateVerdict::Rejected);
        assert_eq!(gate.evaluate(&pot(0.60)), GateVerdict::Accepted);
        assert_eq!(gate.evaluate(&pot(0.89)), GateVerdict::Accepted);
        assert_eq!(gate.evaluate(&pot(0.92)), GateVerdict::Priority);
        assert_eq!(gate.evaluate(&pot(f32::NAN)), GateVerdict::Rejected);
        assert!(!GateVerdict::Rejected.is_accepted());
        assert!(GateVerdict::Priority.is_accepted());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut thresholds = ConfidenceThresholds::default();
        thresholds.set(DetectorKind::Card, Threshold::new(0.95, 0.90));
        assert!(thresholds.validate().is_err());

        let mut thresholds = ConfidenceThresholds::default();
        thresholds.set(DetectorKind::Pot, Threshold::new(0.5, 1.2));
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_store_refuses_invalid_reload() {
        let store = ThresholdStore::new(ConfidenceThresholds::default());

        let mut strict = ConfidenceThresholds::default();
        strict.set(DetectorKind::Pot, Threshold::new(0.8, 0.95));
        store.reload(strict.clone()).unwrap();
        assert_eq!(store.current(), strict);

        let mut broken = strict.clone();
        broken.set(DetectorKind::Pot, Threshold::new(-0.1, 0.95));
        assert!(store.reload(broken).is_err());
        assert_eq!(store.current(), strict);
    }

    #[test]
    fn test_serde_keys_are_kind_names() {
        let json = serde_json::to_value(ConfidenceThresholds::default()).unwrap();
        assert_eq!(json["card"]["min"].as_f64().map(|v| (v * 100.0).round()), Some(70.0));

        let partial: ConfidenceThresholds =
            serde_json::from_str(r#"{"pot": {"min": 0.5, "high": 0.8}}"#).unwrap();
        assert_eq!(partial.get(DetectorKind::Pot), Threshold::new(0.5, 0.8));
        assert_eq!(partial.get(DetectorKind::Card), Threshold::new(0.70, 0.90));
    }
}
