/// Detector registry
///
/// One interchangeable detector per kind. The orchestrator asks the registry for
/// the subset allowed by the current degradation mode.
use std::collections::BTreeMap;
use std::sync::Arc;

use super::action_detector::ActionDetector;
use super::blind_detector::BlindDetector;
use super::button_detector::ButtonDetector;
use super::card_detector::CardDetector;
use super::detector::{Detector, DetectorKind};
use super::player_detector::PlayerDetector;
use super::pot_detector::PotDetector;
use super::timeout_detector::TimeoutDetector;

#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: BTreeMap<DetectorKind, Arc<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in detector for every kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CardDetector::new()));
        registry.register(Arc::new(PotDetector::new()));
        registry.register(Arc::new(PlayerDetector::new()));
        registry.register(Arc::new(ActionDetector::new()));
        registry.register(Arc::new(BlindDetector::new()));
        registry.register(Arc::new(ButtonDetector::new()));
        registry.register(Arc::new(TimeoutDetector::new()));
        registry
    }

    /// Add a detector, replacing any previous one of the same kind
    pub fn register(&mut self, detector: Arc<dyn Detector>) -> Option<Arc<dyn Detector>> {
        let kind = detector.kind();
        tracing::debug!("Registering {} for {} detection", detector.name(), kind);
        self.detectors.insert(kind, detector)
    }

    pub fn get(&self, kind: DetectorKind) -> Option<&Arc<dyn Detector>> {
        self.detectors.get(&kind)
    }

    /// Detectors for the given kinds, in kind order; unknown kinds are skipped
    pub fn select(&self, kinds: &[DetectorKind]) -> Vec<Arc<dyn Detector>> {
        self.detectors
            .iter()
            .filter(|(kind, _)| kinds.contains(kind))
            .map(|(_, detector)| Arc::clone(detector))
            .collect()
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDetector;

    #[test]
    fn test_defaults_cover_every_kind() {
        let registry = DetectorRegistry::with_defaults();
        assert_eq!(registry.kinds(), DetectorKind::ALL.to_vec());
        assert_eq!(registry.get(DetectorKind::Pot).map(|d| d.name()), Some("PotDetector"));
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let mut registry = DetectorRegistry::with_defaults();
        let previous = registry.register(Arc::new(ScriptedDetector::new(DetectorKind::Card)));
        assert_eq!(previous.map(|d| d.name()), Some("CardDetector"));
        assert_eq!(registry.len(), 7);
        assert_eq!(
            registry.get(DetectorKind::Card).map(|d| d.name()),
            Some("ScriptedDetector")
        );
    }

    #[test]
    fn test_select_subset() {
        let registry = DetectorRegistry::with_defaults();
        let kinds: Vec<_> = registry
            .select(&[DetectorKind::Pot, DetectorKind::Card])
            .iter()
            .map(|d| d.kind())
            .collect();
        assert_eq!(kinds, vec![DetectorKind::Card, DetectorKind::Pot]);
        assert!(registry.select(&[]).is_empty());
    }
}
