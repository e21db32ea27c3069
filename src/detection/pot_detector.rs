/// Pot detector implementation
///
/// Reads the main pot and any side pots. A blank pot region means the pot is
/// empty (between hands).
use super::detector::{DetectionContext, DetectionResult, Detector, DetectorKind, Payload};
use super::layout::{RelRect, TableLayout};
use super::parse::{parse_amount, parse_side_pots};
use super::recognizer::RecognitionHint;
use crate::error::RecognitionError;

#[derive(Debug, Default)]
pub struct PotDetector;

impl PotDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for PotDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Pot
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        let pot_read = context.read(DetectorKind::Pot, context.layout.pot, RecognitionHint::Amount)?;

        let total = if pot_read.is_blank() {
            0.0
        } else {
            parse_amount(&pot_read.label).ok_or_else(|| RecognitionError::Unreadable {
                kind: DetectorKind::Pot,
                label: pot_read.label.clone(),
            })?
        };

        let mut confidence = pot_read.confidence;

        // Side pots are optional; a failed read there does not void the main pot
        let side_pots = match context.read(
            DetectorKind::Pot,
            context.layout.side_pots,
            RecognitionHint::Amount,
        ) {
            Ok(read) if !read.is_blank() => {
                confidence = confidence.min(read.confidence);
                parse_side_pots(&read.label)
            }
            Ok(_) => Vec::new(),
            Err(err) => {
                tracing::debug!("Side pot region unreadable: {}", err);
                Vec::new()
            }
        };

        Ok(DetectionResult::new(
            Payload::Pot { total, side_pots },
            confidence,
            context.frame.id,
        ))
    }

    fn regions(&self, layout: &TableLayout) -> Vec<RelRect> {
        vec![layout.pot, layout.side_pots]
    }

    fn name(&self) -> &'static str {
        "PotDetector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PaletteTable;

    #[test]
    fn test_reads_pot_total() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.label(layout.pot, "Pot: $125.50", 0.92);

        let result = PotDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Pot {
                total: 125.5,
                side_pots: vec![]
            }
        );
        assert!((result.confidence - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reads_side_pots() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table
            .label(layout.pot, "1.2K", 0.95)
            .label(layout.side_pots, "Side pot 1: 400 Side pot 2: 125", 0.80);

        let result = PotDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Pot {
                total: 1200.0,
                side_pots: vec![400.0, 125.0]
            }
        );
        assert!((result.confidence - 0.80).abs() < f32::EPSILON);
    }

    #[test]
    fn test_blank_pot_is_zero() {
        let table = PaletteTable::new();
        let result = PotDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Pot {
                total: 0.0,
                side_pots: vec![]
            }
        );
    }

    #[test]
    fn test_side_pot_failure_keeps_main_pot() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table
            .label(layout.pot, "80", 0.9)
            .fail(layout.side_pots, "blurred");

        let result = PotDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Pot {
                total: 80.0,
                side_pots: vec![]
            }
        );
    }

    #[test]
    fn test_unparseable_pot_fails() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.label(layout.pot, "Pot", 0.9);

        let err = PotDetector::new().detect(&table.context(1)).unwrap_err();
        assert!(matches!(err, RecognitionError::Unreadable { kind: DetectorKind::Pot, .. }));
    }
}
