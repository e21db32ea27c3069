/// Blind/ante detector implementation
///
/// Most clients print the stakes in the window title, so the title is tried
/// first and the on-table blinds plate only as a fallback.
use super::detector::{DetectionContext, DetectionResult, Detector, DetectorKind, Payload};
use super::layout::{RelRect, TableLayout};
use super::parse::parse_stakes;
use super::recognizer::RecognitionHint;
use crate::error::RecognitionError;

/// Title text is exact, only the parse can be wrong
const TITLE_CONFIDENCE: f32 = 0.95;

#[derive(Debug, Default)]
pub struct BlindDetector;

impl BlindDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for BlindDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Blind
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        let frame_id = context.frame.id;

        if let Some((small, big, ante)) = parse_stakes(&context.frame.source_title) {
            return Ok(DetectionResult::new(
                Payload::Blinds { small, big, ante },
                TITLE_CONFIDENCE,
                frame_id,
            ));
        }

        let read = context.read(DetectorKind::Blind, context.layout.blinds, RecognitionHint::Text)?;
        let (small, big, ante) =
            parse_stakes(&read.label).ok_or_else(|| RecognitionError::Unreadable {
                kind: DetectorKind::Blind,
                label: read.label.clone(),
            })?;

        Ok(DetectionResult::new(
            Payload::Blinds { small, big, ante },
            read.confidence,
            frame_id,
        ))
    }

    fn regions(&self, layout: &TableLayout) -> Vec<RelRect> {
        vec![layout.blinds]
    }

    fn name(&self) -> &'static str {
        "BlindDetector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PaletteTable;

    #[test]
    fn test_stakes_from_title() {
        let mut table = PaletteTable::new();
        table.set_title("PokerStars - $0.50/$1 NLHE");

        let result = BlindDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Blinds {
                small: 0.5,
                big: 1.0,
                ante: None
            }
        );
        assert!((result.confidence - TITLE_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_stakes_from_table_plate() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.set_title("Tournament 42");
        table.label(layout.blinds, "Blinds 100/200 Ante 25", 0.77);

        let result = BlindDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Blinds {
                small: 100.0,
                big: 200.0,
                ante: Some(25.0)
            }
        );
        assert!((result.confidence - 0.77).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_stakes_is_unreadable() {
        let mut table = PaletteTable::new();
        table.set_title("Lobby");
        let err = BlindDetector::new().detect(&table.context(1)).unwrap_err();
        assert!(matches!(err, RecognitionError::Unreadable { kind: DetectorKind::Blind, .. }));
    }
}
