/// Card detector implementation
///
/// Reads the community board and the hero's hole cards.
use super::detector::{DetectionContext, DetectionResult, Detector, DetectorKind, Payload};
use super::layout::{RelRect, TableLayout};
use super::parse::parse_cards;
use super::recognizer::{Recognition, RecognitionHint};
use crate::detection::cards::Card;
use crate::error::RecognitionError;

#[derive(Debug, Default)]
pub struct CardDetector;

impl CardDetector {
    pub fn new() -> Self {
        Self
    }

    fn cards_from(recognition: &Recognition) -> Result<Vec<Card>, RecognitionError> {
        if recognition.is_blank() {
            return Ok(Vec::new());
        }
        let cards = parse_cards(&recognition.label);
        if cards.is_empty() {
            return Err(RecognitionError::Unreadable {
                kind: DetectorKind::Card,
                label: recognition.label.clone(),
            });
        }
        Ok(cards)
    }
}

impl Detector for CardDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Card
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        let board_read = context.read(DetectorKind::Card, context.layout.board, RecognitionHint::Cards)?;
        let hero_read =
            context.read(DetectorKind::Card, context.layout.hero_cards, RecognitionHint::Cards)?;

        let board = Self::cards_from(&board_read)?;
        let hero = Self::cards_from(&hero_read)?;

        // The weaker of the two reads bounds the whole result
        let confidence = board_read.confidence.min(hero_read.confidence);

        tracing::trace!(
            "Cards read (confidence: {:.2}): board={:?}, hero={:?}",
            confidence,
            board,
            hero
        );

        Ok(DetectionResult::new(
            Payload::Cards { board, hero },
            confidence,
            context.frame.id,
        ))
    }

    fn regions(&self, layout: &TableLayout) -> Vec<RelRect> {
        vec![layout.board, layout.hero_cards]
    }

    fn name(&self) -> &'static str {
        "CardDetector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PaletteTable;

    #[test]
    fn test_reads_board_and_hero() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.label(layout.board, "Ah Kd 10c", 0.93);
        table.label(layout.hero_cards, "Qs Qh", 0.88);

        let result = CardDetector::new().detect(&table.context(4)).unwrap();
        assert_eq!(result.kind, DetectorKind::Card);
        assert_eq!(result.frame_id, 4);
        assert!((result.confidence - 0.88).abs() < f32::EPSILON);
        match result.payload {
            Payload::Cards { board, hero } => {
                let board: Vec<String> = board.iter().map(|c| c.to_string()).collect();
                let hero: Vec<String> = hero.iter().map(|c| c.to_string()).collect();
                assert_eq!(board, vec!["Ah", "Kd", "Tc"]);
                assert_eq!(hero, vec!["Qs", "Qh"]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_blank_regions_mean_no_cards() {
        let table = PaletteTable::new();
        let result = CardDetector::new().detect(&table.context(1)).unwrap();
        assert_eq!(
            result.payload,
            Payload::Cards {
                board: vec![],
                hero: vec![]
            }
        );
    }

    #[test]
    fn test_garbage_label_is_unreadable() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.label(layout.board, "###", 0.9);

        let err = CardDetector::new().detect(&table.context(1)).unwrap_err();
        assert!(matches!(err, RecognitionError::Unreadable { kind: DetectorKind::Card, .. }));
    }

    #[test]
    fn test_primitive_failure_carries_kind() {
        let mut table = PaletteTable::new();
        let layout = table.layout().clone();
        table.fail(layout.hero_cards, "engine crashed");

        let err = CardDetector::new().detect(&table.context(1)).unwrap_err();
        assert_eq!(
            err,
            RecognitionError::Failed {
                kind: DetectorKind::Card,
                message: "engine crashed".into()
            }
        );
    }
}
